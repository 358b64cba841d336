//! Interned symbols for module names, axis values, and rule identifiers.
//!
//! The graph compares and sorts names constantly; `Symbol` gives O(1)
//! equality via pointer comparison and zero-cost copies, while ordering
//! stays content-based so sorted output is stable across runs.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{LazyLock, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Global symbol table.
static TABLE: LazyLock<RwLock<HashSet<&'static str>>> =
    LazyLock::new(|| RwLock::new(HashSet::new()));

/// An interned string. All `Symbol`s with the same content share one
/// allocation, so equality is a pointer comparison.
///
/// Ordering and hashing go through the content: symbols feed `BTreeMap`s
/// and sorted lists whose order ends up in emitted build statements, and
/// address-based ordering would differ from run to run.
#[derive(Clone, Copy)]
pub struct Symbol {
    inner: &'static str,
}

impl Symbol {
    /// Intern a string, returning the canonical `Symbol` for its content.
    pub fn intern(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();

        // Fast path: already interned, read lock only.
        {
            let table = TABLE.read().unwrap();
            if let Some(&interned) = table.get(s) {
                return Symbol { inner: interned };
            }
        }

        let mut table = TABLE.write().unwrap();

        // Re-check after acquiring the write lock.
        if let Some(&interned) = table.get(s) {
            return Symbol { inner: interned };
        }

        // Leak to get a 'static reference; the table lives for the process.
        let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
        table.insert(leaked);

        Symbol { inner: leaked }
    }

    /// The underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.inner
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Symbol::intern("")
    }
}

impl Deref for Symbol {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        self.inner
    }
}

impl AsRef<str> for Symbol {
    #[inline]
    fn as_ref(&self) -> &str {
        self.inner
    }
}

impl Borrow<str> for Symbol {
    #[inline]
    fn borrow(&self) -> &str {
        self.inner
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Interning guarantees content-equal implies pointer-equal.
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(other.inner)
    }
}

impl Hash for Symbol {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Content hash keeps `Borrow<str>` lookups sound.
        self.inner.hash(state)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner, f)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner, f)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::intern(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::intern(s)
    }
}

impl From<&String> for Symbol {
    fn from(s: &String) -> Self {
        Symbol::intern(s)
    }
}

impl Serialize for Symbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Symbol::intern(s))
    }
}
