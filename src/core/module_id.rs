//! Module-variant identity - WHICH module (name + variant tuple).
//!
//! `ModuleId` is the identity a dependency edge resolves to. It is
//! interned for cheap comparison and cloning: the graph holds many
//! thousands of ids and compares them constantly.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{LazyLock, RwLock};

use serde::{Serialize, Serializer};

use crate::core::variant::VariantKey;
use crate::util::Symbol;

/// Global module ID interner
static MODULE_INTERNER: LazyLock<RwLock<HashMap<ModuleIdInner, &'static ModuleIdInner>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// A unique identifier for one module variant (interned).
///
/// Cheap to copy and compare (pointer comparison). Ordering is by name,
/// then variant tuple, which is the stable order all deterministic
/// traversals use.
#[derive(Clone, Copy)]
pub struct ModuleId {
    inner: &'static ModuleIdInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModuleIdInner {
    name: Symbol,
    variant: VariantKey,
}

impl ModuleId {
    /// Create (or look up) the id for a (name, variant) pair.
    pub fn new(name: impl AsRef<str>, variant: VariantKey) -> Self {
        let inner = ModuleIdInner {
            name: Symbol::intern(name),
            variant,
        };

        Self::intern(inner)
    }

    fn intern(inner: ModuleIdInner) -> Self {
        // Fast path: check if already interned
        {
            let interner = MODULE_INTERNER.read().unwrap();
            if let Some(&interned) = interner.get(&inner) {
                return ModuleId { inner: interned };
            }
        }

        let mut interner = MODULE_INTERNER.write().unwrap();

        // Double-check after acquiring write lock
        if let Some(&interned) = interner.get(&inner) {
            return ModuleId { inner: interned };
        }

        let leaked: &'static ModuleIdInner = Box::leak(Box::new(inner.clone()));
        interner.insert(inner, leaked);

        ModuleId { inner: leaked }
    }

    /// The module name.
    pub fn name(&self) -> Symbol {
        self.inner.name
    }

    /// The variant tuple.
    pub fn variant(&self) -> &VariantKey {
        &self.inner.variant
    }

    /// Display string like `core-runtime (device_common)`.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.inner.name, self.inner.variant.render())
    }
}

impl PartialEq for ModuleId {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for ModuleId {}

impl Hash for ModuleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.inner, state)
    }
}

impl PartialOrd for ModuleId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner
            .name
            .cmp(&other.inner.name)
            .then_with(|| self.inner.variant.cmp(&other.inner.variant))
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleId")
            .field("name", &self.inner.name.as_str())
            .field("variant", &self.inner.variant.render())
            .finish()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.inner.name, self.inner.variant.render())
    }
}

impl Serialize for ModuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct ModuleIdData<'a> {
            name: &'a str,
            variant: String,
        }

        let data = ModuleIdData {
            name: self.inner.name.as_str(),
            variant: self.inner.variant.render(),
        };

        data.serialize(serializer)
    }
}
