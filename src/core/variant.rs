//! Variant axes and keys.
//!
//! A module is expanded into variants, each identified by a tuple of
//! configuration-axis values. The tuple's rendered form names the
//! variant's intermediates directory, so it must be order-independent
//! and byte-stable: axes carry a canonical order (os, arch, link, then
//! custom axes by name) and the key stores them in a `BTreeMap`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::util::Symbol;

/// OS class axis values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsClass {
    Device,
    Host,
}

impl OsClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsClass::Device => "device",
            OsClass::Host => "host",
        }
    }
}

impl fmt::Display for OsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for OsClass {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Target architecture axis values.
///
/// `Common` is the arch-independent value assigned to java-style
/// modules and keys; declarations never name it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm,
    Arm64,
    X86,
    X86_64,
    Common,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Common => "common",
        }
    }

    /// Device library directory for this arch's bitness.
    pub fn lib_dir(&self) -> &'static str {
        match self {
            Arch::Arm | Arch::X86 | Arch::Common => "lib",
            Arch::Arm64 | Arch::X86_64 => "lib64",
        }
    }

    /// ABI directory name used when packaging native libraries into an
    /// app archive.
    pub fn abi(&self) -> &'static str {
        match self {
            Arch::Arm => "armeabi-v7a",
            Arch::Arm64 => "arm64-v8a",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Common => "common",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Arch {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Link mode axis values for native libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Shared,
    Static,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Shared => "shared",
            LinkMode::Static => "static",
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for LinkMode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A configuration axis. The built-in axes come first in canonical
/// order; custom axes (introduced by later split phases) sort after
/// them by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Os,
    Arch,
    Link,
    Custom(Symbol),
}

impl Axis {
    pub fn custom(name: impl AsRef<str>) -> Axis {
        Axis::Custom(Symbol::intern(name))
    }

    fn rank(&self) -> u8 {
        match self {
            Axis::Os => 0,
            Axis::Arch => 1,
            Axis::Link => 2,
            Axis::Custom(_) => 3,
        }
    }
}

impl Ord for Axis {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (Axis::Custom(a), Axis::Custom(b)) => a.cmp(b),
            _ => Ordering::Equal,
        })
    }
}

impl PartialOrd for Axis {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Os => write!(f, "os"),
            Axis::Arch => write!(f, "arch"),
            Axis::Link => write!(f, "link"),
            Axis::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// The identity tuple of one variant: axis -> value.
///
/// Insertion order never matters; rendering always walks the canonical
/// axis order, so two keys built from the same pairs render
/// byte-identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    axes: BTreeMap<Axis, Symbol>,
}

impl VariantKey {
    pub fn empty() -> VariantKey {
        VariantKey::default()
    }

    pub fn with(mut self, axis: Axis, value: impl AsRef<str>) -> VariantKey {
        self.axes.insert(axis, Symbol::intern(value));
        self
    }

    pub fn set(&mut self, axis: Axis, value: impl AsRef<str>) {
        self.axes.insert(axis, Symbol::intern(value));
    }

    pub fn get(&self, axis: &Axis) -> Option<Symbol> {
        self.axes.get(axis).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Axis, &Symbol)> {
        self.axes.iter()
    }

    /// The OS class, when the os axis is set.
    pub fn os(&self) -> Option<OsClass> {
        match self.get(&Axis::Os)?.as_str() {
            "device" => Some(OsClass::Device),
            "host" => Some(OsClass::Host),
            _ => None,
        }
    }

    /// The arch, when the arch axis is set.
    pub fn arch(&self) -> Option<Arch> {
        match self.get(&Axis::Arch)?.as_str() {
            "arm" => Some(Arch::Arm),
            "arm64" => Some(Arch::Arm64),
            "x86" => Some(Arch::X86),
            "x86_64" => Some(Arch::X86_64),
            "common" => Some(Arch::Common),
            _ => None,
        }
    }

    /// The link mode, when the link axis is set.
    pub fn link(&self) -> Option<LinkMode> {
        match self.get(&Axis::Link)?.as_str() {
            "shared" => Some(LinkMode::Shared),
            "static" => Some(LinkMode::Static),
            _ => None,
        }
    }

    /// Stable string encoding: axis values joined with `_` in canonical
    /// axis order. Used as the variant's directory name.
    pub fn render(&self) -> String {
        if self.axes.is_empty() {
            return "none".to_string();
        }
        self.axes
            .values()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl Serialize for VariantKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_canonical_order() {
        let a = VariantKey::empty()
            .with(Axis::Link, "shared")
            .with(Axis::Os, "device")
            .with(Axis::Arch, "arm64");
        let b = VariantKey::empty()
            .with(Axis::Os, "device")
            .with(Axis::Arch, "arm64")
            .with(Axis::Link, "shared");

        assert_eq!(a, b);
        assert_eq!(a.render(), "device_arm64_shared");
        assert_eq!(b.render(), "device_arm64_shared");
    }

    #[test]
    fn test_custom_axes_sort_after_builtin() {
        let key = VariantKey::empty()
            .with(Axis::custom("sanitize"), "asan")
            .with(Axis::Os, "device")
            .with(Axis::Arch, "arm");
        assert_eq!(key.render(), "device_arm_asan");
    }

    #[test]
    fn test_custom_axes_sorted_by_name() {
        let key = VariantKey::empty()
            .with(Axis::custom("zz"), "two")
            .with(Axis::custom("aa"), "one");
        assert_eq!(key.render(), "one_two");
    }

    #[test]
    fn test_typed_accessors() {
        let key = VariantKey::empty()
            .with(Axis::Os, "host")
            .with(Axis::Arch, "common");
        assert_eq!(key.os(), Some(OsClass::Host));
        assert_eq!(key.arch(), Some(Arch::Common));
        assert_eq!(key.link(), None);
    }

    #[test]
    fn test_empty_renders_none() {
        assert_eq!(VariantKey::empty().render(), "none");
    }

    #[test]
    fn test_lib_dir_by_bitness() {
        assert_eq!(Arch::Arm.lib_dir(), "lib");
        assert_eq!(Arch::Arm64.lib_dir(), "lib64");
        assert_eq!(Arch::X86_64.lib_dir(), "lib64");
    }
}
