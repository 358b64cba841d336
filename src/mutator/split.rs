//! Split phases: refine declared modules into per-axis variants.
//!
//! Each phase maps one variant to zero or more refined variants, and
//! the pipeline replaces the population with the concatenated result
//! before the next phase starts. A phase never reads another module's
//! in-progress state, so within a phase the population order is
//! irrelevant; across phases the order is fixed.

use crate::core::{Arch, Axis, BuildSettings, ModuleKind, OsClass, Variant};

/// One population-rewriting phase.
pub trait SplitPhase {
    fn name(&self) -> &'static str;

    /// Refine a single variant. Returning an empty vec drops it.
    fn apply(&self, variant: &Variant, settings: &BuildSettings) -> Vec<Variant>;
}

/// The fixed split phase order.
pub fn phases() -> Vec<Box<dyn SplitPhase>> {
    vec![
        Box::new(OsSplit),
        Box::new(ArchSplit),
        Box::new(LinkSplit),
        Box::new(SanitizeSplit),
    ]
}

/// Assigns the OS class axis.
///
/// Signing keys are configuration, not built artifacts; they carry no
/// axes and every later phase passes them through untouched. A module
/// that supports neither OS class splits into nothing, and the
/// pipeline reports that as a property error.
pub struct OsSplit;

impl SplitPhase for OsSplit {
    fn name(&self) -> &'static str {
        "os"
    }

    fn apply(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<Variant> {
        let decl = &variant.decl;
        match decl.kind {
            ModuleKind::SigningKey => vec![variant.clone()],
            ModuleKind::App => {
                vec![variant.with_key(variant.key().clone().with(Axis::Os, OsClass::Device))]
            }
            ModuleKind::JavaLibrary | ModuleKind::NativeLibrary => {
                let mut out = Vec::new();
                if decl.device_supported {
                    out.push(
                        variant.with_key(variant.key().clone().with(Axis::Os, OsClass::Device)),
                    );
                }
                if decl.host_supported {
                    out.push(variant.with_key(variant.key().clone().with(Axis::Os, OsClass::Host)));
                }
                out
            }
        }
    }
}

/// Assigns the architecture axis.
///
/// Native device variants fan out per configured arch; the host only
/// builds one arch. Everything else is arch-independent and carries
/// `common` so classpath edges resolve within a single tuple.
pub struct ArchSplit;

impl SplitPhase for ArchSplit {
    fn name(&self) -> &'static str {
        "arch"
    }

    fn apply(&self, variant: &Variant, settings: &BuildSettings) -> Vec<Variant> {
        let decl = &variant.decl;
        let Some(os) = variant.key().os() else {
            return vec![variant.clone()];
        };
        match (decl.kind, os) {
            (ModuleKind::NativeLibrary, OsClass::Device) => decl
                .effective_arches(settings)
                .into_iter()
                .map(|arch| variant.with_key(variant.key().clone().with(Axis::Arch, arch)))
                .collect(),
            (ModuleKind::NativeLibrary, OsClass::Host) => {
                vec![variant.with_key(variant.key().clone().with(Axis::Arch, Arch::X86_64))]
            }
            _ => vec![variant.with_key(variant.key().clone().with(Axis::Arch, Arch::Common))],
        }
    }
}

/// Assigns the link-mode axis to native variants.
pub struct LinkSplit;

impl SplitPhase for LinkSplit {
    fn name(&self) -> &'static str {
        "link"
    }

    fn apply(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<Variant> {
        let decl = &variant.decl;
        if decl.kind != ModuleKind::NativeLibrary {
            return vec![variant.clone()];
        }
        decl.effective_link_modes()
            .into_iter()
            .map(|mode| variant.with_key(variant.key().clone().with(Axis::Link, mode)))
            .collect()
    }
}

/// Marks sanitized native device variants.
///
/// Sanitizing replaces the plain flavor rather than adding a second
/// one: the variant keeps its identity count and gains a custom axis,
/// so edges into the module still resolve to exactly one candidate.
/// The axis value redirects installation under the sanitizer root.
pub struct SanitizeSplit;

impl SplitPhase for SanitizeSplit {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn apply(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<Variant> {
        let decl = &variant.decl;
        let sanitized = decl.kind == ModuleKind::NativeLibrary
            && decl.sanitize
            && variant.key().os() == Some(OsClass::Device);
        if !sanitized {
            return vec![variant.clone()];
        }
        vec![variant.with_key(
            variant
                .key()
                .clone()
                .with(Axis::custom("sanitize"), "asan"),
        )]
    }
}

/// Run every split phase in order over a population snapshot.
pub fn run_splits(population: Vec<Variant>, settings: &BuildSettings) -> Vec<Variant> {
    let mut current = population;
    for phase in phases() {
        let snapshot = current;
        current = snapshot
            .iter()
            .flat_map(|variant| phase.apply(variant, settings))
            .collect();
        tracing::debug!(
            phase = phase.name(),
            variants = current.len(),
            "split phase done"
        );
    }
    current
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{LinkMode, ModuleDecl};

    fn settings() -> BuildSettings {
        BuildSettings::default()
    }

    fn variants_of(decl: ModuleDecl) -> Vec<String> {
        let seed = vec![Variant::declared(Arc::new(decl))];
        let mut rendered: Vec<String> = run_splits(seed, &settings())
            .iter()
            .map(|v| v.key().render())
            .collect();
        rendered.sort();
        rendered
    }

    #[test]
    fn test_java_library_device_only() {
        let decl = ModuleDecl::new("core-lib", ModuleKind::JavaLibrary);
        assert_eq!(variants_of(decl), vec!["device_common"]);
    }

    #[test]
    fn test_java_library_host_and_device() {
        let mut decl = ModuleDecl::new("tool", ModuleKind::JavaLibrary);
        decl.host_supported = true;
        assert_eq!(variants_of(decl), vec!["device_common", "host_common"]);
    }

    #[test]
    fn test_native_library_fans_out_per_arch() {
        let decl = ModuleDecl::new("libnative", ModuleKind::NativeLibrary);
        assert_eq!(
            variants_of(decl),
            vec!["device_arm64_shared", "device_arm_shared"]
        );
    }

    #[test]
    fn test_native_library_link_modes() {
        let mut decl = ModuleDecl::new("libboth", ModuleKind::NativeLibrary);
        decl.arches = vec![Arch::Arm64];
        decl.link_modes = vec![LinkMode::Shared, LinkMode::Static];
        assert_eq!(
            variants_of(decl),
            vec!["device_arm64_shared", "device_arm64_static"]
        );
    }

    #[test]
    fn test_sanitize_replaces_plain_flavor() {
        let mut decl = ModuleDecl::new("libsan", ModuleKind::NativeLibrary);
        decl.arches = vec![Arch::Arm64];
        decl.sanitize = true;
        assert_eq!(variants_of(decl), vec!["device_arm64_shared_asan"]);
    }

    #[test]
    fn test_sanitize_skips_host_variants() {
        let mut decl = ModuleDecl::new("libsan", ModuleKind::NativeLibrary);
        decl.arches = vec![Arch::Arm64];
        decl.device_supported = false;
        decl.host_supported = true;
        decl.sanitize = true;
        assert_eq!(variants_of(decl), vec!["host_x86_64_shared"]);
    }

    #[test]
    fn test_signing_key_carries_no_axes() {
        let decl = ModuleDecl::new("platform-key", ModuleKind::SigningKey);
        assert_eq!(variants_of(decl), vec!["none"]);
    }

    #[test]
    fn test_unsupported_everywhere_splits_to_nothing() {
        let mut decl = ModuleDecl::new("nowhere", ModuleKind::JavaLibrary);
        decl.device_supported = false;
        let seed = vec![Variant::declared(Arc::new(decl))];
        assert!(run_splits(seed, &settings()).is_empty());
    }
}
