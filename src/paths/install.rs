//! Final install destinations.
//!
//! Installable modules land under a target root chosen by a pure
//! function of their attributes. The function is total: every flag
//! combination maps to exactly one partition, so the install manifest
//! is deterministic by construction.

use serde::Serialize;

use super::validate::PathError;
use super::{Layout, OutputPath};

/// Placement attributes of one installable module variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallSpec {
    /// Install into the host tree instead of the device image.
    pub host: bool,
    /// Install into the writable data partition.
    pub in_data: bool,
    /// Install into the recovery image.
    pub in_recovery: bool,
    /// SoC-specific: vendor partition.
    pub vendor: bool,
    /// Device-specific: odm partition.
    pub odm: bool,
    /// Product-specific: product partition.
    pub product: bool,
    /// Sanitized variant: redirect under `data/asan/`.
    pub sanitized: bool,
}

impl InstallSpec {
    pub fn device() -> InstallSpec {
        InstallSpec::default()
    }

    pub fn host() -> InstallSpec {
        InstallSpec {
            host: true,
            ..InstallSpec::default()
        }
    }

    pub fn in_data(mut self) -> Self {
        self.in_data = true;
        self
    }

    pub fn in_recovery(mut self) -> Self {
        self.in_recovery = true;
        self
    }

    pub fn vendor(mut self) -> Self {
        self.vendor = true;
        self
    }

    pub fn odm(mut self) -> Self {
        self.odm = true;
        self
    }

    pub fn product(mut self) -> Self {
        self.product = true;
        self
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitized = true;
        self
    }
}

/// The device partition for a spec. Precedence: data, then recovery,
/// then vendor/odm/product, then system; a sanitized variant is
/// redirected under `data/asan/`.
pub fn partition(spec: &InstallSpec) -> String {
    let base = if spec.in_data {
        "data"
    } else if spec.in_recovery {
        // Recovery mirrors the system partition layout.
        "recovery/root/system"
    } else if spec.vendor {
        "vendor"
    } else if spec.odm {
        "odm"
    } else if spec.product {
        "product"
    } else {
        "system"
    };

    if spec.sanitized {
        format!("data/asan/{}", base)
    } else {
        base.to_string()
    }
}

/// The full install destination for a spec plus path components.
///
/// Device: `target/product/<product>/<partition>/<parts>`.
/// Host: `host/<host-os>-x86/<parts>`.
/// Debug installs get a `debug/` super-prefix.
pub fn install_path(
    layout: &Layout,
    spec: &InstallSpec,
    parts: &[&str],
) -> Result<OutputPath, PathError> {
    let mut components: Vec<String> = Vec::new();

    if layout.debug_install {
        components.push("debug".to_string());
    }

    if spec.host {
        components.push("host".to_string());
        components.push(format!("{}-x86", layout.host_os));
    } else {
        components.push("target".to_string());
        components.push("product".to_string());
        components.push(layout.product.clone());
        components.push(partition(spec));
    }

    for part in parts {
        components.push((*part).to_string());
    }

    let refs: Vec<&str> = components.iter().map(|s| s.as_str()).collect();
    OutputPath::new(layout, &refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new("src", "out").with_product("blueprint")
    }

    #[test]
    fn test_partition_precedence() {
        assert_eq!(partition(&InstallSpec::device()), "system");
        assert_eq!(partition(&InstallSpec::device().vendor()), "vendor");
        assert_eq!(partition(&InstallSpec::device().odm()), "odm");
        assert_eq!(partition(&InstallSpec::device().product()), "product");
        assert_eq!(
            partition(&InstallSpec::device().in_recovery()),
            "recovery/root/system"
        );
        // data wins over everything else
        assert_eq!(partition(&InstallSpec::device().in_data().vendor()), "data");
    }

    #[test]
    fn test_sanitized_redirect() {
        assert_eq!(
            partition(&InstallSpec::device().sanitized()),
            "data/asan/system"
        );
        assert_eq!(
            partition(&InstallSpec::device().vendor().sanitized()),
            "data/asan/vendor"
        );
    }

    #[test]
    fn test_device_install_path() {
        let p = install_path(
            &layout(),
            &InstallSpec::device(),
            &["app", "Messenger", "Messenger.apk"],
        )
        .unwrap();
        assert_eq!(
            p.rel().to_string_lossy(),
            "target/product/blueprint/system/app/Messenger/Messenger.apk"
        );
    }

    #[test]
    fn test_host_install_path_ignores_partition_flags() {
        let spec = InstallSpec {
            host: true,
            vendor: true,
            ..InstallSpec::default()
        };
        let p = install_path(&layout(), &spec, &["bin", "protogen"]).unwrap();
        assert_eq!(p.rel().to_string_lossy(), "host/linux-x86/bin/protogen");
    }

    #[test]
    fn test_debug_prefix() {
        let layout = layout().with_debug_install(true);
        let p = install_path(&layout, &InstallSpec::device(), &["framework.jar"]).unwrap();
        assert!(p.rel().starts_with("debug/target"));
    }

    #[test]
    fn test_every_flag_combination_total() {
        // The partition function must be defined for all combinations.
        for bits in 0..64u32 {
            let spec = InstallSpec {
                host: false,
                in_data: bits & 1 != 0,
                in_recovery: bits & 2 != 0,
                vendor: bits & 4 != 0,
                odm: bits & 8 != 0,
                product: bits & 16 != 0,
                sanitized: bits & 32 != 0,
            };
            let part = partition(&spec);
            assert!(!part.is_empty());
            assert!(install_path(&layout(), &spec, &["f"]).is_ok());
        }
    }
}
