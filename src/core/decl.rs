//! Module declarations and build settings.
//!
//! This is the engine's input boundary: an already-structured set of
//! declarations (the external description loader hands us data, not a
//! language to parse). The CLI reads the TOML form; the library only
//! sees the deserialized types, read-only.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::variant::{Arch, LinkMode};

/// What a module builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Compiles sources into a jar; may export flag files and join the
    /// boot classpath.
    JavaLibrary,
    /// Compiles per-arch native code into shared/static libraries.
    NativeLibrary,
    /// Packages compiled classes, embedded native libraries, and
    /// signing credentials into an installable app.
    App,
    /// A signing credential pair (public certificate + private key).
    SigningKey,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::JavaLibrary => "java-library",
            ModuleKind::NativeLibrary => "native-library",
            ModuleKind::App => "app",
            ModuleKind::SigningKey => "signing-key",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Graph-wide build settings from the `[settings]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Product name; names the device install root.
    #[serde(default = "default_product")]
    pub product: String,

    /// Host OS name for host install roots.
    #[serde(default = "default_host_os")]
    pub host_os: String,

    /// Device architectures apps package native libraries for.
    #[serde(default = "default_device_arches")]
    pub device_arches: Vec<Arch>,

    /// Prefix install destinations with `debug/`.
    #[serde(default)]
    pub debug_install: bool,

    /// Directory (under the source root) searched for named
    /// certificates and for key files missing from a module's own dir.
    #[serde(default = "default_key_dir")]
    pub default_key_dir: String,

    /// Certificate stem used when an app declares none.
    #[serde(default = "default_certificate")]
    pub default_certificate: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            product: default_product(),
            host_os: default_host_os(),
            device_arches: default_device_arches(),
            debug_install: false,
            default_key_dir: default_key_dir(),
            default_certificate: default_certificate(),
        }
    }
}

fn default_product() -> String {
    "generic".to_string()
}

fn default_host_os() -> String {
    "linux".to_string()
}

fn default_device_arches() -> Vec<Arch> {
    vec![Arch::Arm64, Arch::Arm]
}

fn default_key_dir() -> String {
    "build/keys".to_string()
}

fn default_certificate() -> String {
    "testkey".to_string()
}

fn default_true() -> bool {
    true
}

/// One declared module, before variant expansion.
///
/// The field set is the union over kinds; `validate` rejects fields
/// that contradict the declared kind, so a decl that loads cleanly is
/// internally consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleDecl {
    /// Unique module name.
    pub name: String,

    /// What this module builds.
    pub kind: ModuleKind,

    /// Directory (relative to the source root) this module's sources
    /// and keys live under.
    #[serde(default)]
    pub dir: String,

    /// Source patterns relative to `dir`; literals must exist, globs
    /// may match nothing.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Ordinary link dependencies.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Static link dependencies; their exported flag files fold into
    /// this module's.
    #[serde(default)]
    pub static_deps: Vec<String>,

    /// Classpath-only references.
    #[serde(default)]
    pub classpath_libs: Vec<String>,

    /// Host-built tools required before this module's actions run.
    #[serde(default)]
    pub host_tools: Vec<String>,

    /// Flag files (relative to `dir`) exported to dependents.
    #[serde(default)]
    pub exported_flags: Vec<String>,

    /// Also build for the host.
    #[serde(default)]
    pub host_supported: bool,

    /// Build for the device (on by default).
    #[serde(default = "default_true")]
    pub device_supported: bool,

    /// Install the built artifact. Defaults per kind: apps yes,
    /// libraries no, keys no.
    #[serde(default)]
    pub installable: Option<bool>,

    /// Member of the runtime boot classpath (java-library only).
    #[serde(default)]
    pub boot_member: bool,

    // --- native-library ---
    /// Device architectures to build for; defaults to the settings'
    /// device arches.
    #[serde(default)]
    pub arches: Vec<Arch>,

    /// Link modes to build; defaults to shared only.
    #[serde(default)]
    pub link_modes: Vec<LinkMode>,

    /// Build the sanitized flavor instead of the plain one.
    #[serde(default)]
    pub sanitize: bool,

    /// SoC-specific: installs to the vendor partition.
    #[serde(default)]
    pub vendor: bool,

    // --- app ---
    /// Signing certificate: `":module"` references a signing-key
    /// module, a bare name resolves in the default key dir, absent
    /// falls back to the default certificate.
    #[serde(default)]
    pub certificate: Option<String>,

    /// Extra signing certificates; each must be a `":module"` reference.
    #[serde(default)]
    pub additional_certificates: Vec<String>,

    /// Install under the privileged app root.
    #[serde(default)]
    pub privileged: bool,

    /// Native libraries packaged into the app, one per device arch.
    #[serde(default)]
    pub embed_native_libs: Vec<String>,

    // --- signing-key ---
    /// Public certificate file name.
    #[serde(default)]
    pub public_key: Option<String>,

    /// Private key file name.
    #[serde(default)]
    pub private_key: Option<String>,
}

impl ModuleDecl {
    /// A minimal declaration of the given kind.
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> ModuleDecl {
        ModuleDecl {
            name: name.into(),
            kind,
            dir: String::new(),
            sources: Vec::new(),
            deps: Vec::new(),
            static_deps: Vec::new(),
            classpath_libs: Vec::new(),
            host_tools: Vec::new(),
            exported_flags: Vec::new(),
            host_supported: false,
            device_supported: true,
            installable: None,
            boot_member: false,
            arches: Vec::new(),
            link_modes: Vec::new(),
            sanitize: false,
            vendor: false,
            certificate: None,
            additional_certificates: Vec::new(),
            privileged: false,
            embed_native_libs: Vec::new(),
            public_key: None,
            private_key: None,
        }
    }

    /// Whether the built artifact should be installed.
    pub fn installable(&self) -> bool {
        self.installable.unwrap_or(match self.kind {
            ModuleKind::App => true,
            ModuleKind::JavaLibrary | ModuleKind::NativeLibrary | ModuleKind::SigningKey => false,
        })
    }

    /// Effective device arches for a native library.
    pub fn effective_arches(&self, settings: &BuildSettings) -> Vec<Arch> {
        if self.arches.is_empty() {
            settings.device_arches.clone()
        } else {
            self.arches.clone()
        }
    }

    /// Effective link modes for a native library.
    pub fn effective_link_modes(&self) -> Vec<LinkMode> {
        if self.link_modes.is_empty() {
            vec![LinkMode::Shared]
        } else {
            self.link_modes.clone()
        }
    }

    /// Check the declaration for self-contradictions. Returns every
    /// problem found, not just the first.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.is_empty() {
            problems.push("module name may not be empty".to_string());
        }

        if !self.device_supported && !self.host_supported {
            problems.push("module supports neither device nor host".to_string());
        }

        match self.kind {
            ModuleKind::JavaLibrary => {
                self.reject_native_fields(&mut problems);
                self.reject_app_fields(&mut problems);
                self.reject_key_fields(&mut problems);
            }
            ModuleKind::NativeLibrary => {
                if self.boot_member {
                    problems.push("`boot-member` applies only to java-library".to_string());
                }
                self.reject_app_fields(&mut problems);
                self.reject_key_fields(&mut problems);
            }
            ModuleKind::App => {
                if self.boot_member {
                    problems.push("`boot-member` applies only to java-library".to_string());
                }
                if self.host_supported {
                    problems.push("apps are device-only".to_string());
                }
                self.reject_native_fields(&mut problems);
                self.reject_key_fields(&mut problems);
                for cert in &self.additional_certificates {
                    if !cert.starts_with(':') {
                        problems.push(format!(
                            "`additional-certificates` entry `{}` must be a `:module` reference",
                            cert
                        ));
                    }
                }
            }
            ModuleKind::SigningKey => {
                if self.public_key.is_none() || self.private_key.is_none() {
                    problems
                        .push("signing-key requires both `public-key` and `private-key`".to_string());
                }
                if !self.sources.is_empty() {
                    problems.push("signing-key takes no `sources`".to_string());
                }
                if self.host_supported {
                    problems.push("signing keys are device-only".to_string());
                }
                self.reject_native_fields(&mut problems);
                self.reject_app_fields(&mut problems);
            }
        }

        problems
    }

    fn reject_native_fields(&self, problems: &mut Vec<String>) {
        if !self.arches.is_empty() {
            problems.push(format!("`arches` applies only to native-library, not {}", self.kind));
        }
        if !self.link_modes.is_empty() {
            problems.push(format!(
                "`link-modes` applies only to native-library, not {}",
                self.kind
            ));
        }
        if self.sanitize {
            problems.push(format!("`sanitize` applies only to native-library, not {}", self.kind));
        }
    }

    fn reject_app_fields(&self, problems: &mut Vec<String>) {
        if self.certificate.is_some() || !self.additional_certificates.is_empty() {
            problems.push(format!("certificates apply only to app, not {}", self.kind));
        }
        if self.privileged {
            problems.push(format!("`privileged` applies only to app, not {}", self.kind));
        }
        if !self.embed_native_libs.is_empty() {
            problems.push(format!(
                "`embed-native-libs` applies only to app, not {}",
                self.kind
            ));
        }
    }

    fn reject_key_fields(&self, problems: &mut Vec<String>) {
        if self.public_key.is_some() || self.private_key.is_some() {
            problems.push(format!("key files apply only to signing-key, not {}", self.kind));
        }
    }
}

/// A whole declaration file: settings plus modules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeclFile {
    #[serde(default)]
    pub settings: BuildSettings,

    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDecl>,
}

impl DeclFile {
    /// Load and parse a declaration file.
    pub fn load(path: &Path) -> Result<DeclFile> {
        let content = crate::util::fs::read_to_string(path)?;
        let file: DeclFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse declarations: {}", path.display()))?;
        Ok(file)
    }

    /// The modules as shared snapshots for the pipeline.
    pub fn shared_modules(&self) -> Vec<Arc<ModuleDecl>> {
        self.modules.iter().cloned().map(Arc::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_decls() {
        let toml_src = r#"
            [settings]
            product = "blueprint"

            [[module]]
            name = "core-runtime"
            kind = "java-library"
            dir = "java/core"
            sources = ["src/**/*.java"]
            boot-member = true

            [[module]]
            name = "libjni"
            kind = "native-library"
            dir = "native/jni"
            sources = ["*.c"]
            arches = ["arm64"]
            link-modes = ["shared", "static"]
        "#;

        let file: DeclFile = toml::from_str(toml_src).unwrap();
        assert_eq!(file.settings.product, "blueprint");
        assert_eq!(file.modules.len(), 2);
        assert_eq!(file.modules[0].kind, ModuleKind::JavaLibrary);
        assert!(file.modules[0].boot_member);
        assert_eq!(file.modules[1].arches, vec![Arch::Arm64]);
        assert_eq!(
            file.modules[1].effective_link_modes(),
            vec![LinkMode::Shared, LinkMode::Static]
        );
    }

    #[test]
    fn test_settings_defaults() {
        let file: DeclFile = toml::from_str("").unwrap();
        assert_eq!(file.settings.product, "generic");
        assert_eq!(file.settings.device_arches, vec![Arch::Arm64, Arch::Arm]);
        assert_eq!(file.settings.default_certificate, "testkey");
    }

    #[test]
    fn test_installable_defaults_per_kind() {
        assert!(ModuleDecl::new("a", ModuleKind::App).installable());
        assert!(!ModuleDecl::new("l", ModuleKind::JavaLibrary).installable());

        let mut lib = ModuleDecl::new("l", ModuleKind::JavaLibrary);
        lib.installable = Some(true);
        assert!(lib.installable());
    }

    #[test]
    fn test_validate_cross_kind_fields() {
        let mut decl = ModuleDecl::new("oops", ModuleKind::JavaLibrary);
        decl.privileged = true;
        decl.arches = vec![Arch::Arm];
        let problems = decl.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("privileged")));
        assert!(problems.iter().any(|p| p.contains("arches")));
    }

    #[test]
    fn test_validate_signing_key() {
        let decl = ModuleDecl::new("release-key", ModuleKind::SigningKey);
        let problems = decl.validate();
        assert!(problems.iter().any(|p| p.contains("public-key")));

        let mut ok = ModuleDecl::new("release-key", ModuleKind::SigningKey);
        ok.public_key = Some("release.x509.pem".to_string());
        ok.private_key = Some("release.pk8".to_string());
        assert!(ok.validate().is_empty());
    }

    #[test]
    fn test_validate_additional_certificates_form() {
        let mut app = ModuleDecl::new("messenger", ModuleKind::App);
        app.additional_certificates = vec!["extra-key".to_string()];
        let problems = app.validate();
        assert!(problems.iter().any(|p| p.contains(":module")));
    }
}
