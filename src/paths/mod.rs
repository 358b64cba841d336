//! The path namespace.
//!
//! Every location the engine reads or writes is one of a closed set of
//! path kinds, each constructed through validation against an explicit
//! [`Layout`] (source root + output root). Module outputs are scoped
//! under `.intermediates/<dir>/<name>/<variant>/`, which is what keeps
//! two modules (or two variants of one module) from ever colliding.
//!
//! Construction is the only place filesystem state is consulted, and
//! every probe (existence check or glob expansion) is recorded in an
//! [`Observations`] set so the caller can schedule re-evaluation when
//! the tree changes.

pub mod dedup;
pub mod install;
pub mod validate;

pub use dedup::{first_unique_paths, last_unique_paths};
pub use install::{install_path, partition, InstallSpec};
pub use validate::PathError;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use crate::util::Symbol;
use validate::{clean, has_glob, join_validated, join_validated_glob};

/// The immutable tree layout threaded through all path construction.
///
/// Passing this explicitly (instead of ambient globals) is what makes
/// parallel evaluation of independent modules safe by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Root of the immutable input tree.
    pub source_root: PathBuf,
    /// Root of the mutable build-output tree.
    pub out_dir: PathBuf,
    /// Product name, used for device install roots.
    pub product: String,
    /// Host OS name, used for host install roots (e.g. `linux`).
    pub host_os: String,
    /// Prefix install destinations with `debug/`.
    pub debug_install: bool,
}

impl Layout {
    /// A layout with default product/host settings.
    pub fn new(source_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Layout {
            source_root: source_root.into(),
            out_dir: out_dir.into(),
            product: "generic".to_string(),
            host_os: "linux".to_string(),
            debug_install: false,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn with_host_os(mut self, host_os: impl Into<String>) -> Self {
        self.host_os = host_os.into();
        self
    }

    pub fn with_debug_install(mut self, debug: bool) -> Self {
        self.debug_install = debug;
        self
    }
}

/// Filesystem facts the evaluation depended on.
///
/// Keys are source-root-relative strings, so a recorded set is stable
/// across machines with different checkouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Observations {
    /// Existence probes: relative path -> whether it existed.
    pub files: BTreeMap<String, bool>,
    /// Glob expansions: pattern -> matched relative paths (sorted).
    pub globs: BTreeMap<String, Vec<String>>,
}

impl Observations {
    pub fn new() -> Self {
        Observations::default()
    }

    pub fn record_file(&mut self, rel: impl Into<String>, exists: bool) {
        self.files.insert(rel.into(), exists);
    }

    pub fn record_glob(&mut self, pattern: impl Into<String>, matches: Vec<String>) {
        self.globs.insert(pattern.into(), matches);
    }

    /// Merge another set into this one. Probes agree by construction
    /// (both ran against the same tree), so later entries may overwrite.
    pub fn merge(&mut self, other: Observations) {
        self.files.extend(other.files);
        self.globs.extend(other.globs);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.globs.is_empty()
    }
}

fn ensure_contained(root: &Path, full: &Path) -> Result<(), PathError> {
    if full.starts_with(root) {
        Ok(())
    } else {
        Err(PathError::OutsideRoot {
            path: full.display().to_string(),
            root: root.display().to_string(),
        })
    }
}

/// A validated path into the immutable input tree.
///
/// Carries a `rel` component (the portion below its construction base)
/// so sibling generated paths can be derived without losing the
/// original file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePath {
    path: PathBuf,
    rel: PathBuf,
}

impl SourcePath {
    /// Construct a source path under `base` (itself relative to the
    /// source root) and require the file to exist. The existence probe
    /// is recorded in `obs`.
    pub fn new(
        layout: &Layout,
        obs: &mut Observations,
        base: &str,
        parts: &[&str],
    ) -> Result<SourcePath, PathError> {
        match Self::new_maybe_missing(layout, obs, base, parts)? {
            Some(p) => Ok(p),
            None => {
                let rel = relative_of(base, parts)?;
                Err(PathError::MissingSource { path: rel })
            }
        }
    }

    /// Construct a source path, returning `None` (instead of failing)
    /// when the file does not exist. The probe is still recorded, so a
    /// later appearance of the file retriggers evaluation.
    pub fn new_maybe_missing(
        layout: &Layout,
        obs: &mut Observations,
        base: &str,
        parts: &[&str],
    ) -> Result<Option<SourcePath>, PathError> {
        if !base.is_empty() {
            validate::validate_component(base)?;
        }
        let rel = join_validated(parts.iter().copied())?;
        let tree_rel = if base.is_empty() {
            rel.clone()
        } else {
            clean(&format!("{}/{}", base, rel))
        };

        let full = layout.source_root.join(&tree_rel);
        ensure_contained(&layout.source_root, &full)?;

        let exists = full.is_file();
        obs.record_file(tree_rel, exists);
        if !exists {
            return Ok(None);
        }

        Ok(Some(SourcePath {
            path: full,
            rel: PathBuf::from(rel),
        }))
    }

    /// The portion of this path below its construction base.
    pub fn rel(&self) -> &Path {
        &self.rel
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn relative_of(base: &str, parts: &[&str]) -> Result<String, PathError> {
    let rel = join_validated(parts.iter().copied())?;
    Ok(if base.is_empty() {
        rel
    } else {
        clean(&format!("{}/{}", base, rel))
    })
}

/// A validated path under the build-output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputPath {
    path: PathBuf,
    rel: PathBuf,
}

impl OutputPath {
    /// Construct an output path. No existence requirement: outputs are
    /// created by the build.
    pub fn new(layout: &Layout, parts: &[&str]) -> Result<OutputPath, PathError> {
        let rel = join_validated(parts.iter().copied())?;
        let full = layout.out_dir.join(&rel);
        ensure_contained(&layout.out_dir, &full)?;
        Ok(OutputPath {
            path: full,
            rel: PathBuf::from(rel),
        })
    }

    /// Join further validated components, extending `rel`.
    pub fn join(&self, parts: &[&str]) -> Result<OutputPath, PathError> {
        let tail = join_validated(parts.iter().copied())?;
        Ok(OutputPath {
            path: self.path.join(&tail),
            rel: self.rel.join(&tail),
        })
    }

    pub fn rel(&self) -> &Path {
        &self.rel
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// An [`OutputPath`] scoped to one module variant's intermediates
/// directory: `.intermediates/<dir>/<name>/<variant>/…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleOutPath {
    out: OutputPath,
}

impl ModuleOutPath {
    pub fn rel(&self) -> &Path {
        self.out.rel()
    }

    pub fn as_path(&self) -> &Path {
        self.out.as_path()
    }

    /// Erase the module scoping, keeping the underlying output path.
    pub fn into_output(self) -> OutputPath {
        self.out
    }

    pub fn as_output(&self) -> &OutputPath {
        &self.out
    }
}

impl fmt::Display for ModuleOutPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.out)
    }
}

/// A symbolic, non-filesystem build target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhonyPath {
    name: Symbol,
}

impl PhonyPath {
    pub fn new(name: impl AsRef<str>) -> PhonyPath {
        PhonyPath {
            name: Symbol::intern(name),
        }
    }

    pub fn name(&self) -> Symbol {
        self.name
    }
}

impl fmt::Display for PhonyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Per-variant path factory: the module's directory, name, and rendered
/// variant key, bound to a layout.
///
/// All module-scoped paths flow through here, so the namespace
/// guarantee (distinct `(name, variant)` never collide) holds at the
/// only construction site.
#[derive(Debug, Clone)]
pub struct ModuleScope<'a> {
    layout: &'a Layout,
    dir: &'a str,
    name: &'a str,
    variant: String,
}

impl<'a> ModuleScope<'a> {
    pub fn new(
        layout: &'a Layout,
        dir: &'a str,
        name: &'a str,
        variant: impl Into<String>,
    ) -> ModuleScope<'a> {
        ModuleScope {
            layout,
            dir,
            name,
            variant: variant.into(),
        }
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    fn root_parts(&self) -> Vec<&str> {
        let mut parts = vec![".intermediates"];
        if !self.dir.is_empty() {
            parts.push(self.dir);
        }
        parts.push(self.name);
        parts.push(&self.variant);
        parts
    }

    /// The variant's intermediates root.
    pub fn root(&self) -> Result<ModuleOutPath, PathError> {
        Ok(ModuleOutPath {
            out: OutputPath::new(self.layout, &self.root_parts())?,
        })
    }

    /// A path under the variant's intermediates root.
    pub fn out(&self, parts: &[&str]) -> Result<ModuleOutPath, PathError> {
        let mut all = self.root_parts();
        all.extend_from_slice(parts);
        Ok(ModuleOutPath {
            out: OutputPath::new(self.layout, &all)?,
        })
    }

    /// Re-root a source path under a module-scoped subdirectory,
    /// preserving its `rel` component exactly.
    pub fn derived(&self, subdir: &str, src: &SourcePath) -> Result<ModuleOutPath, PathError> {
        let rel = src.rel().to_string_lossy();
        let scoped = self.out(&[subdir, rel.as_ref()])?;
        Ok(ModuleOutPath {
            out: OutputPath {
                path: scoped.out.path,
                rel: src.rel().to_path_buf(),
            },
        })
    }
}

/// Any path a build statement may reference.
///
/// Module scoping is erased here; what remains is the source/output
/// role split plus phony targets. The roles are deliberately not
/// interchangeable: statements take inputs and outputs as distinct
/// kinds and there is no conversion between [`SourcePath`] and
/// [`OutputPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnyPath {
    Source(SourcePath),
    Output(OutputPath),
    Phony(PhonyPath),
}

impl AnyPath {
    /// Render the path as it appears in emitted statements.
    pub fn render(&self) -> String {
        match self {
            AnyPath::Source(p) => p.to_string(),
            AnyPath::Output(p) => p.to_string(),
            AnyPath::Phony(p) => p.to_string(),
        }
    }
}

impl fmt::Display for AnyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl Serialize for AnyPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.render())
    }
}

impl From<SourcePath> for AnyPath {
    fn from(p: SourcePath) -> Self {
        AnyPath::Source(p)
    }
}

impl From<OutputPath> for AnyPath {
    fn from(p: OutputPath) -> Self {
        AnyPath::Output(p)
    }
}

impl From<ModuleOutPath> for AnyPath {
    fn from(p: ModuleOutPath) -> Self {
        AnyPath::Output(p.into_output())
    }
}

impl From<PhonyPath> for AnyPath {
    fn from(p: PhonyPath) -> Self {
        AnyPath::Phony(p)
    }
}

/// Expand declared source patterns under `base` into existing files.
///
/// Patterns without glob metacharacters are required to exist
/// (`MissingSource` otherwise); glob patterns may match nothing. Every
/// probe and expansion is recorded in `obs`.
pub fn expand_sources(
    layout: &Layout,
    obs: &mut Observations,
    base: &str,
    patterns: &[String],
) -> Result<Vec<SourcePath>, PathError> {
    let mut out = Vec::new();

    for pattern in patterns {
        if !has_glob(pattern) {
            out.push(SourcePath::new(layout, obs, base, &[pattern])?);
            continue;
        }

        let rel_pattern = if base.is_empty() {
            join_validated_glob([pattern.as_str()])?
        } else {
            validate::validate_component(base)?;
            clean(&format!("{}/{}", base, join_validated_glob([pattern.as_str()])?))
        };

        let matches = crate::util::fs::glob_files(&layout.source_root, &rel_pattern)
            .map_err(|e| PathError::InvalidPath {
                component: pattern.clone(),
                reason: e.to_string(),
            })?;

        let base_dir = if base.is_empty() {
            layout.source_root.clone()
        } else {
            layout.source_root.join(base)
        };

        let mut matched_rels = Vec::new();
        for full in matches {
            ensure_contained(&layout.source_root, &full)?;
            let rel = full
                .strip_prefix(&base_dir)
                .unwrap_or(&full)
                .to_path_buf();
            let tree_rel = full
                .strip_prefix(&layout.source_root)
                .unwrap_or(&full)
                .to_string_lossy()
                .to_string();
            matched_rels.push(tree_rel);
            out.push(SourcePath { path: full, rel });
        }
        obs.record_glob(rel_pattern, matched_rels);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture_layout(tmp: &TempDir) -> Layout {
        Layout::new(tmp.path().join("src"), tmp.path().join("out"))
    }

    fn touch(root: &Path, rel: &str) {
        let full = root.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, "x").unwrap();
    }

    #[test]
    fn test_source_path_requires_existence() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);
        touch(&layout.source_root, "java/app/Main.java");

        let mut obs = Observations::new();
        let p = SourcePath::new(&layout, &mut obs, "java/app", &["Main.java"]).unwrap();
        assert_eq!(p.rel(), Path::new("Main.java"));
        assert_eq!(obs.files.get("java/app/Main.java"), Some(&true));

        let missing = SourcePath::new(&layout, &mut obs, "java/app", &["Gone.java"]);
        assert!(matches!(missing, Err(PathError::MissingSource { .. })));
        assert_eq!(obs.files.get("java/app/Gone.java"), Some(&false));
    }

    #[test]
    fn test_maybe_missing_records_probe() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);
        fs::create_dir_all(&layout.source_root).unwrap();

        let mut obs = Observations::new();
        let p =
            SourcePath::new_maybe_missing(&layout, &mut obs, "keys", &["release.pk8"]).unwrap();
        assert!(p.is_none());
        assert_eq!(obs.files.get("keys/release.pk8"), Some(&false));
    }

    #[test]
    fn test_source_rejects_escape() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);
        fs::create_dir_all(&layout.source_root).unwrap();

        let mut obs = Observations::new();
        let err = SourcePath::new(&layout, &mut obs, "java", &["../../etc/passwd"]);
        assert!(matches!(err, Err(PathError::EscapesRoot { .. })));
    }

    #[test]
    fn test_output_path_no_existence_check() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);

        let p = OutputPath::new(&layout, &["target", "product", "generic"]).unwrap();
        assert!(p.as_path().starts_with(&layout.out_dir));
        assert_eq!(p.rel(), Path::new("target/product/generic"));

        let joined = p.join(&["system", "app"]).unwrap();
        assert_eq!(joined.rel(), Path::new("target/product/generic/system/app"));
    }

    #[test]
    fn test_module_out_paths_distinct_per_variant() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);

        let a = ModuleScope::new(&layout, "java/core", "core-runtime", "device_common")
            .out(&["classes", "core-runtime.jar"])
            .unwrap();
        let b = ModuleScope::new(&layout, "java/core", "core-runtime", "host_common")
            .out(&["classes", "core-runtime.jar"])
            .unwrap();
        let c = ModuleScope::new(&layout, "java/core", "core-util", "device_common")
            .out(&["classes", "core-runtime.jar"])
            .unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert!(a
            .as_path()
            .to_string_lossy()
            .contains(".intermediates/java/core/core-runtime/device_common"));
    }

    #[test]
    fn test_derived_preserves_rel() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);
        touch(&layout.source_root, "java/app/proto/msg.proto");

        let mut obs = Observations::new();
        let src = SourcePath::new(&layout, &mut obs, "java/app", &["proto/msg.proto"]).unwrap();

        let scope = ModuleScope::new(&layout, "java/app", "messenger", "device_common");
        let derived = scope.derived("gen", &src).unwrap();

        assert_eq!(derived.rel(), src.rel());
        assert!(derived
            .as_path()
            .to_string_lossy()
            .ends_with("messenger/device_common/gen/proto/msg.proto"));
    }

    #[test]
    fn test_expand_sources_glob_and_literal() {
        let tmp = TempDir::new().unwrap();
        let layout = fixture_layout(&tmp);
        touch(&layout.source_root, "native/lib/a.c");
        touch(&layout.source_root, "native/lib/b.c");
        touch(&layout.source_root, "native/lib/notes.md");

        let mut obs = Observations::new();
        let srcs = expand_sources(
            &layout,
            &mut obs,
            "native/lib",
            &["*.c".to_string()],
        )
        .unwrap();
        assert_eq!(srcs.len(), 2);
        assert_eq!(srcs[0].rel(), Path::new("a.c"));
        assert!(obs.globs.contains_key("native/lib/*.c"));

        // Literal patterns must exist.
        let err = expand_sources(
            &layout,
            &mut obs,
            "native/lib",
            &["missing.c".to_string()],
        );
        assert!(matches!(err, Err(PathError::MissingSource { .. })));
    }

    #[test]
    fn test_phony_path() {
        let p = PhonyPath::new("core-runtime");
        assert_eq!(p.to_string(), "core-runtime");
        let any: AnyPath = p.into();
        assert_eq!(any.render(), "core-runtime");
    }
}
