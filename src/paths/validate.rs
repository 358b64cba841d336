//! Path component validation.
//!
//! Every constructed path goes through these checks before it is joined
//! onto a root: components are lexically cleaned, then rejected if they
//! are absolute, escape upward, or still carry a substitution marker.
//! Glob metacharacters are only legal where the caller explicitly
//! expands patterns.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// Errors produced while constructing or deriving paths.
///
/// All of these are reported against the module that requested the path;
/// only `OutsideRoot` poisons the whole evaluation, since it means a
/// path that passed validation still landed outside its root and the
/// namespace guarantee is broken.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum PathError {
    /// A component carries an unexpanded `$` substitution marker, or a
    /// glob metacharacter in a context that does not expand globs.
    #[error("invalid path component `{component}`: {reason}")]
    #[diagnostic(code(drydock::paths::invalid_path))]
    InvalidPath { component: String, reason: String },

    /// A component is absolute or climbs above its root after cleaning.
    #[error("path escapes its root: `{component}`")]
    #[diagnostic(
        code(drydock::paths::escapes_root),
        help("components may not be absolute or begin with `..` once cleaned")
    )]
    EscapesRoot { component: String },

    /// A fully-joined path landed outside the declared root. This is an
    /// internal invariant failure, fatal to the whole evaluation.
    #[error("constructed path `{path}` is outside root `{root}`")]
    #[diagnostic(code(drydock::paths::outside_root))]
    OutsideRoot { path: String, root: String },

    /// A required source file is absent from the input tree.
    #[error("source file does not exist: `{path}`")]
    #[diagnostic(
        code(drydock::paths::missing_source),
        help("check the module's `dir` and source patterns against the source tree")
    )]
    MissingSource { path: String },

    /// A path kind was asked for a derivation it does not support.
    #[error("`{path}` does not support {operation}")]
    #[diagnostic(code(drydock::paths::invalid_path))]
    UnsupportedDerivation { path: String, operation: String },
}

impl PathError {
    /// Whether this error invalidates the whole evaluation rather than
    /// just the owning module.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PathError::OutsideRoot { .. })
    }
}

/// Lexically clean a path: drop `.` and empty segments, fold `..`
/// against preceding segments, keep unmatched leading `..`s, preserve a
/// leading `/`. The empty path cleans to `.`.
pub fn clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                Some(_) => out.push(".."),
                None => {
                    // At an absolute root, `..` stays at the root.
                    if !absolute {
                        out.push("..");
                    }
                }
            },
            seg => out.push(seg),
        }
    }

    let joined = out.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Whether a pattern contains glob metacharacters.
pub fn has_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Validate a single component: clean it, then reject absolute
/// components and components that still begin with `..`.
pub fn validate_safe_component(component: &str) -> Result<(), PathError> {
    let cleaned = clean(component);
    if cleaned.starts_with('/') || cleaned == ".." || cleaned.starts_with("../") {
        return Err(PathError::EscapesRoot {
            component: component.to_string(),
        });
    }
    Ok(())
}

/// Validate a single component for non-glob contexts: additionally
/// reject `$` markers and glob metacharacters.
pub fn validate_component(component: &str) -> Result<(), PathError> {
    if component.contains('$') {
        return Err(PathError::InvalidPath {
            component: component.to_string(),
            reason: "contains an unexpanded substitution marker (`$`)".to_string(),
        });
    }
    if has_glob(component) {
        return Err(PathError::InvalidPath {
            component: component.to_string(),
            reason: "globs are not allowed here".to_string(),
        });
    }
    validate_safe_component(component)
}

/// Validate every component and join them with `/`, cleaned.
pub fn join_validated<'a>(
    components: impl IntoIterator<Item = &'a str>,
) -> Result<String, PathError> {
    let mut parts = Vec::new();
    for component in components {
        validate_component(component)?;
        parts.push(component);
    }
    Ok(clean(&parts.join("/")))
}

/// Like [`join_validated`] but permits glob metacharacters, for the
/// source-pattern expansion entry point.
pub fn join_validated_glob<'a>(
    components: impl IntoIterator<Item = &'a str>,
) -> Result<String, PathError> {
    let mut parts = Vec::new();
    for component in components {
        if component.contains('$') {
            return Err(PathError::InvalidPath {
                component: component.to_string(),
                reason: "contains an unexpanded substitution marker (`$`)".to_string(),
            });
        }
        validate_safe_component(component)?;
        parts.push(component);
    }
    Ok(clean(&parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_basic() {
        assert_eq!(clean("a/b/c"), "a/b/c");
        assert_eq!(clean("a//b"), "a/b");
        assert_eq!(clean("a/./b"), "a/b");
        assert_eq!(clean("a/b/.."), "a");
        assert_eq!(clean(""), ".");
        assert_eq!(clean("."), ".");
        assert_eq!(clean("a/.."), ".");
    }

    #[test]
    fn test_clean_parent_escapes() {
        assert_eq!(clean(".."), "..");
        assert_eq!(clean("../a"), "../a");
        assert_eq!(clean("a/../../b"), "../b");
        assert_eq!(clean("/../a"), "/a");
    }

    #[test]
    fn test_validate_rejects_escape() {
        assert!(validate_component("..").is_err());
        assert!(validate_component("../sibling").is_err());
        assert!(validate_component("a/../../b").is_err());
        assert!(validate_component("/abs/path").is_err());
    }

    #[test]
    fn test_validate_allows_internal_parent() {
        // `a/../b` cleans to `b`, which stays inside the root.
        assert!(validate_component("a/../b").is_ok());
        assert!(validate_component("nested/dir/file.java").is_ok());
    }

    #[test]
    fn test_validate_rejects_markers_and_globs() {
        assert!(matches!(
            validate_component("${out}/file"),
            Err(PathError::InvalidPath { .. })
        ));
        assert!(matches!(
            validate_component("src/*.java"),
            Err(PathError::InvalidPath { .. })
        ));
        assert!(join_validated_glob(["src/*.java"]).is_ok());
        assert!(join_validated_glob(["$var/*.java"]).is_err());
    }

    #[test]
    fn test_join_validated() {
        assert_eq!(join_validated(["a", "b", "c.txt"]).unwrap(), "a/b/c.txt");
        assert_eq!(join_validated(["a/", "./b"]).unwrap(), "a/b");
        assert!(join_validated(["a", "../../b"]).is_err());
    }

    #[test]
    fn test_fatal_classification() {
        let err = PathError::OutsideRoot {
            path: "x".into(),
            root: "r".into(),
        };
        assert!(err.is_fatal());
        let err = PathError::EscapesRoot {
            component: "..".into(),
        };
        assert!(!err.is_fatal());
    }
}
