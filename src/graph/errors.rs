//! Module-graph error types and diagnostics.
//!
//! Errors accumulate per owning module in an [`ErrorSink`] instead of
//! aborting evaluation; only the fatal kinds (duplicate outputs, a
//! broken namespace containment check) stop the whole run.

use std::collections::BTreeMap;

use miette::Diagnostic as MietteDiagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::core::DepTag;
use crate::paths::PathError;
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::Symbol;

/// Error during graph construction or assembly.
#[derive(Debug, Clone, Error, MietteDiagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("invalid module declaration: {problem}")]
    #[diagnostic(code(drydock::decl::invalid_property))]
    PropertyValidation { problem: String },

    #[error("no variant of `{name}` matches {tag} dependency ({constraints})")]
    #[diagnostic(code(drydock::deps::missing))]
    MissingDependency {
        name: String,
        tag: DepTag,
        constraints: String,
    },

    #[error("{tag} dependency on `{name}` matches {} variants ({constraints})", candidates.len())]
    #[diagnostic(code(drydock::deps::ambiguous))]
    AmbiguousDependency {
        name: String,
        tag: DepTag,
        constraints: String,
        candidates: Vec<String>,
    },

    #[error("cycle detected in module graph")]
    #[diagnostic(code(drydock::graph::cycle))]
    DependencyCycle { members: Vec<String> },

    #[error("duplicate output `{output}`")]
    #[diagnostic(
        code(drydock::actions::duplicate_output),
        help("every output path must be produced by exactly one statement")
    )]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },
}

impl GraphError {
    /// Whether this error invalidates the whole evaluation rather than
    /// just the owning module.
    pub fn is_fatal(&self) -> bool {
        match self {
            GraphError::DuplicateOutput { .. } => true,
            GraphError::Path(p) => p.is_fatal(),
            _ => false,
        }
    }

    /// Short stable code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::Path(p) => match p {
                PathError::InvalidPath { .. } | PathError::UnsupportedDerivation { .. } => {
                    "invalid-path"
                }
                PathError::EscapesRoot { .. } => "escapes-root",
                PathError::OutsideRoot { .. } => "outside-root",
                PathError::MissingSource { .. } => "missing-source",
            },
            GraphError::PropertyValidation { .. } => "invalid-property",
            GraphError::MissingDependency { .. } => "missing-dependency",
            GraphError::AmbiguousDependency { .. } => "ambiguous-dependency",
            GraphError::DependencyCycle { .. } => "dependency-cycle",
            GraphError::DuplicateOutput { .. } => "duplicate-output",
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::Path(err) => {
                let mut diag = Diagnostic::error(err.to_string());
                if matches!(err, PathError::MissingSource { .. }) {
                    diag = diag.with_suggestion(suggestions::MISSING_SOURCE);
                }
                diag
            }

            GraphError::PropertyValidation { problem } => {
                Diagnostic::error(format!("invalid module declaration: {}", problem))
            }

            GraphError::MissingDependency {
                name,
                tag,
                constraints,
            } => Diagnostic::error(format!(
                "no variant of `{}` satisfies a {} dependency",
                name, tag
            ))
            .with_context(format!("required variations: {}", constraints))
            .with_suggestion(suggestions::UNKNOWN_MODULE),

            GraphError::AmbiguousDependency {
                name,
                tag,
                constraints,
                candidates,
            } => Diagnostic::error(format!(
                "{} dependency on `{}` is ambiguous",
                tag, name
            ))
            .with_context(format!("required variations: {}", constraints))
            .with_context(format!("candidates: {}", candidates.join(", ")))
            .with_suggestion(suggestions::AMBIGUOUS_VARIANT),

            GraphError::DependencyCycle { members } => {
                Diagnostic::error("cycle detected in module graph")
                    .with_context(format!("cycle members: {}", members.join(" -> ")))
                    .with_suggestion("Break the cycle by removing or restructuring dependencies")
            }

            GraphError::DuplicateOutput {
                output,
                first,
                second,
            } => Diagnostic::error(format!("two statements claim output `{}`", output))
                .with_context(format!("first: {}", first))
                .with_context(format!("second: {}", second))
                .with_suggestion(suggestions::DUPLICATE_OUTPUT),
        }
    }
}

/// One reported error with its owning module, for serialized reports.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub module: String,
    pub code: &'static str,
    pub message: String,
}

/// Accumulates errors against their owning modules.
///
/// Keyed by module name (not variant): a reader debugging a broken
/// module wants every variant's failures in one place. Iteration order
/// is lexical, so reports are stable.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    errors: BTreeMap<Symbol, Vec<GraphError>>,
}

impl ErrorSink {
    pub fn new() -> ErrorSink {
        ErrorSink::default()
    }

    /// Report an error against a module.
    pub fn report(&mut self, module: Symbol, error: GraphError) {
        tracing::debug!(module = module.as_str(), code = error.code(), "reported");
        self.errors.entry(module).or_default().push(error);
    }

    /// Merge another sink into this one (module order stays lexical).
    pub fn merge(&mut self, other: ErrorSink) {
        for (module, errs) in other.errors {
            self.errors.entry(module).or_default().extend(errs);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Modules that have at least one reported error.
    pub fn failed_modules(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.errors.keys().copied()
    }

    pub fn contains(&self, module: Symbol) -> bool {
        self.errors.contains_key(&module)
    }

    /// Iterate (module, errors) in lexical module order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &[GraphError])> {
        self.errors.iter().map(|(m, errs)| (*m, errs.as_slice()))
    }

    /// The first fatal error, if any was reported.
    pub fn first_fatal(&self) -> Option<(Symbol, &GraphError)> {
        self.errors
            .iter()
            .flat_map(|(m, errs)| errs.iter().map(move |e| (*m, e)))
            .find(|(_, e)| e.is_fatal())
    }

    /// Flatten into serializable records.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.iter()
            .flat_map(|(module, errs)| {
                errs.iter().map(move |e| ErrorRecord {
                    module: module.as_str().to_string(),
                    code: e.code(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_accumulates_per_module() {
        let mut sink = ErrorSink::new();
        sink.report(
            Symbol::intern("messenger"),
            GraphError::MissingDependency {
                name: "libjni".to_string(),
                tag: DepTag::EmbeddedNative,
                constraints: "os=device, arch=arm64, link=shared".to_string(),
            },
        );
        sink.report(
            Symbol::intern("messenger"),
            GraphError::PropertyValidation {
                problem: "`privileged` applies only to app".to_string(),
            },
        );

        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 2);
        assert!(sink.contains(Symbol::intern("messenger")));
        assert!(!sink.contains(Symbol::intern("other")));
    }

    #[test]
    fn test_fatal_detection() {
        let mut sink = ErrorSink::new();
        sink.report(
            Symbol::intern("a"),
            GraphError::MissingDependency {
                name: "b".to_string(),
                tag: DepTag::Link,
                constraints: "os=device".to_string(),
            },
        );
        assert!(sink.first_fatal().is_none());

        sink.report(
            Symbol::intern("c"),
            GraphError::DuplicateOutput {
                output: "out/x".to_string(),
                first: "a".to_string(),
                second: "c".to_string(),
            },
        );
        let (module, err) = sink.first_fatal().unwrap();
        assert_eq!(module.as_str(), "c");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ambiguous_diagnostic_lists_candidates() {
        let err = GraphError::AmbiguousDependency {
            name: "libnative".to_string(),
            tag: DepTag::Link,
            constraints: "os=device".to_string(),
            candidates: vec![
                "device_arm_shared".to_string(),
                "device_arm64_shared".to_string(),
            ],
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("ambiguous"));
        assert!(output.contains("device_arm_shared"));
        assert!(output.contains("device_arm64_shared"));
    }

    #[test]
    fn test_records_are_lexically_ordered() {
        let mut sink = ErrorSink::new();
        sink.report(
            Symbol::intern("zeta"),
            GraphError::PropertyValidation {
                problem: "p1".to_string(),
            },
        );
        sink.report(
            Symbol::intern("alpha"),
            GraphError::PropertyValidation {
                problem: "p2".to_string(),
            },
        );

        let records = sink.records();
        assert_eq!(records[0].module, "alpha");
        assert_eq!(records[1].module, "zeta");
    }
}
