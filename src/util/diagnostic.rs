//! User-facing diagnostic messages.
//!
//! Module-graph errors accumulate during evaluation instead of aborting
//! it; this module renders each accumulated record with its context and
//! any actionable follow-up.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error output.
pub mod suggestions {
    /// Suggestion when a dependency name matches no module.
    pub const UNKNOWN_MODULE: &str =
        "help: Run `drydock graph <decls>` to list every module and variant";

    /// Suggestion when an edge matches more than one variant.
    pub const AMBIGUOUS_VARIANT: &str =
        "help: Constrain the dependency (arch/link) so exactly one variant matches";

    /// Suggestion when a required source file is missing.
    pub const MISSING_SOURCE: &str =
        "help: Check the module's `dir` and source patterns against the source tree";

    /// Suggestion when two statements claim one output.
    pub const DUPLICATE_OUTPUT: &str =
        "help: Rename one module, or give the colliding variants distinct install paths";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
                Severity::Help => "\x1b[1;32mhelp\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("dependency `libjni` matched 2 variants of `libnative`")
            .with_context("candidates: device_arm_shared, device_arm64_shared")
            .with_suggestion("Constrain the edge to a single arch")
            .with_suggestion("Split the consumer per arch instead");

        let output = diag.format(false);
        assert!(output.contains("error: dependency `libjni`"));
        assert!(output.contains("candidates: device_arm_shared"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Constrain the edge"));
    }

    #[test]
    fn test_warning_severity() {
        let diag = Diagnostic::warning("module `stub` has no sources");
        assert_eq!(diag.severity, Severity::Warning);
        assert!(diag.format(false).starts_with("warning:"));
    }
}
