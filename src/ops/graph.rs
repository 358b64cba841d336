//! List the settled variant graph without assembling any actions.
//!
//! Runs the pipeline only: splitting and edge resolution, no paths, no
//! statements. Useful for answering "what variants exist and who
//! depends on whom" while authoring declarations.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::{DeclFile, ModuleKind};
use crate::graph::{ErrorRecord, ErrorSink};
use crate::mutator;

/// Options for the graph listing.
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    /// Declaration file to evaluate.
    pub decl_file: PathBuf,
}

/// One settled variant and its outgoing edges.
#[derive(Debug, Clone, Serialize)]
pub struct VariantEntry {
    /// Display name, `name (variant)`.
    pub module: String,

    pub kind: ModuleKind,

    /// Resolved outgoing edges, in producer order.
    pub deps: Vec<DepEntry>,
}

/// One resolved edge.
#[derive(Debug, Clone, Serialize)]
pub struct DepEntry {
    pub tag: String,
    pub to: String,
}

/// The settled graph, flattened for display.
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub variants: Vec<VariantEntry>,
    pub errors: Vec<ErrorRecord>,
}

/// Settle the graph for a declaration file.
pub fn graph(options: &GraphOptions) -> Result<GraphReport> {
    let file = DeclFile::load(&options.decl_file)?;
    let decls = file.shared_modules();

    let mut errors = ErrorSink::new();
    let pipeline = mutator::run(&decls, &file.settings, &mut errors);

    let mut variants = Vec::new();
    for id in pipeline.graph.ids() {
        let Some(variant) = pipeline.variant(id) else {
            continue;
        };
        let deps = pipeline
            .graph
            .deps(id)
            .into_iter()
            .map(|(to, tag)| DepEntry {
                tag: tag.as_str().to_string(),
                to: to.display_name(),
            })
            .collect();
        variants.push(VariantEntry {
            module: id.display_name(),
            kind: variant.decl.kind,
            deps,
        });
    }

    Ok(GraphReport {
        variants,
        errors: errors.records(),
    })
}

/// Format a graph report for terminal display.
pub fn format_graph(report: &GraphReport) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for entry in &report.variants {
        writeln!(out, "{}  [{}]", entry.module, entry.kind).unwrap();
        for dep in &entry.deps {
            writeln!(out, "  -> {}  ({})", dep.to, dep.tag).unwrap();
        }
    }

    if !report.errors.is_empty() {
        writeln!(out, "\n{} unresolved:", report.errors.len()).unwrap();
        for record in &report.errors {
            writeln!(out, "  {}: {}", record.module, record.message).unwrap();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn decl_file(toml_src: &str) -> (TempDir, GraphOptions) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("build.toml");
        fs::write(&path, toml_src).unwrap();
        (tmp, GraphOptions { decl_file: path })
    }

    #[test]
    fn test_graph_lists_variants_and_edges() {
        let (_tmp, options) = decl_file(
            r#"
            [[module]]
            name = "core-lib"
            kind = "java-library"
            host-supported = true

            [[module]]
            name = "shell"
            kind = "app"
            deps = ["core-lib"]
            "#,
        );

        let report = graph(&options).unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(report.variants.len(), 3);

        let shell = report
            .variants
            .iter()
            .find(|v| v.module.starts_with("shell"))
            .unwrap();
        assert_eq!(shell.kind, ModuleKind::App);
        assert_eq!(shell.deps.len(), 1);
        assert_eq!(shell.deps[0].tag, "link");
        assert_eq!(shell.deps[0].to, "core-lib (device_common)");
    }

    #[test]
    fn test_graph_reports_unresolved() {
        let (_tmp, options) = decl_file(
            r#"
            [[module]]
            name = "orphan"
            kind = "java-library"
            deps = ["no-such"]
            "#,
        );

        let report = graph(&options).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, "missing-dependency");

        let text = format_graph(&report);
        assert!(text.contains("orphan (device_common)"));
        assert!(text.contains("1 unresolved:"));
    }
}
