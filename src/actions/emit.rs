//! Emission of the evaluated graph.
//!
//! Four artifacts leave the evaluator: the ninja file the external
//! executor consumes, a JSON listing of every statement, the install
//! manifest, and the filesystem observation record that drives
//! re-evaluation. Nothing here is written until the whole evaluation
//! is known to be free of fatal errors.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::ModuleId;
use crate::paths::Observations;
use crate::util::fs::write_string;
use crate::util::hash::Fingerprint;

use super::assemble::ModuleOutputs;
use super::statement::{ActionSet, BuildStatement, Rule};

/// Escape a path for a ninja build line.
fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '$' => out.push_str("$$"),
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            _ => out.push(c),
        }
    }
    out
}

fn path_list(paths: &[crate::paths::AnyPath]) -> String {
    paths
        .iter()
        .map(|p| escape(&p.render()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the whole action set as ninja text.
pub fn ninja_text(actions: &ActionSet) -> String {
    let mut out = String::new();
    out.push_str("# build statement graph; generated, do not edit.\n");
    out.push_str(&format!("# graph {}\n\n", graph_digest(actions)));

    for rule in actions.rules_used() {
        if rule == Rule::Phony {
            continue;
        }
        out.push_str(&format!("rule {}\n", rule.name()));
        out.push_str(&format!("  command = {}\n", rule.command()));
        out.push('\n');
    }

    for statement in actions.statements() {
        out.push_str(&render_build_line(statement));
    }
    out
}

fn render_build_line(statement: &BuildStatement) -> String {
    let mut line = format!(
        "build {}: {}",
        path_list(&statement.outputs),
        statement.rule.name()
    );
    if !statement.inputs.is_empty() {
        line.push(' ');
        line.push_str(&path_list(&statement.inputs));
    }
    if !statement.implicit.is_empty() {
        line.push_str(" | ");
        line.push_str(&path_list(&statement.implicit));
    }
    line.push('\n');
    if statement.rule != Rule::Phony {
        line.push_str(&format!("  description = {}\n", statement.description));
        for (key, value) in &statement.args {
            line.push_str(&format!("  {} = {}\n", key, value));
        }
    }
    line.push('\n');
    line
}

/// Stable digest over every statement, for change detection.
pub fn graph_digest(actions: &ActionSet) -> String {
    let mut fp = Fingerprint::new();
    for statement in actions.statements() {
        fp.update_str(statement.rule.name());
        fp.update_str(&statement.description);
        let paths = statement
            .inputs
            .iter()
            .chain(&statement.implicit)
            .chain(&statement.outputs);
        for path in paths {
            fp.update_str(&path.render());
        }
        for (key, value) in &statement.args {
            fp.update_str(key);
            fp.update_str(value);
        }
    }
    fp.finish_short()
}

pub fn write_ninja(path: &Path, actions: &ActionSet) -> Result<()> {
    write_string(path, &ninja_text(actions))
        .with_context(|| format!("failed to write ninja file to {}", path.display()))
}

pub fn write_statements(path: &Path, actions: &ActionSet) -> Result<()> {
    let json = serde_json::to_string_pretty(actions.statements())
        .context("failed to serialize build statements")?;
    write_string(path, &json)
        .with_context(|| format!("failed to write statement listing to {}", path.display()))
}

#[derive(Debug, Serialize)]
struct InstallRecord {
    module: ModuleId,
    source: String,
    dest: String,
}

/// Serialize the install mapping, ordered by (module, variant).
pub fn install_manifest_json(published: &BTreeMap<ModuleId, ModuleOutputs>) -> Result<String> {
    let records: Vec<InstallRecord> = published
        .iter()
        .flat_map(|(id, outputs)| {
            outputs.installs.iter().map(|entry| InstallRecord {
                module: *id,
                source: entry.source.render(),
                dest: entry.dest.to_string(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&records).context("failed to serialize install manifest")
}

pub fn write_install_manifest(
    path: &Path,
    published: &BTreeMap<ModuleId, ModuleOutputs>,
) -> Result<()> {
    let json = install_manifest_json(published)?;
    write_string(path, &json)
        .with_context(|| format!("failed to write install manifest to {}", path.display()))
}

pub fn write_observations(path: &Path, observations: &Observations) -> Result<()> {
    let json =
        serde_json::to_string_pretty(observations).context("failed to serialize observations")?;
    write_string(path, &json)
        .with_context(|| format!("failed to write observations to {}", path.display()))
}
