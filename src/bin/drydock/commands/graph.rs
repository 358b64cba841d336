//! `drydock graph` command

use anyhow::{bail, Result};

use crate::cli::GraphArgs;
use drydock::ops::{format_graph, graph, GraphOptions};

pub fn execute(args: GraphArgs) -> Result<()> {
    let options = GraphOptions {
        decl_file: args.decls,
    };

    let report = graph(&options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_graph(&report));
    }

    if !report.errors.is_empty() {
        bail!("{} edge(s) failed to resolve", report.errors.len());
    }

    Ok(())
}
