//! `drydock eval` command

use anyhow::{bail, Result};

use crate::cli::EvalArgs;
use drydock::ops::{eval, EvalOptions};
use drydock::util::diagnostic;

pub fn execute(args: EvalArgs, color: bool) -> Result<()> {
    let options = EvalOptions {
        decl_file: args.decls,
        source_root: args.source_root,
        out_dir: args.out_dir,
        jobs: args.jobs,
        emit: !args.check,
    };

    let report = eval(&options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for diag in &report.diagnostics {
            diagnostic::emit(diag, color);
        }
        eprintln!(
            "    Evaluated {} module(s): {} variant(s), {} statement(s), {} install(s)",
            report.modules, report.variants, report.statements, report.installs
        );
        if let Some(ref digest) = report.digest {
            eprintln!("    Statement graph {}", digest);
        }
    }

    if report.halted {
        bail!("evaluation halted; no build files were written");
    }
    if report.has_errors() {
        bail!("{} module(s) failed", report.failed_count());
    }

    Ok(())
}
