//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Drydock - a variant-aware build graph engine
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a declaration file into build statements
    Eval(EvalArgs),

    /// List the settled variant graph without assembling
    Graph(GraphArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct EvalArgs {
    /// Declaration file to evaluate
    pub decls: PathBuf,

    /// Source tree root (defaults to the declaration file's directory)
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Directory for generated build files
    #[arg(short, long, default_value = "out")]
    pub out_dir: PathBuf,

    /// Number of parallel assembly jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Evaluate and report without writing any files
    #[arg(long)]
    pub check: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Declaration file to evaluate
    pub decls: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
