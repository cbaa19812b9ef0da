//! Command line interface for the lodestar tool.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// lodestar - inspect the lowering pass and compiled units of the engine core
#[derive(Parser, Debug)]
#[command(name = "lodestar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "LODESTAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG (e.g. `debug`, `lodestar_core=trace`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lower a serialized parse tree and assemble its units
    Lower(LowerArgs),

    /// Print the effective engine configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct LowerArgs {
    /// Parse tree in JSON form
    #[arg(value_name = "FILE.json")]
    pub file: PathBuf,

    /// Print the lowered tree of every body
    #[arg(short, long)]
    pub tree: bool,

    /// Print a summary of each compiled unit
    #[arg(short, long)]
    pub units: bool,

    /// Compile as code passed to `eval`
    #[arg(long)]
    pub eval: bool,
}
