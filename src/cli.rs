//! Command-line interface definitions for tenon.

use clap::Parser;

/// Declarative rule-file build tool.
#[derive(Parser)]
#[command(name = "tenon", version, about)]
pub struct Cli {
    /// Rule file to read.
    #[arg(long, short = 'f', default_value = "Makefile")]
    pub file: String,

    /// Maximum number of targets building simultaneously.
    #[arg(long, short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Do not echo recipe lines before running them.
    #[arg(long, short = 's', conflicts_with = "verbose")]
    pub silent: bool,

    /// Enable verbose output with scheduling and timing diagnostics.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Targets to build; defaults to the first rule's targets.
    pub targets: Vec<String>,
}
