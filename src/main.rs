//! tenon — a declarative rule-file build tool.
//!
//! Given a rule file describing targets, their prerequisites, and the shell
//! recipes that produce them, tenon rebuilds whatever is older than its
//! prerequisites, running independent targets concurrently up to `-j` jobs.
//!
//! Pipeline: parse rule file → resolve prerequisites → expand each
//!           requested target into a task graph → run tasks → run recipes.

mod build;
mod cli;
mod deps;
mod graph;
mod parser;
mod runner;
mod vars;
mod verbose;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::parser::Rulefile;
use crate::runner::ShellRunner;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    verbose::init(cli.silent, cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        // The failing task already printed its diagnostic.
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &cli::Cli) -> Result<bool> {
    let model = Rulefile::load(Path::new(&cli.file))?;
    build::run(
        Arc::new(model),
        &cli.targets,
        cli.jobs.max(1),
        Arc::new(ShellRunner),
    )
}
