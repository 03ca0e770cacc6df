//! External process execution for recipe commands.

use std::io;
use std::process::Command;

/// Executes one shell command, letting its output stream through, and
/// reports the exit status. Implementations are called from concurrently
/// running tasks.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &str) -> io::Result<i32>;
}

/// Runs commands through `sh -c` with inherited stdio.
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(&self, command: &str) -> io::Result<i32> {
        let status = Command::new("sh").arg("-c").arg(command).status()?;
        // Death by signal carries no exit code; report it as failure.
        Ok(status.code().unwrap_or(-1))
    }
}
