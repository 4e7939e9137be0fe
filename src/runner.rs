//! Every external program (`git`, `ssh`, the browser opener) is started
//! through [`Runner`], so handlers can be driven by a scripted fake in tests.

use crate::error::{Error, Result};
use std::process::{Command, Stdio};
use tracing::debug;

/// Runs a program to completion and returns its captured standard output.
pub trait Runner {
    /// Run `program` with `args`, blocking until it exits.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] when the program cannot be started and
    /// [`Error::TransportFailure`] when it exits unsuccessfully.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// [`Runner`] backed by real child processes in the current directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let command = render_command(program, args);
        debug!(%command, "running");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(%command, code = ?output.status.code(), "command failed");
        Err(Error::TransportFailure {
            command,
            code: output.status.code(),
            stdout,
            stderr,
        })
    }
}

/// Space-joined command line, used in logs and error messages.
#[must_use]
pub fn render_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Quote `raw` for a POSIX shell, as the remote end of `ssh` joins its
/// arguments into one command line.
#[must_use]
pub fn sh_single_quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().saturating_add(2));
    out.push('\'');
    for ch in raw.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
