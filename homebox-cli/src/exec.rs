//! Running external programs
//!
//! Every tool the bootstrap touches (ssh-keygen, brew, puppet, gpg, rvm, gem,
//! hdiutil...) goes through a `CommandRunner` so stages can be exercised
//! against a scripted runner in tests.

use snafu::{ResultExt, ensure};
use std::fmt;
use tracing::debug;

use crate::error::{Result, SpawnSnafu, ToolFailedSnafu};

/// A single program invocation.
#[derive(Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    secret_args: Vec<usize>,
    stdin: Option<Vec<u8>>,
    passthrough: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_args: Vec::new(),
            stdin: None,
            passthrough: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Argument that must never be rendered (e.g. `ssh-keygen -N`).
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Bytes written to the child's stdin.
    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Let the child's stdout/stderr reach the terminal.
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_bytes(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Command line with secret arguments masked.
    pub fn display(&self) -> String {
        let mut rendered = vec![self.program.clone()];
        for (idx, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&idx) {
                rendered.push("****".to_string());
            } else {
                rendered.push(arg.clone());
            }
        }
        rendered.join(" ")
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.display())
            .field("stdin", &self.stdin.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Captured result of a program run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait CommandRunner {
    /// Run to completion and return the exit code; output is discarded unless
    /// the invocation is marked passthrough.
    fn status(&self, invocation: &Invocation) -> Result<i32>;

    /// Run to completion capturing stdout.
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// `CommandRunner` backed by real child processes.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn status(&self, invocation: &Invocation) -> Result<i32> {
        debug!(command = %invocation.display(), "calling");

        let mut expr = duct::cmd(invocation.program.as_str(), invocation.args.iter()).unchecked();
        if !invocation.passthrough {
            expr = expr.stdout_null().stderr_null();
        }
        if let Some(input) = &invocation.stdin {
            expr = expr.stdin_bytes(input.clone());
        }

        let output = expr.run().context(SpawnSnafu {
            program: invocation.program.clone(),
        })?;
        Ok(output.status.code().unwrap_or(-1))
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation.display(), "capturing");

        let mut expr = duct::cmd(invocation.program.as_str(), invocation.args.iter())
            .stdout_capture()
            .stderr_null()
            .unchecked();
        if let Some(input) = &invocation.stdin {
            expr = expr.stdin_bytes(input.clone());
        }

        let output = expr.run().context(SpawnSnafu {
            program: invocation.program.clone(),
        })?;
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Exit code 0 means success; a program that cannot be spawned counts as a
/// failure rather than an error.
pub fn succeeds(runner: &dyn CommandRunner, invocation: &Invocation) -> bool {
    match runner.status(invocation) {
        Ok(code) => code == 0,
        Err(e) => {
            debug!(error = %e, "shell returned error");
            false
        }
    }
}

/// Run and turn a nonzero exit into `ToolFailed`.
pub fn require_success(runner: &dyn CommandRunner, invocation: &Invocation) -> Result<()> {
    let code = runner.status(invocation)?;
    ensure!(
        code == 0,
        ToolFailedSnafu {
            command: invocation.display(),
            code,
        }
    );
    Ok(())
}
