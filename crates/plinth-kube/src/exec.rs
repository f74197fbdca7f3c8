//! Running helm and kubectl
//!
//! External tools are black boxes: the engine builds an [`Invocation`],
//! hands it to a [`CommandRunner`] and inspects the combined output.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{DeployError, Result};

/// A program to run, with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Data written to the process' standard input
    pub stdin: Option<String>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            dir: None,
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

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Human readable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of running a program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `-1` when killed by a signal
    pub code: i32,
    /// Stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            code: 0,
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            output: output.into(),
        }
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; a non-zero exit is reported in the output, not as an error
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation.command_line(), "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        // Stdin is fed while the output is drained
        let writer = match (invocation.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(input.as_bytes()).await
            })),
            _ => None,
        };
        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await.map_err(std::io::Error::other)? {
                Ok(()) => {}
                // The program exited without reading all of its input
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

/// Run and turn failure into [`DeployError::Command`]
///
/// A failure whose output contains one of `benign` comes back as `Ok` with
/// `success == false`, so the caller can print a notice instead of failing.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    benign: &[&str],
) -> Result<CommandOutput> {
    let output = runner.run(invocation).await?;
    if output.success {
        return Ok(output);
    }
    if benign.iter().any(|b| output.output.contains(b)) {
        debug!(command = %invocation.command_line(), "ignoring benign failure");
        return Ok(output);
    }
    Err(DeployError::Command {
        command: invocation.command_line(),
        code: output.code,
        output: output.output.trim_end().to_string(),
    })
}
