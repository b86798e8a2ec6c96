//! Administrative CLI invocation.
//!
//! The [`CommandRunner`] trait abstracts running one CLI command under an
//! identity. [`CfCli`] runs the real binary; tests substitute a recording
//! mock.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CommandError;

/// Environment variable the CLI reads its session state from.
pub const CF_HOME_ENV: &str = "CF_HOME";

/// One CLI command bound to an identity's home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    args: Vec<String>,
    secrets: Vec<usize>,
    home: PathBuf,
    acting_user: String,
}

impl Invocation {
    /// Start an invocation running as `acting_user` with session state in `home`.
    pub fn new(home: impl Into<PathBuf>, acting_user: impl Into<String>) -> Self {
        Self {
            args: Vec::new(),
            secrets: Vec::new(),
            home: home.into(),
            acting_user: acting_user.into(),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument that must not appear in logs or error messages.
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secrets.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The CLI subcommand, e.g. `create-org`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn acting_user(&self) -> &str {
        &self.acting_user
    }

    /// Render as `cf <args>` with secret arguments masked.
    pub fn redacted(&self) -> String {
        let mut rendered = String::from("cf");
        for (index, arg) in self.args.iter().enumerate() {
            rendered.push(' ');
            if self.secrets.contains(&index) {
                rendered.push_str("[REDACTED]");
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs administrative CLI commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation`, failing if it exits non-zero or exceeds `timeout`.
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs the real CLI binary as a child process.
#[derive(Debug, Clone)]
pub struct CfCli {
    binary: PathBuf,
}

impl CfCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for CfCli {
    fn default() -> Self {
        Self::new("cf")
    }
}

#[async_trait]
impl CommandRunner for CfCli {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let command = invocation.redacted();
        debug!(
            command = %command,
            user = %invocation.acting_user(),
            ?timeout,
            "Running CLI command"
        );

        let child = tokio::process::Command::new(&self.binary)
            .args(invocation.args())
            .env(CF_HOME_ENV, invocation.home())
            .env("CF_COLOR", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| CommandError::Wait {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command, ?timeout, "CLI command timed out");
                return Err(CommandError::TimedOut { command, timeout });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            // The CLI reports most failures on stdout.
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(CommandError::Failed {
                command,
                status: output.status.code(),
                stderr: detail,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
