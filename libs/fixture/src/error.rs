//! Error types for fixture setup and teardown.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::context::Phase;

/// Errors from running an administrative CLI command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command started but its output could not be collected.
    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", display_status(.status))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The command did not finish within its timeout and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl CommandError {
    /// Returns true if the command was killed for exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

/// Errors from control-plane REST requests.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to parse response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl ApiError {
    /// Create a status error from response details.
    pub fn status(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::Status {
            method: method.into(),
            path: path.into(),
            status,
            body: body.into(),
        }
    }
}

/// Errors loading or validating the integration config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field failed validation.
    #[error("invalid config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Errors surfaced by the fixture lifecycle.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to encode request payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The per-identity CLI home could not be created or removed.
    #[error("failed to {action} CLI home directory: {source}")]
    Home {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `oauth-token` printed nothing usable.
    #[error("no access token issued for user {username}")]
    MissingToken { username: String },

    /// The quota-definition response carried no `metadata.guid`.
    #[error("quota definition {name} was created without a guid")]
    MissingGuid { name: String },

    /// A lifecycle operation was called out of order.
    #[error("cannot {operation} a context in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    /// One or more teardown steps failed. Every step was still attempted.
    #[error("teardown failed: {}", join_errors(.0))]
    Teardown(Vec<FixtureError>),
}

fn join_errors(errors: &[FixtureError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FixtureError {
    /// Returns true if this error, or any teardown failure inside it, is a
    /// command timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            FixtureError::Command(err) => err.is_timeout(),
            FixtureError::Teardown(errors) => errors.iter().any(FixtureError::is_timeout),
            _ => false,
        }
    }
}
