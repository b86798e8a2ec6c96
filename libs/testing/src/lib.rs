//! # tenant-fixture-testing
//!
//! Recording stand-ins for the fixture's collaborators.
//!
//! [`MockCommandRunner`] and [`MockApiClient`] append every call to a shared
//! [`Journal`], so a test can assert on the interleaving of CLI commands and
//! REST requests. Either mock can be told to fail a specific call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use tenant_fixture::client::QUOTA_DEFINITIONS_PATH;
use tenant_fixture::{
    ApiClient, ApiError, CommandError, CommandOutput, CommandRunner, IdentityScope, Invocation,
};

/// CLI subcommands issued by identity scopes rather than by fixture steps.
pub const SESSION_COMMANDS: &[&str] = &["api", "auth", "target", "oauth-token", "logout"];

/// Guid the mock API assigns to created quota definitions.
pub const DEFAULT_QUOTA_GUID: &str = "2f1c8b5e-6d0a-4c7e-9a3b-quota";

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Command {
        user: String,
        args: Vec<String>,
        timeout: Duration,
    },
    Request {
        user: String,
        method: String,
        path: String,
        body: Option<Value>,
    },
}

impl Call {
    /// Identity the call was made under.
    pub fn user(&self) -> &str {
        match self {
            Call::Command { user, .. } | Call::Request { user, .. } => user,
        }
    }

    /// Short form for assertions: the subcommand, or `METHOD path`.
    pub fn label(&self) -> String {
        match self {
            Call::Command { args, .. } => args.first().cloned().unwrap_or_default(),
            Call::Request { method, path, .. } => format!("{method} {path}"),
        }
    }

    /// True for login/logout plumbing issued by an identity scope.
    pub fn is_session(&self) -> bool {
        match self {
            Call::Command { args, .. } => args
                .first()
                .is_some_and(|sub| SESSION_COMMANDS.contains(&sub.as_str())),
            Call::Request { .. } => false,
        }
    }
}

/// Ordered log shared between mocks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: Call) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        // A panicking test thread poisons the lock; the log is still usable.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    /// Calls made by fixture steps, without identity-scope plumbing.
    pub fn step_calls(&self) -> Vec<Call> {
        self.lock()
            .iter()
            .filter(|call| !call.is_session())
            .cloned()
            .collect()
    }

    /// Labels of [`step_calls`](Self::step_calls).
    pub fn step_labels(&self) -> Vec<String> {
        self.step_calls().iter().map(Call::label).collect()
    }

    /// Number of commands run with this subcommand.
    pub fn count_command(&self, subcommand: &str) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, Call::Command { args, .. } if args.first().is_some_and(|a| a == subcommand)))
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// How an injected command failure manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFailure {
    /// Exit with the given status.
    Exit(i32),
    /// Exceed the timeout.
    Timeout,
}

/// Command runner that records invocations and succeeds unless told not to.
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    journal: Journal,
    failures: Mutex<HashMap<String, CommandFailure>>,
}

impl MockCommandRunner {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Fail every invocation of `subcommand`.
    #[must_use]
    pub fn failing(self, subcommand: &str, failure: CommandFailure) -> Self {
        self.fail(subcommand, failure);
        self
    }

    /// Start failing `subcommand` on a runner that is already in use.
    pub fn fail(&self, subcommand: &str, failure: CommandFailure) {
        self.lock_failures().insert(subcommand.to_string(), failure);
    }

    /// Let `subcommand` succeed again.
    pub fn recover(&self, subcommand: &str) {
        self.lock_failures().remove(subcommand);
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<String, CommandFailure>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!(command = %invocation.redacted(), "Mock command");
        self.journal.record(Call::Command {
            user: invocation.acting_user().to_string(),
            args: invocation.args().to_vec(),
            timeout,
        });

        let subcommand = invocation.subcommand().unwrap_or_default();
        let failure = self.lock_failures().get(subcommand).copied();
        match failure {
            Some(CommandFailure::Exit(status)) => {
                return Err(CommandError::Failed {
                    command: invocation.redacted(),
                    status: Some(status),
                    stderr: format!("FAILED: injected failure for {subcommand}"),
                })
            }
            Some(CommandFailure::Timeout) => {
                return Err(CommandError::TimedOut {
                    command: invocation.redacted(),
                    timeout,
                })
            }
            None => {}
        }

        let stdout = match subcommand {
            "oauth-token" => format!("bearer mock-token-{}\n", invocation.acting_user()),
            _ => "OK\n".to_string(),
        };
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// API client that records requests and answers like the v2 API.
#[derive(Debug)]
pub struct MockApiClient {
    journal: Journal,
    quota_guid: String,
    failures: Vec<(Method, String, u16)>,
    overrides: Vec<(Method, String, Value)>,
}

impl MockApiClient {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            quota_guid: DEFAULT_QUOTA_GUID.to_string(),
            failures: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Guid handed out for created quota definitions.
    #[must_use]
    pub fn with_quota_guid(mut self, guid: impl Into<String>) -> Self {
        self.quota_guid = guid.into();
        self
    }

    /// Answer `method` requests whose path starts with `path_prefix` with `status`.
    #[must_use]
    pub fn failing(mut self, method: Method, path_prefix: &str, status: u16) -> Self {
        self.failures.push((method, path_prefix.to_string(), status));
        self
    }

    /// Answer `method path` with a fixed body.
    #[must_use]
    pub fn responding(mut self, method: Method, path: &str, body: Value) -> Self {
        self.overrides.push((method, path.to_string(), body));
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn request(
        &self,
        scope: &IdentityScope,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        debug!(%method, path, "Mock request");
        self.journal.record(Call::Request {
            user: scope.user().username.clone(),
            method: method.to_string(),
            path: path.to_string(),
            body: body.cloned(),
        });

        if let Some((_, _, status)) = self
            .failures
            .iter()
            .find(|(m, prefix, _)| *m == method && path.starts_with(prefix.as_str()))
        {
            return Err(ApiError::status(
                method.as_str(),
                path,
                *status,
                r#"{"code":10001,"description":"injected failure"}"#,
            ));
        }

        if let Some((_, _, response)) = self
            .overrides
            .iter()
            .find(|(m, p, _)| *m == method && p == path)
        {
            return Ok(response.clone());
        }

        if method == Method::POST && path == QUOTA_DEFINITIONS_PATH {
            return Ok(json!({
                "metadata": {
                    "guid": self.quota_guid,
                    "url": format!("{QUOTA_DEFINITIONS_PATH}/{}", self.quota_guid),
                },
                "entity": body.cloned().unwrap_or(Value::Null),
            }));
        }

        Ok(Value::Null)
    }
}

/// A journal with a runner and API client wired to it.
pub fn mocks() -> (Journal, MockCommandRunner, MockApiClient) {
    let journal = Journal::new();
    let runner = MockCommandRunner::new(journal.clone());
    let api = MockApiClient::new(journal.clone());
    (journal, runner, api)
}
