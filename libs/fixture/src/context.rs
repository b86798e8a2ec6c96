//! Suite context: the org, quota and user a test run owns.
//!
//! Lifecycle is linear:
//!
//! 1. [`ConfiguredContext::new`] generates unique names for the shard
//! 2. [`setup`](ConfiguredContext::setup) creates the user, quota and org as admin
//! 3. the suite runs as [`regular_user_context`](ConfiguredContext::regular_user_context)
//! 4. [`teardown`](ConfiguredContext::teardown) deletes them again as admin
//!
//! There is no retry and no rollback. A failed setup leaves whatever was
//! created for teardown to remove.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::client::{self, ApiClient};
use crate::config::IntegrationConfig;
use crate::error::FixtureError;
use crate::identity::with_identity;
use crate::names::{ContextNames, ShardIndex};
use crate::quota::QuotaDefinition;
use crate::runner::CommandRunner;
use crate::user::UserContext;

/// Timeout for quick user operations, before scaling.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for org operations and all teardown steps, before scaling.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for each login command of an identity scope, before scaling.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// Setup aborted part way. Teardown is still allowed.
    SetupFailed,
    SetUp,
    TornDown,
}

/// The contract suites program against.
///
/// Lifecycle futures are driven from the suite's own task and are not
/// required to be `Send`.
#[async_trait(?Send)]
pub trait SuiteContext {
    /// Create the tenant scaffolding.
    async fn setup(&mut self) -> Result<(), FixtureError>;

    /// Remove the tenant scaffolding.
    async fn teardown(&mut self) -> Result<(), FixtureError>;

    fn admin_user_context(&self) -> UserContext;

    fn regular_user_context(&self) -> UserContext;

    fn scaled_timeout(&self, timeout: Duration) -> Duration;
}

/// Context backed by a platform config and injected collaborators.
pub struct ConfiguredContext {
    config: IntegrationConfig,
    names: ContextNames,
    quota_definition_guid: Option<String>,
    is_persistent: bool,
    phase: Phase,
    runner: Arc<dyn CommandRunner>,
    api: Arc<dyn ApiClient>,
}

impl ConfiguredContext {
    /// Create a context whose names are unique to `prefix`, `shard` and now.
    pub fn new(
        config: IntegrationConfig,
        prefix: &str,
        shard: ShardIndex,
        runner: Arc<dyn CommandRunner>,
        api: Arc<dyn ApiClient>,
    ) -> Self {
        Self::with_names(config, ContextNames::now(prefix, shard), runner, api)
    }

    /// Create a context with names chosen by the caller.
    pub fn with_names(
        config: IntegrationConfig,
        names: ContextNames,
        runner: Arc<dyn CommandRunner>,
        api: Arc<dyn ApiClient>,
    ) -> Self {
        Self {
            config,
            names,
            quota_definition_guid: None,
            is_persistent: false,
            phase: Phase::Uninitialized,
            runner,
            api,
        }
    }

    /// Keep the org and quota on teardown. Only the regular user is deleted.
    #[must_use]
    pub fn persistent(mut self, is_persistent: bool) -> Self {
        self.is_persistent = is_persistent;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub fn names(&self) -> &ContextNames {
        &self.names
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Guid of the quota definition created by setup, once known.
    pub fn quota_definition_guid(&self) -> Option<&str> {
        self.quota_definition_guid.as_deref()
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn scaled_timeout(&self, timeout: Duration) -> Duration {
        self.config.scaled(timeout)
    }

    /// Admin identity, not scoped to any org.
    pub fn admin_user_context(&self) -> UserContext {
        UserContext::new(
            &self.config.api_endpoint,
            &self.config.admin_user,
            &self.config.admin_password,
            self.config.skip_ssl_validation,
        )
    }

    /// Regular-user identity, scoped to the generated org and space.
    pub fn regular_user_context(&self) -> UserContext {
        UserContext::new(
            &self.config.api_endpoint,
            &self.names.regular_user,
            &self.names.regular_password,
            self.config.skip_ssl_validation,
        )
        .targeting(&self.names.organization, &self.names.space)
    }

    /// Create the regular user, quota definition and org, then attach the
    /// quota to the org. Stops at the first failure.
    pub async fn setup(&mut self) -> Result<(), FixtureError> {
        if self.phase != Phase::Uninitialized {
            return Err(FixtureError::InvalidPhase {
                operation: "set up",
                phase: self.phase,
            });
        }

        let result = self.run_setup().await;
        self.phase = match &result {
            Ok(()) => Phase::SetUp,
            Err(err) => {
                warn!(org = %self.names.organization, error = %err, "Setup aborted");
                Phase::SetupFailed
            }
        };
        result
    }

    async fn run_setup(&mut self) -> Result<(), FixtureError> {
        let admin = self.admin_user_context();
        let session_timeout = self.scaled_timeout(SESSION_TIMEOUT);
        let short_timeout = self.scaled_timeout(SHORT_TIMEOUT);
        let long_timeout = self.scaled_timeout(LONG_TIMEOUT);

        let names = &self.names;
        let runner = self.runner.as_ref();
        let api = self.api.as_ref();
        let guid_slot = &mut self.quota_definition_guid;

        with_identity(runner, admin, session_timeout, async |scope| {
            info!(user = %names.regular_user, "Creating regular user");
            let create_user = scope
                .invocation()
                .arg("create-user")
                .arg(&names.regular_user)
                .secret_arg(&names.regular_password);
            runner.run(&create_user, short_timeout).await?;

            let definition = QuotaDefinition::fixture(&names.quota_definition);
            let guid = client::create_quota_definition(api, scope, &definition).await?;
            info!(quota = %names.quota_definition, quota_guid = %guid, "Created quota definition");
            *guid_slot = Some(guid);

            info!(org = %names.organization, "Creating organization");
            let create_org = scope
                .invocation()
                .arg("create-org")
                .arg(&names.organization);
            runner.run(&create_org, long_timeout).await?;

            let set_quota = scope
                .invocation()
                .arg("set-quota")
                .arg(&names.organization)
                .arg(&names.quota_definition);
            runner.run(&set_quota, long_timeout).await?;

            Ok(())
        })
        .await
    }

    /// Delete the regular user and, unless persistent, the org and quota.
    ///
    /// Every step is attempted even if an earlier one fails; the failures
    /// are returned together. If the admin login itself fails no step runs,
    /// and the context keeps its phase so teardown can be retried.
    pub async fn teardown(&mut self) -> Result<(), FixtureError> {
        if matches!(self.phase, Phase::Uninitialized | Phase::TornDown) {
            return Err(FixtureError::InvalidPhase {
                operation: "tear down",
                phase: self.phase,
            });
        }

        let mut attempted = false;
        let result = self.run_teardown(&mut attempted).await;
        if attempted {
            self.phase = Phase::TornDown;
        } else if let Err(err) = &result {
            warn!(org = %self.names.organization, error = %err, "Teardown could not log in");
        }
        result
    }

    async fn run_teardown(&mut self, attempted: &mut bool) -> Result<(), FixtureError> {
        let admin = self.admin_user_context();
        let session_timeout = self.scaled_timeout(SESSION_TIMEOUT);
        let long_timeout = self.scaled_timeout(LONG_TIMEOUT);

        let names = &self.names;
        let runner = self.runner.as_ref();
        let api = self.api.as_ref();
        let guid = self.quota_definition_guid.as_deref();
        let is_persistent = self.is_persistent;

        with_identity(runner, admin, session_timeout, async |scope| {
            *attempted = true;
            let mut failures: Vec<FixtureError> = Vec::new();

            info!(user = %names.regular_user, "Deleting regular user");
            let delete_user = scope
                .invocation()
                .arg("delete-user")
                .arg("-f")
                .arg(&names.regular_user);
            if let Err(err) = runner.run(&delete_user, long_timeout).await {
                warn!(user = %names.regular_user, error = %err, "Failed to delete regular user");
                failures.push(err.into());
            }

            if is_persistent {
                info!(org = %names.organization, "Persistent context, keeping org and quota");
            } else {
                info!(org = %names.organization, "Deleting organization");
                let delete_org = scope
                    .invocation()
                    .arg("delete-org")
                    .arg("-f")
                    .arg(&names.organization);
                if let Err(err) = runner.run(&delete_org, long_timeout).await {
                    warn!(org = %names.organization, error = %err, "Failed to delete organization");
                    failures.push(err.into());
                }

                match guid {
                    Some(guid) => {
                        info!(quota_guid = %guid, "Deleting quota definition");
                        if let Err(err) = client::delete_quota_definition(api, scope, guid).await {
                            warn!(quota_guid = %guid, error = %err, "Failed to delete quota definition");
                            failures.push(err);
                        }
                    }
                    None => warn!(
                        quota = %names.quota_definition,
                        "No quota definition guid recorded, skipping quota deletion"
                    ),
                }
            }

            if failures.is_empty() {
                Ok(())
            } else {
                Err(FixtureError::Teardown(failures))
            }
        })
        .await
    }
}

#[async_trait(?Send)]
impl SuiteContext for ConfiguredContext {
    async fn setup(&mut self) -> Result<(), FixtureError> {
        ConfiguredContext::setup(self).await
    }

    async fn teardown(&mut self) -> Result<(), FixtureError> {
        ConfiguredContext::teardown(self).await
    }

    fn admin_user_context(&self) -> UserContext {
        ConfiguredContext::admin_user_context(self)
    }

    fn regular_user_context(&self) -> UserContext {
        ConfiguredContext::regular_user_context(self)
    }

    fn scaled_timeout(&self, timeout: Duration) -> Duration {
        ConfiguredContext::scaled_timeout(self, timeout)
    }
}

impl std::fmt::Debug for ConfiguredContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredContext")
            .field("organization", &self.names.organization)
            .field("quota_definition", &self.names.quota_definition)
            .field("quota_definition_guid", &self.quota_definition_guid)
            .field("regular_user", &self.names.regular_user)
            .field("is_persistent", &self.is_persistent)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
