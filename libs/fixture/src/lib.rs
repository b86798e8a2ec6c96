//! # tenant-fixture
//!
//! Ephemeral tenant scaffolding for platform integration suites.
//!
//! A [`ConfiguredContext`] owns one organization, one quota definition and
//! one regular user, all named uniquely for the suite run:
//!
//! ```text
//! {prefix}-ORG-{shard}-{timestamp}
//! {prefix}-SPACE-{shard}-{timestamp}
//! {prefix}-QUOTA-{shard}-{timestamp}
//! {prefix}-USER-{shard}-{timestamp}
//! ```
//!
//! Setup and teardown run as the admin identity from the
//! [`IntegrationConfig`]. Tests run as the regular user via
//! [`with_identity`] and [`ConfiguredContext::regular_user_context`].
//!
//! ## Collaborators
//!
//! - [`CommandRunner`]: runs the administrative CLI ([`CfCli`] in production)
//! - [`ApiClient`]: issues REST calls ([`HttpApiClient`] in production)
//!
//! Both are traits so suites and tests can substitute their own.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod names;
pub mod quota;
pub mod runner;
pub mod user;

pub use client::{ApiClient, HttpApiClient};
pub use config::IntegrationConfig;
pub use context::{ConfiguredContext, Phase, SuiteContext};
pub use error::{ApiError, CommandError, ConfigError, FixtureError};
pub use identity::{with_identity, IdentityScope};
pub use names::{ContextNames, ShardIndex};
pub use quota::QuotaDefinition;
pub use runner::{CfCli, CommandOutput, CommandRunner, Invocation};
pub use user::UserContext;

use std::sync::Arc;

/// Build a context wired to the real CLI and REST API.
pub fn context_from_config(
    config: IntegrationConfig,
    prefix: &str,
    shard: ShardIndex,
) -> Result<ConfiguredContext, FixtureError> {
    config.validate()?;
    let runner = Arc::new(CfCli::new(&config.cf_binary));
    let api = Arc::new(HttpApiClient::new(&config)?);
    Ok(ConfiguredContext::new(config, prefix, shard, runner, api))
}
