//! Setup and teardown scenarios against recording collaborators.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p tenant-fixture --test lifecycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::Method;
use serde_json::json;
use tenant_fixture::{
    with_identity, ApiError, ConfiguredContext, ContextNames, FixtureError, IntegrationConfig,
    Phase, ShardIndex, SuiteContext,
};
use tenant_fixture_testing::{
    mocks, Call, CommandFailure, Journal, MockApiClient, MockCommandRunner, DEFAULT_QUOTA_GUID,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenant_fixture=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn config() -> IntegrationConfig {
    IntegrationConfig::new("api.example.com", "admin", "admin-password")
}

fn smoke_names() -> ContextNames {
    let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    ContextNames::generate("SMOKE", ShardIndex::new(1), at)
}

fn context_with(
    config: IntegrationConfig,
    runner: MockCommandRunner,
    api: MockApiClient,
) -> ConfiguredContext {
    init_tracing();
    ConfiguredContext::with_names(config, smoke_names(), Arc::new(runner), Arc::new(api))
}

fn smoke_context() -> (Journal, ConfiguredContext) {
    let (journal, runner, api) = mocks();
    (journal, context_with(config(), runner, api))
}

fn command_args(journal: &Journal, subcommand: &str) -> Vec<String> {
    journal
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Command { args, .. } if args.first().is_some_and(|a| a == subcommand) => {
                Some(args)
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no {subcommand} command recorded"))
}

fn command_timeout(journal: &Journal, subcommand: &str) -> Duration {
    journal
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Command { args, timeout, .. } if args.first().is_some_and(|a| a == subcommand) => {
                Some(timeout)
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no {subcommand} command recorded"))
}

// =============================================================================
// Setup
// =============================================================================

#[tokio::test]
async fn test_setup_issues_steps_in_order_as_admin() {
    let (journal, mut ctx) = smoke_context();
    let names = ctx.names().clone();

    ctx.setup().await.unwrap();

    assert_eq!(
        journal.step_labels(),
        [
            "create-user",
            "POST /v2/quota_definitions",
            "create-org",
            "set-quota",
        ]
    );
    assert!(journal.calls().iter().all(|call| call.user() == "admin"));

    assert_eq!(
        command_args(&journal, "create-user"),
        ["create-user", names.regular_user.as_str(), names.regular_password.as_str()]
    );
    assert_eq!(
        command_args(&journal, "create-org"),
        ["create-org", names.organization.as_str()]
    );
    assert_eq!(
        command_args(&journal, "set-quota"),
        ["set-quota", names.organization.as_str(), names.quota_definition.as_str()]
    );

    let post = journal
        .step_calls()
        .into_iter()
        .find(|call| matches!(call, Call::Request { .. }))
        .unwrap();
    let Call::Request { body, .. } = post else {
        unreachable!()
    };
    assert_eq!(
        body,
        Some(json!({
            "name": names.quota_definition,
            "non_basic_services_allowed": true,
            "total_services": 100,
            "total_routes": 1000,
            "memory_limit": 10240,
        }))
    );

    assert_eq!(ctx.phase(), Phase::SetUp);
    assert_eq!(ctx.quota_definition_guid(), Some(DEFAULT_QUOTA_GUID));
}

#[tokio::test]
async fn test_setup_logs_in_and_out_around_steps() {
    let (journal, mut ctx) = smoke_context();

    ctx.setup().await.unwrap();

    let labels: Vec<String> = journal.calls().iter().map(Call::label).collect();
    assert_eq!(&labels[..3], ["api", "auth", "oauth-token"]);
    assert_eq!(labels.last().map(String::as_str), Some("logout"));
    assert_eq!(command_args(&journal, "api"), ["api", "api.example.com"]);
    assert_eq!(command_args(&journal, "auth")[1], "admin");
    // The admin identity is not scoped to an org.
    assert_eq!(journal.count_command("target"), 0);
}

#[tokio::test]
async fn test_setup_passes_skip_ssl_validation() {
    let (journal, runner, api) = mocks();
    let mut config = config();
    config.skip_ssl_validation = true;
    let mut ctx = context_with(config, runner, api);

    ctx.setup().await.unwrap();

    assert_eq!(
        command_args(&journal, "api"),
        ["api", "api.example.com", "--skip-ssl-validation"]
    );
}

#[tokio::test]
async fn test_setup_uses_scaled_timeouts() {
    let (journal, runner, api) = mocks();
    let mut config = config();
    config.timeout_scale = 2.0;
    let mut ctx = context_with(config, runner, api);

    ctx.setup().await.unwrap();

    assert_eq!(command_timeout(&journal, "auth"), Duration::from_secs(60));
    assert_eq!(command_timeout(&journal, "create-user"), Duration::from_secs(20));
    assert_eq!(command_timeout(&journal, "create-org"), Duration::from_secs(120));
    assert_eq!(command_timeout(&journal, "set-quota"), Duration::from_secs(120));
}

#[tokio::test]
async fn test_failed_quota_post_stops_setup() {
    let (journal, runner, api) = mocks();
    let api = api.failing(Method::POST, "/v2/quota_definitions", 500);
    let mut ctx = context_with(config(), runner, api);

    let err = ctx.setup().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::Api(ApiError::Status { status: 500, .. })
    ));
    assert_eq!(
        journal.step_labels(),
        ["create-user", "POST /v2/quota_definitions"]
    );
    assert_eq!(journal.count_command("create-org"), 0);
    assert_eq!(journal.count_command("set-quota"), 0);
    // The admin session is still released.
    assert_eq!(journal.count_command("logout"), 1);
    assert_eq!(ctx.phase(), Phase::SetupFailed);
    assert_eq!(ctx.quota_definition_guid(), None);
}

#[tokio::test]
async fn test_quota_without_guid_stops_setup() {
    let (journal, runner, api) = mocks();
    let api = api.responding(
        Method::POST,
        "/v2/quota_definitions",
        json!({ "metadata": {} }),
    );
    let mut ctx = context_with(config(), runner, api);

    let err = ctx.setup().await.unwrap_err();

    assert!(matches!(err, FixtureError::MissingGuid { .. }));
    assert_eq!(journal.count_command("create-org"), 0);
}

#[tokio::test]
async fn test_create_user_timeout_aborts_setup() {
    let (journal, runner, api) = mocks();
    let runner = runner.failing("create-user", CommandFailure::Timeout);
    let mut ctx = context_with(config(), runner, api);

    let err = ctx.setup().await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(journal.step_labels(), ["create-user"]);
    assert_eq!(ctx.phase(), Phase::SetupFailed);
}

#[tokio::test]
async fn test_failed_login_issues_no_steps() {
    let (journal, runner, api) = mocks();
    let runner = runner.failing("auth", CommandFailure::Exit(1));
    let mut ctx = context_with(config(), runner, api);

    let err = ctx.setup().await.unwrap_err();

    assert!(matches!(err, FixtureError::Command(_)));
    assert!(journal.step_calls().is_empty());
    assert_eq!(ctx.phase(), Phase::SetupFailed);
}

#[tokio::test]
async fn test_setup_twice_is_rejected() {
    let (journal, mut ctx) = smoke_context();
    ctx.setup().await.unwrap();
    journal.clear();

    let err = ctx.setup().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::InvalidPhase {
            phase: Phase::SetUp,
            ..
        }
    ));
    assert!(journal.calls().is_empty());
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_persistent_teardown_only_deletes_user() {
    let (journal, runner, api) = mocks();
    let mut ctx = context_with(config(), runner, api).persistent(true);
    let user = ctx.names().regular_user.clone();
    ctx.setup().await.unwrap();
    journal.clear();

    ctx.teardown().await.unwrap();

    assert_eq!(journal.step_labels(), ["delete-user"]);
    assert_eq!(command_args(&journal, "delete-user"), ["delete-user", "-f", user.as_str()]);
    assert_eq!(journal.count_command("delete-org"), 0);
    assert_eq!(ctx.phase(), Phase::TornDown);
}

#[tokio::test]
async fn test_teardown_deletes_user_org_and_quota() {
    let (journal, runner, api) = mocks();
    let api = api.with_quota_guid("quota-guid-42");
    let mut ctx = context_with(config(), runner, api);
    let names = ctx.names().clone();
    ctx.setup().await.unwrap();
    journal.clear();

    ctx.teardown().await.unwrap();

    assert_eq!(
        journal.step_labels(),
        [
            "delete-user",
            "delete-org",
            "DELETE /v2/quota_definitions/quota-guid-42?recursive=true",
        ]
    );
    assert_eq!(
        command_args(&journal, "delete-org"),
        ["delete-org", "-f", names.organization.as_str()]
    );
    assert_eq!(
        command_timeout(&journal, "delete-user"),
        Duration::from_secs(60)
    );
    assert!(journal.calls().iter().all(|call| call.user() == "admin"));
    assert!(journal.calls().iter().all(|call| match call {
        Call::Request { body, .. } => body.is_none(),
        Call::Command { .. } => true,
    }));
}

#[tokio::test]
async fn test_teardown_attempts_every_step() {
    let (journal, runner, api) = mocks();
    let runner = runner.failing("delete-org", CommandFailure::Exit(1));
    let mut ctx = context_with(config(), runner, api);
    ctx.setup().await.unwrap();
    journal.clear();

    let err = ctx.teardown().await.unwrap_err();

    let FixtureError::Teardown(failures) = err else {
        panic!("expected teardown error, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], FixtureError::Command(_)));
    assert_eq!(
        journal.step_labels(),
        [
            "delete-user",
            "delete-org",
            "DELETE /v2/quota_definitions/2f1c8b5e-6d0a-4c7e-9a3b-quota?recursive=true",
        ]
    );
    assert_eq!(ctx.phase(), Phase::TornDown);
}

#[tokio::test]
async fn test_teardown_reports_quota_delete_failure() {
    let (journal, runner, api) = mocks();
    let api = api.failing(Method::DELETE, "/v2/quota_definitions/", 404);
    let mut ctx = context_with(config(), runner, api);
    ctx.setup().await.unwrap();
    journal.clear();

    let err = ctx.teardown().await.unwrap_err();

    assert!(matches!(
        &err,
        FixtureError::Teardown(failures)
            if matches!(failures.as_slice(), [FixtureError::Api(ApiError::Status { status: 404, .. })])
    ));
}

#[tokio::test]
async fn test_teardown_after_failed_setup_skips_unknown_quota() {
    let (journal, runner, api) = mocks();
    let api = api.failing(Method::POST, "/v2/quota_definitions", 422);
    let mut ctx = context_with(config(), runner, api);
    ctx.setup().await.unwrap_err();
    journal.clear();

    ctx.teardown().await.unwrap();

    assert_eq!(journal.step_labels(), ["delete-user", "delete-org"]);
}

#[tokio::test]
async fn test_teardown_after_org_failure_uses_recorded_guid() {
    let (journal, runner, api) = mocks();
    let runner = runner.failing("create-org", CommandFailure::Exit(1));
    let mut ctx = context_with(config(), runner, api);
    ctx.setup().await.unwrap_err();
    assert_eq!(ctx.quota_definition_guid(), Some(DEFAULT_QUOTA_GUID));
    journal.clear();

    ctx.teardown().await.unwrap();

    assert_eq!(
        journal.step_labels().last().map(String::as_str),
        Some("DELETE /v2/quota_definitions/2f1c8b5e-6d0a-4c7e-9a3b-quota?recursive=true")
    );
}

#[tokio::test]
async fn test_teardown_requires_setup() {
    let (journal, mut ctx) = smoke_context();

    let err = ctx.teardown().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::InvalidPhase {
            phase: Phase::Uninitialized,
            ..
        }
    ));
    assert!(journal.calls().is_empty());
}

#[tokio::test]
async fn test_teardown_twice_is_rejected() {
    let (_journal, mut ctx) = smoke_context();
    ctx.setup().await.unwrap();
    ctx.teardown().await.unwrap();

    let err = ctx.teardown().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::InvalidPhase {
            phase: Phase::TornDown,
            ..
        }
    ));
}

#[tokio::test]
async fn test_teardown_login_failure_allows_retry() {
    init_tracing();
    let journal = Journal::new();
    let runner = Arc::new(MockCommandRunner::new(journal.clone()));
    let api = MockApiClient::new(journal.clone());
    let mut ctx =
        ConfiguredContext::with_names(config(), smoke_names(), runner.clone(), Arc::new(api));
    ctx.setup().await.unwrap();
    journal.clear();

    runner.fail("auth", CommandFailure::Exit(1));
    let err = ctx.teardown().await.unwrap_err();

    assert!(matches!(err, FixtureError::Command(_)));
    assert_eq!(ctx.phase(), Phase::SetUp);
    assert!(journal.step_calls().is_empty());

    runner.recover("auth");
    journal.clear();
    ctx.teardown().await.unwrap();

    assert_eq!(ctx.phase(), Phase::TornDown);
    assert_eq!(
        journal.step_labels(),
        [
            "delete-user".to_string(),
            "delete-org".to_string(),
            format!("DELETE /v2/quota_definitions/{DEFAULT_QUOTA_GUID}?recursive=true"),
        ]
    );
}

// =============================================================================
// Identities
// =============================================================================

#[tokio::test]
async fn test_user_contexts() {
    let (_journal, ctx) = smoke_context();
    let names = ctx.names();

    let admin = ctx.admin_user_context();
    assert_eq!(admin.username, "admin");
    assert_eq!(admin.password, "admin-password");
    assert_eq!(admin.org, None);
    assert_eq!(admin.space, None);

    let regular = ctx.regular_user_context();
    assert_eq!(regular.api_endpoint, "api.example.com");
    assert_eq!(regular.username, names.regular_user);
    assert_eq!(regular.password, names.regular_password);
    assert_eq!(regular.org.as_deref(), Some(names.organization.as_str()));
    assert_eq!(regular.space.as_deref(), Some(names.space.as_str()));
}

#[tokio::test]
async fn test_regular_identity_targets_org_and_space() {
    let (journal, runner, api) = mocks();
    let ctx = context_with(config(), runner, api);
    let names = ctx.names().clone();
    let runner = MockCommandRunner::new(journal.clone());

    let token = with_identity(
        &runner,
        ctx.regular_user_context(),
        Duration::from_secs(30),
        async |scope| Ok(scope.authorization().to_string()),
    )
    .await
    .unwrap();

    assert_eq!(token, format!("bearer mock-token-{}", names.regular_user));
    assert_eq!(
        command_args(&journal, "target"),
        ["target", "-o", names.organization.as_str(), "-s", names.space.as_str()]
    );
    assert!(journal
        .calls()
        .iter()
        .all(|call| call.user() == names.regular_user));
}

#[tokio::test]
async fn test_with_identity_releases_after_error() {
    let journal = Journal::new();
    let runner = MockCommandRunner::new(journal.clone());
    let ctx = smoke_context().1;
    let mut home = None;

    let result: Result<(), FixtureError> = with_identity(
        &runner,
        ctx.admin_user_context(),
        Duration::from_secs(30),
        async |scope| {
            home = Some(scope.home().to_path_buf());
            Err(FixtureError::MissingGuid {
                name: "boom".to_string(),
            })
        },
    )
    .await;

    assert!(matches!(result, Err(FixtureError::MissingGuid { .. })));
    assert_eq!(journal.count_command("logout"), 1);
    assert!(!home.unwrap().exists());
}

#[tokio::test]
async fn test_scopes_use_separate_homes() {
    let journal = Journal::new();
    let runner = MockCommandRunner::new(journal.clone());
    let ctx = smoke_context().1;

    let first = with_identity(
        &runner,
        ctx.admin_user_context(),
        Duration::from_secs(30),
        async |scope| Ok(scope.home().to_path_buf()),
    )
    .await
    .unwrap();
    let second = with_identity(
        &runner,
        ctx.admin_user_context(),
        Duration::from_secs(30),
        async |scope| Ok(scope.home().to_path_buf()),
    )
    .await
    .unwrap();

    assert_ne!(first, second);
}

// =============================================================================
// Suite contract
// =============================================================================

async fn run_suite(ctx: &mut dyn SuiteContext) -> Duration {
    ctx.setup().await.unwrap();
    let budget = ctx.scaled_timeout(Duration::from_secs(4));
    ctx.teardown().await.unwrap();
    budget
}

#[tokio::test]
async fn test_suite_contract_drives_lifecycle() {
    let (journal, runner, api) = mocks();
    let mut config = config();
    config.timeout_scale = 1.5;
    let mut ctx = context_with(config, runner, api);

    let budget = run_suite(&mut ctx).await;

    assert_eq!(budget, Duration::from_secs(6));
    assert_eq!(journal.count_command("create-user"), 1);
    assert_eq!(journal.count_command("delete-user"), 1);
    assert_eq!(ctx.phase(), Phase::TornDown);
}

#[tokio::test]
async fn test_new_context_names_follow_prefix_and_shard() {
    let (_journal, runner, api) = mocks();
    let ctx = ConfiguredContext::new(
        config(),
        "CATS",
        ShardIndex::new(4),
        Arc::new(runner),
        Arc::new(api),
    );

    assert!(ctx.names().organization.starts_with("CATS-ORG-4-"));
    assert!(ctx.names().space.starts_with("CATS-SPACE-4-"));
    assert!(ctx.names().quota_definition.starts_with("CATS-QUOTA-4-"));
    assert!(ctx.names().regular_user.starts_with("CATS-USER-4-"));
    assert!(!ctx.is_persistent());
    assert_eq!(ctx.phase(), Phase::Uninitialized);
}
