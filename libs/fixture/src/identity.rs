//! Scoped identity acquisition.
//!
//! An [`IdentityScope`] is a logged-in CLI session for one [`UserContext`].
//! Each scope owns a private CLI home directory, so acquiring a scope never
//! touches the caller's CLI session or any other scope. Releasing the scope
//! (or dropping it) removes the directory and with it the credentials.
//!
//! [`with_identity`] runs a block under a scope and always releases it
//! afterwards, whether the block succeeded or not.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::FixtureError;
use crate::runner::{CommandRunner, Invocation};
use crate::user::UserContext;

/// A logged-in CLI session and the bearer token issued to it.
pub struct IdentityScope {
    user: UserContext,
    home: TempDir,
    authorization: String,
}

impl IdentityScope {
    /// Log in as `user` in a fresh CLI home.
    ///
    /// Runs `api`, `auth`, `target` (when the user is scoped to an org) and
    /// `oauth-token`, each bounded by `timeout`. On failure the home
    /// directory is removed before returning.
    pub async fn acquire(
        runner: &dyn CommandRunner,
        user: UserContext,
        timeout: Duration,
    ) -> Result<Self, FixtureError> {
        let home = tempfile::Builder::new()
            .prefix("cf-home-")
            .tempdir()
            .map_err(|source| FixtureError::Home {
                action: "create",
                source,
            })?;
        let mut scope = Self {
            user,
            home,
            authorization: String::new(),
        };
        let user = &scope.user;

        debug!(
            user = %user.username,
            endpoint = %user.api_endpoint,
            home = %scope.home.path().display(),
            "Acquiring identity"
        );

        let mut api = scope.invocation().arg("api").arg(&user.api_endpoint);
        if user.skip_ssl_validation {
            api = api.arg("--skip-ssl-validation");
        }
        runner.run(&api, timeout).await?;

        let auth = scope
            .invocation()
            .arg("auth")
            .arg(&user.username)
            .secret_arg(&user.password);
        runner.run(&auth, timeout).await?;

        if let Some(org) = &user.org {
            let mut target = scope.invocation().arg("target").arg("-o").arg(org);
            if let Some(space) = &user.space {
                target = target.arg("-s").arg(space);
            }
            runner.run(&target, timeout).await?;
        }

        let token = runner
            .run(&scope.invocation().arg("oauth-token"), timeout)
            .await?;
        let authorization =
            parse_token(&token.stdout).ok_or_else(|| FixtureError::MissingToken {
                username: user.username.clone(),
            })?;

        info!(user = %scope.user.username, "Identity acquired");
        scope.authorization = authorization;
        Ok(scope)
    }

    /// Log out and remove the CLI home.
    ///
    /// The home is removed even when `logout` fails.
    pub async fn release(
        self,
        runner: &dyn CommandRunner,
        timeout: Duration,
    ) -> Result<(), FixtureError> {
        let logout = runner.run(&self.invocation().arg("logout"), timeout).await;
        let username = self.user.username.clone();
        let removed = self.home.close();

        logout?;
        removed.map_err(|source| FixtureError::Home {
            action: "remove",
            source,
        })?;
        debug!(user = %username, "Identity released");
        Ok(())
    }

    /// Start a CLI invocation that runs under this identity.
    pub fn invocation(&self) -> Invocation {
        Invocation::new(self.home.path(), &self.user.username)
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// Value for the `Authorization` header of REST calls, e.g. `bearer eyJ...`.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    /// The private CLI home backing this session.
    pub fn home(&self) -> &Path {
        self.home.path()
    }
}

impl std::fmt::Debug for IdentityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityScope")
            .field("user", &self.user)
            .field("home", &self.home.path())
            .finish_non_exhaustive()
    }
}

/// Extract the bearer token from `oauth-token` output.
///
/// Older CLIs print progress lines before the token, so the last non-empty
/// line is used.
fn parse_token(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let token = match line.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => line,
    };

    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("bearer {token}"))
}

/// Run `f` as `user`, releasing the identity afterwards.
///
/// `f`'s error takes precedence over a release failure, which is only
/// logged in that case.
pub async fn with_identity<T>(
    runner: &dyn CommandRunner,
    user: UserContext,
    timeout: Duration,
    f: impl AsyncFnOnce(&IdentityScope) -> Result<T, FixtureError>,
) -> Result<T, FixtureError> {
    let scope = IdentityScope::acquire(runner, user, timeout).await?;
    let result = f(&scope).await;
    let released = scope.release(runner, timeout).await;

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(error = %release_err, "Failed to release identity after error");
            Err(err)
        }
    }
}
