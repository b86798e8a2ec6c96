//! Identity snapshots used to scope commands and requests.

/// Endpoint, credentials and optional org/space target for one identity.
#[derive(Clone, PartialEq, Eq)]
pub struct UserContext {
    pub api_endpoint: String,
    pub username: String,
    pub password: String,
    pub org: Option<String>,
    pub space: Option<String>,
    pub skip_ssl_validation: bool,
}

impl UserContext {
    /// An unscoped identity (no org or space target).
    pub fn new(
        api_endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        skip_ssl_validation: bool,
    ) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            username: username.into(),
            password: password.into(),
            org: None,
            space: None,
            skip_ssl_validation,
        }
    }

    /// Scope this identity to an org and space.
    #[must_use]
    pub fn targeting(mut self, org: impl Into<String>, space: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self.space = Some(space.into());
        self
    }
}

// Passwords stay out of logs and assertion output.
impl std::fmt::Debug for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserContext")
            .field("api_endpoint", &self.api_endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("org", &self.org)
            .field("space", &self.space)
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .finish()
    }
}
