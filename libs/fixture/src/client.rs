//! HTTP client for the control-plane REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::IntegrationConfig;
use crate::error::{ApiError, FixtureError};
use crate::identity::IdentityScope;
use crate::quota::{GenericResource, QuotaDefinition};

/// Base path for quota definition resources.
pub const QUOTA_DEFINITIONS_PATH: &str = "/v2/quota_definitions";

/// Per-request timeout before scaling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues authenticated requests against the control plane.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Send `body` (if any) to `path` as the identity held by `scope` and
    /// return the decoded JSON response. An empty success body is `Null`.
    async fn request(
        &self,
        scope: &IdentityScope,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError>;
}

/// [`ApiClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: &IntegrationConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.skip_ssl_validation)
            .timeout(config.scaled(REQUEST_TIMEOUT))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn request(
        &self,
        scope: &IdentityScope,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        debug!(%method, path, user = %scope.user().username, "Sending API request");

        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .header(AUTHORIZATION, scope.authorization());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(%method, path, status = %status, body = %text, "API request failed");
            return Err(ApiError::status(
                method.as_str(),
                path,
                status.as_u16(),
                text,
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

/// Create a quota definition and return its guid.
pub async fn create_quota_definition(
    api: &dyn ApiClient,
    scope: &IdentityScope,
    definition: &QuotaDefinition,
) -> Result<String, FixtureError> {
    let payload = serde_json::to_value(definition)?;
    let response = api
        .request(scope, Method::POST, QUOTA_DEFINITIONS_PATH, Some(&payload))
        .await?;

    let resource: GenericResource =
        serde_json::from_value(response).map_err(|e| ApiError::Decode {
            path: QUOTA_DEFINITIONS_PATH.to_string(),
            message: e.to_string(),
        })?;

    if resource.metadata.guid.is_empty() {
        return Err(FixtureError::MissingGuid {
            name: definition.name.clone(),
        });
    }

    Ok(resource.metadata.guid)
}

/// Delete a quota definition, detaching it from any orgs that use it.
pub async fn delete_quota_definition(
    api: &dyn ApiClient,
    scope: &IdentityScope,
    guid: &str,
) -> Result<(), FixtureError> {
    let path = format!("{QUOTA_DEFINITIONS_PATH}/{guid}?recursive=true");
    api.request(scope, Method::DELETE, &path, None).await?;
    Ok(())
}
