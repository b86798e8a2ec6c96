//! Quota definition payloads.

use serde::{Deserialize, Serialize};

/// Services allowed under a fixture quota.
pub const FIXTURE_TOTAL_SERVICES: u32 = 100;

/// Routes allowed under a fixture quota.
pub const FIXTURE_TOTAL_ROUTES: u32 = 1000;

/// Memory limit of a fixture quota, in megabytes (10 GB).
pub const FIXTURE_MEMORY_LIMIT_MB: u32 = 10240;

/// Request body for `POST /v2/quota_definitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDefinition {
    pub name: String,

    pub non_basic_services_allowed: bool,

    pub total_services: u32,

    pub total_routes: u32,

    /// Megabytes.
    pub memory_limit: u32,
}

impl QuotaDefinition {
    /// The fixed limits every fixture org runs under.
    pub fn fixture(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            non_basic_services_allowed: true,
            total_services: FIXTURE_TOTAL_SERVICES,
            total_routes: FIXTURE_TOTAL_ROUTES,
            memory_limit: FIXTURE_MEMORY_LIMIT_MB,
        }
    }
}

/// Resource envelope returned by v2 endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericResource {
    #[serde(default)]
    pub metadata: ResourceMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub guid: String,

    #[serde(default)]
    pub url: Option<String>,
}
