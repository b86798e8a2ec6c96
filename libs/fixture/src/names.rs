//! Generated resource names for one suite run.
//!
//! Every name has the shape `{prefix}-{KIND}-{shard}-{timestamp}`. Parallel
//! shards differ in the shard component and repeated runs differ in the
//! millisecond timestamp, so no coordination between runs is needed.

use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};

/// Timestamp layout embedded in every name, e.g. `2024_03_09-14h05m07.123s`.
const TIME_TAG_FORMAT: &str = "%Y_%m_%d-%Hh%Mm%S%.3fs";

/// Length of the generated regular-user password.
const PASSWORD_LEN: usize = 16;

/// Index of one parallel worker in the test runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardIndex(u32);

impl ShardIndex {
    /// Shard used when the suite runs serially.
    pub const SERIAL: Self = Self(1);

    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl Default for ShardIndex {
    fn default() -> Self {
        Self::SERIAL
    }
}

impl std::fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ShardIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Names of the org, space, quota and regular user owned by one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextNames {
    pub organization: String,
    pub space: String,
    pub quota_definition: String,
    pub regular_user: String,
    pub regular_password: String,
}

impl ContextNames {
    /// Compose names for `prefix` on `shard` at instant `at`.
    ///
    /// The password is random; everything else is a pure function of the
    /// arguments.
    pub fn generate(prefix: &str, shard: ShardIndex, at: DateTime<Utc>) -> Self {
        let tag = at.format(TIME_TAG_FORMAT).to_string();
        let name = |kind: &str| format!("{prefix}-{kind}-{shard}-{tag}");

        Self {
            organization: name("ORG"),
            space: name("SPACE"),
            quota_definition: name("QUOTA"),
            regular_user: name("USER"),
            regular_password: Alphanumeric.sample_string(&mut rand::rng(), PASSWORD_LEN),
        }
    }

    /// Compose names for `prefix` on `shard` at the current instant.
    pub fn now(prefix: &str, shard: ShardIndex) -> Self {
        Self::generate(prefix, shard, Utc::now())
    }
}
