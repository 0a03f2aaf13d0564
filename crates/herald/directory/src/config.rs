//! Directory cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`CachingSubscriberRepository`](crate::CachingSubscriberRepository).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// How long a snapshot is served before it is refreshed.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Delay before retrying after a failed refresh.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_failure_backoff_ms() -> u64 {
    5_000
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

impl DirectoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
