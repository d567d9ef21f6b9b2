//! Provider configuration
//!
//! Read from the `provider` block of a manifest; every field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use slsform_core::wait::Backoff;

pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// Per-operation timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: 300,
            update: 300,
            delete: 300,
        }
    }
}

/// Linear retry backoff, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial: u64,
    pub increment: u64,
    pub cap: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: 1,
            increment: 1,
            cap: 5,
        }
    }
}

/// Configuration of [`crate::SlsProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlsConfig {
    pub region: String,
    /// Service endpoint; derived from the region when absent
    pub endpoint: Option<String>,
    pub timeouts: Timeouts,
    /// Seconds between two state checks
    pub poll_interval: u64,
    /// Seconds to wait before the first state check
    pub poll_delay: u64,
    pub backoff: BackoffConfig,
}

impl Default for SlsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            timeouts: Timeouts::default(),
            poll_interval: 5,
            poll_delay: 1,
            backoff: BackoffConfig::default(),
        }
    }
}

impl SlsConfig {
    /// Endpoint to reach, e.g. "cn-hangzhou.log.aliyuncs.com"
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("{}.log.aliyuncs.com", self.region))
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.create)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.update)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.delete)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.backoff.initial),
            Duration::from_secs(self.backoff.increment),
            Duration::from_secs(self.backoff.cap),
        )
    }

    /// Use the same timeout for create, update and delete
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeouts = Timeouts {
            create: secs,
            update: secs,
            delete: secs,
        };
        self
    }
}
