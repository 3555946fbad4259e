//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Smallest pool the bridge will run with.
pub const MIN_WORKERS: usize = 1;
/// Pool size used when none is configured.
pub const DEFAULT_WORKERS: usize = 8;
/// How long shutdown waits for in-flight tasks, in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Tuning knobs for the execution bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Number of worker threads; the upper bound on concurrent remote calls.
    pub workers: usize,
    /// How long shutdown waits for in-flight tasks before detaching workers.
    pub drain_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl BridgeConfig {
    /// Returns a config with the given pool size.
    pub fn with_workers(workers: usize) -> ApiResult<Self> {
        if workers < MIN_WORKERS {
            return Err(ApiError::validation("worker pool size must be at least 1"));
        }
        Ok(Self {
            workers,
            ..Self::default()
        })
    }

    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
