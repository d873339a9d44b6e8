use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub wait_timeout_ms: u64,
    /// Scope handed to `ServiceWorker.skipWaiting` when no registration scope is known.
    pub default_scope_url: String,
    /// Log every recorded version snapshot at `info` instead of `debug`.
    pub log_versions: bool,
}

impl LifecycleConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 10_000,
            default_scope_url: "/".to_string(),
            log_versions: false,
        }
    }
}
