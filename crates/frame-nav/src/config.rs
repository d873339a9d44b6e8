//! Configuration for the navigation correlator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub response_timeout_ms: u64,
    /// Drop `responseReceived` notifications whose request id looks like `"123.4"`.
    pub filter_fractional_request_ids: bool,
}

impl NavConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            filter_fractional_request_ids: true,
        }
    }
}
