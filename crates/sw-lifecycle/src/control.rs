//! Seam between the tracker and whatever speaks to the browser.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use swtk_core_types::{SessionId, TargetId};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("worker control unavailable")]
    Unavailable,
    #[error("{method} failed: {reason}")]
    Command { method: String, reason: String },
}

/// Secondary protocol session attached to a worker's execution context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSession {
    pub target_id: TargetId,
    pub session_id: SessionId,
}

#[async_trait]
pub trait WorkerControl: Send + Sync {
    /// One-way `ServiceWorker.skipWaiting` for the registration owning `scope_url`.
    async fn skip_waiting(&self, scope_url: &str) -> Result<(), ControlError>;

    /// Attach a session to the worker target and prepare it for observation.
    async fn attach_worker(&self, target: &TargetId) -> Result<WorkerSession, ControlError>;
}

/// Control surface for trackers that are not wired to a browser.
#[derive(Default)]
pub struct DetachedControl;

#[async_trait]
impl WorkerControl for DetachedControl {
    async fn skip_waiting(&self, _scope_url: &str) -> Result<(), ControlError> {
        Err(ControlError::Unavailable)
    }

    async fn attach_worker(&self, _target: &TargetId) -> Result<WorkerSession, ControlError> {
        Err(ControlError::Unavailable)
    }
}
