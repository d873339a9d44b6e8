//! Service worker lifecycle tracking.
//!
//! [`WorkerTracker`] consumes `ServiceWorker.workerVersionUpdated` batches,
//! `workerRegistrationUpdated` and `workerErrorReported` notifications. It keeps the full
//! observed version history, answers point-in-time queries (`get_active`,
//! `get_last_installed`) and future-state waits (`wait_for_installed`, `wait_for_activated`),
//! and gates assertions on queued worker errors via `ensure_no_errors`.

pub mod audit;
pub mod config;
pub mod control;
pub mod error;
mod identity;
mod snapshot;
mod tracker;

pub use audit::{TransitionAnomaly, TransitionAudit};
pub use config::LifecycleConfig;
pub use control::{ControlError, DetachedControl, WorkerControl, WorkerSession};
pub use error::LifecycleError;
pub use identity::VersionIdentity;
pub use snapshot::{RegistrationSnapshot, VersionSnapshot, WorkerErrorReport};
pub use tracker::{ErrorCallback, VersionWait, WorkerTracker};
