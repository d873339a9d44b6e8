use swtk_deadline::WaitError;
use thiserror::Error;

use crate::control::ControlError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Error calling get_active(): there is no active worker yet. Try using wait_for_activated()")]
    NoActiveWorker,
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error("service worker reported {count} error(s); first: {message}")]
    WorkerErrors { message: String, count: usize },
    #[error("worker control: {0}")]
    Control(#[from] ControlError),
}
