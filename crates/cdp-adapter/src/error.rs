use serde::{Deserialize, Serialize};
use std::fmt;
use sw_lifecycle::LifecycleError;
use swtk_deadline::WaitError;
use thiserror::Error;

/// High-level error categories surfaced by the adapter.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("protocol error")]
    Protocol,
    #[error("javascript exception")]
    JsException,
    #[error("service worker errors")]
    WorkerErrors,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
            data: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Malformed protocol payload for `method`.
    pub fn protocol(method: &str, err: impl fmt::Display) -> Self {
        Self::new(AdapterErrorKind::Protocol).with_hint(format!("{method}: {err}"))
    }
}

impl From<WaitError> for AdapterError {
    fn from(err: WaitError) -> Self {
        AdapterError::new(AdapterErrorKind::NavTimeout).with_hint(err.to_string())
    }
}

impl From<LifecycleError> for AdapterError {
    fn from(err: LifecycleError) -> Self {
        let kind = match &err {
            LifecycleError::Wait(_) => AdapterErrorKind::NavTimeout,
            LifecycleError::WorkerErrors { .. } => AdapterErrorKind::WorkerErrors,
            LifecycleError::Control(_) => AdapterErrorKind::CdpIo,
            LifecycleError::NoActiveWorker => AdapterErrorKind::Internal,
        };
        AdapterError::new(kind).with_hint(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn display_includes_hint() {
        let err = AdapterError::new(AdapterErrorKind::CdpIo).with_hint("socket closed");
        assert_eq!(err.to_string(), "cdp i/o failure: socket closed");
    }

    #[test]
    fn wait_timeouts_map_to_nav_timeout() {
        let err: AdapterError = WaitError::Timeout {
            what: "response timeout for frame F1".into(),
            after: Duration::from_secs(10),
        }
        .into();
        assert_eq!(err.kind, AdapterErrorKind::NavTimeout);
        assert!(err.to_string().contains("response timeout for frame F1"));
    }

    #[test]
    fn worker_errors_keep_their_kind() {
        let err: AdapterError = LifecycleError::WorkerErrors {
            message: "boom".into(),
            count: 2,
        }
        .into();
        assert_eq!(err.kind, AdapterErrorKind::WorkerErrors);
        assert!(err.to_string().contains("boom"));
    }
}
