//! swtk: drive Chromium over the DevTools protocol and await service worker
//! lifecycle transitions and page navigations deterministically.
//!
//! The heavy lifting lives in the workspace crates; this crate wires them into
//! a configurable [`TestSession`] and the `swtk` binary.

pub mod config;
pub mod logging;
pub mod probe;
pub mod session;

pub use cdp_adapter::{AdapterError, AdapterErrorKind, NavigateResult, PageClient};
pub use config::HarnessConfig;
pub use logging::init_logging;
pub use probe::{run_probe, ProbeReport};
pub use session::TestSession;
pub use sw_lifecycle::{VersionSnapshot, WorkerErrorReport};
