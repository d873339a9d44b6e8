//! Chromium DevTools Protocol integration for the swtk harness.
//!
//! The [`transport`] moves raw commands and notifications over one websocket. A
//! [`BrowserEnvironment`] owns the tabs of one browser and routes every notification, by
//! session, to the [`PageClient`] of the tab it belongs to. Each client feeds its own
//! navigation correlator ([`frame_nav::FrameStore`]) and service worker tracker
//! ([`sw_lifecycle::WorkerTracker`]).

pub mod client;
pub mod config;
pub mod control;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod transport;
pub mod util;

pub use client::{NavigateResult, PageClient};
pub use config::{detect_chrome_executable, CdpConfig, ClientConfig};
pub use control::SessionControl;
pub use environment::{BrowserEnvironment, TabInfo};
pub use error::{AdapterError, AdapterErrorKind};
pub use protocol::ProtocolEvent;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent};
