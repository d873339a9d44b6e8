//! Raw protocol transport: one websocket, command/response correlation and an event stream.
//!
//! A connection is opened once by [`CdpTransport::start`]. When it closes every later command
//! fails with [`AdapterErrorKind::CdpIo`] and the event stream ends; nothing reconnects, since
//! sessions, frames and worker state all belong to the browser that went away.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use swtk_core_types::SessionId;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

/// Notification received from the browser, tagged with the flattened session it belongs to.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

impl TransportEvent {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    pub fn for_session(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Transport for environments without a browser. Every command fails.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("transport not available for method {method}")))
    }
}

/// Transport backed by a launched (or already running) Chromium.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<BrowserLink>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CdpConfig {
        &self.cfg
    }

    async fn open_link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        match self.link.lock().await.as_ref() {
            Some(link) if link.is_open() => Ok(Arc::clone(link)),
            Some(_) => Err(connection_closed()),
            None => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("transport not started")),
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let mut slot = self.link.lock().await;
        match slot.as_ref() {
            Some(link) if link.is_open() => return Ok(()),
            Some(_) => return Err(connection_closed()),
            None => {}
        }

        let link = BrowserLink::open(&self.cfg).await?;
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
        )
        .await?;
        *slot = Some(Arc::new(link));
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let link = self.link.lock().await.clone()?;
        link.next_event().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.open_link().await?.call(target, method, params).await
    }
}

fn connection_closed() -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser connection closed")
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// One live websocket plus the task pumping it.
struct BrowserLink {
    calls: mpsc::Sender<Call>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    open: Arc<AtomicBool>,
    deadline: Duration,
    pump: JoinHandle<()>,
    child: parking_lot::Mutex<Option<Child>>,
}

impl BrowserLink {
    async fn open(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let mut child = launch_config(cfg)?.launch().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint(format!("failed to launch chromium: {err}"))
                })?;
                let url = extract_ws_url(&mut child).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())
                })?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;
        info!(target: "cdp-transport", url = %ws_url, "chromium connection established");

        let (calls_tx, calls_rx) = mpsc::channel(128);
        let (events_tx, events_rx) = mpsc::channel(1024);
        let open = Arc::new(AtomicBool::new(true));
        let pump = Pump {
            conn,
            calls: calls_rx,
            events: events_tx,
            waiting: HashMap::new(),
        };
        let flag = Arc::clone(&open);
        let pump = tokio::spawn(async move {
            match pump.run().await {
                Ok(()) => warn!(target: "cdp-transport", "chromium connection closed"),
                Err(err) => error!(target: "cdp-transport", %err, "chromium connection failed"),
            }
            flag.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            calls: calls_tx,
            events: Mutex::new(events_rx),
            open,
            deadline: Duration::from_millis(cfg.default_deadline_ms),
            pump,
            child: parking_lot::Mutex::new(child),
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        self.calls
            .send(Call {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| connection_closed())?;

        match tokio::time::timeout(self.deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(connection_closed()),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!(
                    "{method}: no response within {} ms",
                    self.deadline.as_millis()
                ))
                .retriable(true)),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    #[cfg(test)]
    fn closed() -> Self {
        let (calls, _) = mpsc::channel(1);
        let (_, events) = mpsc::channel(1);
        Self {
            calls,
            events: Mutex::new(events),
            open: Arc::new(AtomicBool::new(false)),
            deadline: Duration::from_millis(10),
            pump: tokio::spawn(async {}),
            child: parking_lot::Mutex::new(None),
        }
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.pump.abort();
        let Some(mut child) = self.child.lock().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", %err, "failed to kill chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to kill chromium"),
        }
    }
}

fn launch_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let executable = &cfg.executable;
    if !executable.as_os_str().is_empty() && !executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("chrome executable not found at {}", executable.display()))
            .with_data(json!({
                "expected": executable,
                "hint": "Set SWTK_CHROME to the full path of chrome/chromium."
            })));
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20))
        .window_size(cfg.window_width, cfg.window_height)
        .args(cfg.launch_args())
        .user_data_dir(profile_dir(cfg)?);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    if !executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(executable.clone());
    }

    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config error: {err}"))
    })
}

/// Configured profile directory, or a fresh one under the system temp dir.
fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let internal = |hint: String| AdapterError::new(AdapterErrorKind::Internal).with_hint(hint);
    let dir = match &cfg.user_data_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => std::env::current_dir()
            .map_err(|err| internal(format!("cannot resolve user-data-dir: {err}")))?
            .join(dir),
        None => std::env::temp_dir().join(format!("swtk-profile-{}", SessionId::new())),
    };
    fs::create_dir_all(&dir)
        .map_err(|err| internal(format!("cannot create user-data-dir {}: {err}", dir.display())))?;
    Ok(dir)
}

/// Owns the websocket: submits calls, pairs responses with callers, forwards notifications.
struct Pump {
    conn: Connection<CdpEventMessage>,
    calls: mpsc::Receiver<Call>,
    events: mpsc::Sender<TransportEvent>,
    waiting: HashMap<CallId, Reply>,
}

impl Pump {
    async fn run(mut self) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                Some(call) = self.calls.recv() => self.submit(call),
                message = self.conn.next() => match message {
                    Some(Ok(Message::Response(response))) => self.answer(response),
                    Some(Ok(Message::Event(event))) => self.forward(event).await,
                    Some(Err(err)) => {
                        let err = cdp_error(err);
                        self.fail_all(&err);
                        return Err(err);
                    }
                    None => {
                        self.fail_all(&connection_closed());
                        return Ok(());
                    }
                },
            }
        }
    }

    fn submit(&mut self, call: Call) {
        let session = match call.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
        };
        let method: MethodId = call.method.clone().into();
        match self.conn.submit_command(method, session, call.params) {
            Ok(id) => {
                self.waiting.insert(id, call.reply);
            }
            Err(err) => {
                let _ = call.reply.send(Err(AdapterError::protocol(&call.method, err)));
            }
        }
    }

    fn answer(&mut self, response: Response) {
        let Some(reply) = self.waiting.remove(&response.id) else {
            debug!(target: "cdp-transport", id = ?response.id, "response for unknown call");
            return;
        };
        let result = match (response.result, response.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::Protocol)
                .with_hint(format!("cdp error {}: {}", error.code, error.message))),
            (None, None) => {
                Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
            }
        };
        let _ = reply.send(result);
    }

    async fn forward(&mut self, event: CdpEventMessage) {
        let raw: CdpJsonEventMessage = match event.try_into() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "undecodable cdp event");
                return;
            }
        };
        let event = TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        };
        if self.events.send(event).await.is_err() {
            debug!(target: "cdp-transport", "event receiver gone");
        }
    }

    fn fail_all(&mut self, err: &AdapterError) {
        for (_, reply) in self.waiting.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
}

fn cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::JavascriptException(_) => {
            AdapterError::new(AdapterErrorKind::JsException).with_hint(hint)
        }
        CdpError::Serde(_) => AdapterError::new(AdapterErrorKind::Protocol).with_hint(hint),
        _ => AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> CdpConfig {
        CdpConfig {
            executable: PathBuf::from("/nonexistent/chrome"),
            ..CdpConfig::default()
        }
    }

    #[tokio::test]
    async fn commands_before_start_fail_without_launching() {
        let transport = ChromiumTransport::new(offline_config());
        let err = transport
            .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.to_string().contains("not started"));
        assert!(transport.next_event().await.is_none());
    }

    #[tokio::test]
    async fn missing_executable_is_reported_on_start() {
        let transport = ChromiumTransport::new(offline_config());
        let err = transport.start().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.to_string().contains("/nonexistent/chrome"));
    }

    #[tokio::test]
    async fn closed_connection_is_terminal() {
        let transport = ChromiumTransport::new(offline_config());
        *transport.link.lock().await = Some(Arc::new(BrowserLink::closed()));

        let err = transport.start().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.to_string().contains("connection closed"));

        let err = transport
            .send_command(CommandTarget::Session("S1".into()), "Page.enable", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection closed"));
        assert!(transport.next_event().await.is_none());
    }

    #[tokio::test]
    async fn noop_transport_rejects_commands() {
        let err = NoopTransport
            .send_command(CommandTarget::Browser, "Page.navigate", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
        assert!(err.to_string().contains("Page.navigate"));
        assert!(NoopTransport.next_event().await.is_none());
    }
}
