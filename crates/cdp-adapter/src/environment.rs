//! Tab environment: page discovery, tab switching and event routing for one browser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use swtk_core_types::TargetId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::PageClient;
use crate::config::ClientConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::protocol::ProtocolEvent;
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};

/// Tab as listed by `Target.getTargets`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsResponse {
    target_infos: Vec<TabInfo>,
}

pub struct BrowserEnvironment {
    transport: Arc<dyn CdpTransport>,
    config: ClientConfig,
    clients: DashMap<TargetId, Arc<PageClient>>,
    sessions: DashMap<String, TargetId>,
    active: RwLock<Option<TargetId>>,
    shutdown: CancellationToken,
    /// Set once the browser connection is gone; never cleared.
    disconnected: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BrowserEnvironment {
    pub fn new(transport: Arc<dyn CdpTransport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            clients: DashMap::new(),
            sessions: DashMap::new(),
            active: RwLock::new(None),
            shutdown: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the transport and the routing loop, then attach to and activate the first tab.
    pub async fn start(self: &Arc<Self>) -> Result<Arc<PageClient>, AdapterError> {
        {
            let mut tasks = self.tasks.lock().await;
            if tasks.is_empty() {
                self.transport.start().await?;
                tasks.push(spawn(Self::event_loop(Arc::clone(self))));
                info!(target: "cdp-adapter", "event loop started");
            }
        }

        let tabs = self.list_tabs().await?;
        let initial = match tabs.first() {
            Some(tab) => tab.target_id.clone(),
            None => self.create_target().await?,
        };
        self.attach_client(&initial).await?;
        self.activate(&initial).await
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Page tabs in browser order, newest first.
    pub async fn list_tabs(&self) -> Result<Vec<TabInfo>, AdapterError> {
        let response = self
            .transport
            .send_command(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let targets: TargetsResponse = serde_json::from_value(response)
            .map_err(|err| AdapterError::protocol("Target.getTargets", err))?;
        Ok(targets
            .target_infos
            .into_iter()
            .filter(|tab| tab.target_type == "page")
            .collect())
    }

    pub fn active_client(&self) -> Result<Arc<PageClient>, AdapterError> {
        if self.is_disconnected() {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("browser connection closed"));
        }
        let active = self.active.read().clone();
        active
            .and_then(|target| self.client(&target))
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("no active tab")
            })
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn client(&self, target: &TargetId) -> Option<Arc<PageClient>> {
        self.clients.get(target).map(|entry| Arc::clone(entry.value()))
    }

    pub fn clients(&self) -> Vec<Arc<PageClient>> {
        self.clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Open a tab and attach a client to it without activating it.
    pub async fn new_tab(&self) -> Result<Arc<PageClient>, AdapterError> {
        let target = self.create_target().await?;
        self.attach_client(&target).await
    }

    pub async fn open_tab_by_id(&self, target: &TargetId) -> Result<Arc<PageClient>, AdapterError> {
        if self.client(target).is_none() {
            self.attach_client(target).await?;
        }
        self.activate(target).await
    }

    /// Activate the tab at `index`, counted from the oldest tab. `None` when out of range.
    pub async fn open_tab_by_index(
        &self,
        index: usize,
    ) -> Result<Option<Arc<PageClient>>, AdapterError> {
        let tabs = self.list_tabs().await?;
        let Some(raw) = tabs.len().checked_sub(index).and_then(|n| n.checked_sub(1)) else {
            return Ok(None);
        };
        let target = tabs[raw].target_id.clone();
        self.open_tab_by_id(&target).await.map(Some)
    }

    /// Activate the most recently opened tab.
    pub async fn open_last_tab(&self) -> Result<Option<Arc<PageClient>>, AdapterError> {
        let tabs = self.list_tabs().await?;
        match tabs.first() {
            Some(tab) => {
                let target = tab.target_id.clone();
                self.open_tab_by_id(&target).await.map(Some)
            }
            None => Ok(None),
        }
    }

    pub async fn open_and_activate_tab(&self) -> Result<Arc<PageClient>, AdapterError> {
        self.new_tab().await?;
        self.open_last_tab().await?;
        self.active_client()
    }

    async fn create_target(&self) -> Result<TargetId, AdapterError> {
        let response = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        response
            .get("targetId")
            .and_then(Value::as_str)
            .map(TargetId::from)
            .ok_or_else(|| AdapterError::protocol("Target.createTarget", "missing targetId"))
    }

    async fn attach_client(&self, target: &TargetId) -> Result<Arc<PageClient>, AdapterError> {
        let response = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target, "flatten": true }),
            )
            .await?;
        let session = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::protocol("Target.attachToTarget", "missing sessionId"))?
            .to_string();

        let client = Arc::new(PageClient::new(
            target.clone(),
            session.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
        ));
        // Routes must exist before the domains are enabled so no early notification is lost.
        self.sessions.insert(session.clone(), target.clone());
        self.clients.insert(target.clone(), Arc::clone(&client));
        client.enable().await?;
        info!(target: "cdp-adapter", target_id = %target, %session, "tab client attached");
        Ok(client)
    }

    async fn activate(&self, target: &TargetId) -> Result<Arc<PageClient>, AdapterError> {
        self.transport
            .send_command(
                CommandTarget::Browser,
                "Target.activateTarget",
                json!({ "targetId": target }),
            )
            .await?;
        *self.active.write() = Some(target.clone());
        self.client(target).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("no client attached to tab {target}"))
        })
    }

    /// Deliver one notification to whichever client owns its session.
    pub fn route(&self, event: &TransportEvent) {
        let Some(session) = event.session_id.as_deref() else {
            if let Ok(Some(ProtocolEvent::TargetDetached { session_id, .. })) =
                ProtocolEvent::decode(event)
            {
                self.forget_session(&session_id);
            }
            return;
        };

        let owner = self.sessions.get(session).map(|entry| entry.value().clone());
        match owner.and_then(|target| self.client(&target)) {
            Some(client) => client.handle_event(event),
            None => {
                let worker_session = self.clients.iter().any(|client| {
                    client
                        .tracker()
                        .worker_sessions()
                        .iter()
                        .any(|worker| worker.session_id.as_str() == session)
                });
                if worker_session {
                    debug!(target: "cdp-adapter", method = %event.method, session, "worker notification");
                } else {
                    debug!(target: "cdp-adapter", method = %event.method, session, "unrouted notification");
                }
            }
        }
    }

    fn forget_session(&self, session: &str) {
        if let Some((_, target)) = self.sessions.remove(session) {
            self.clients.remove(&target);
            let mut active = self.active.write();
            if active.as_ref() == Some(&target) {
                *active = None;
            }
            debug!(target: "cdp-adapter", target_id = %target, session, "tab session detached");
        }
    }

    async fn event_loop(self: Arc<Self>) {
        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => match event {
                    Some(event) => self.route(&event),
                    None => {
                        if !self.shutdown.is_cancelled() {
                            error!(target: "cdp-adapter", "browser connection closed");
                            self.disconnected.store(true, Ordering::SeqCst);
                        }
                        break;
                    }
                },
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }
}
