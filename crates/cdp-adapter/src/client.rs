//! Per-tab client: protocol domains, navigation and service worker state for one page.

use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use frame_nav::{FrameStore, NavPolicy, ResponseRecord};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use sw_lifecycle::{
    LifecycleError, TransitionAnomaly, TransitionAudit, VersionSnapshot, WorkerErrorReport,
    WorkerTracker,
};
use swtk_core_types::{FrameId, RequestId, TargetId};
use swtk_deadline::WaitError;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::control::SessionControl;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::protocol::ProtocolEvent;
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};
use crate::util::resolve_target_url;

/// Outcome of [`PageClient::navigate`] or [`PageClient::load`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    pub frame_id: FrameId,
    pub url: String,
    pub responses: Vec<ResponseRecord>,
    /// The document response, or the first captured response when none is typed `Document`.
    pub document: Option<ResponseRecord>,
    pub body: Option<String>,
}

pub struct PageClient {
    target_id: TargetId,
    session: String,
    transport: Arc<dyn CdpTransport>,
    config: ClientConfig,
    frames: FrameStore,
    tracker: WorkerTracker,
    audit: Option<Mutex<TransitionAudit>>,
    main_frame: RwLock<Option<FrameId>>,
}

impl std::fmt::Debug for PageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageClient")
            .field("target_id", &self.target_id)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl PageClient {
    pub fn new(
        target_id: TargetId,
        session: impl Into<String>,
        transport: Arc<dyn CdpTransport>,
        config: ClientConfig,
    ) -> Self {
        let session = session.into();
        let control = Arc::new(SessionControl::new(Arc::clone(&transport), session.clone()));
        Self {
            target_id,
            session,
            frames: FrameStore::with_config(config.navigation.clone()),
            tracker: WorkerTracker::with_config(config.lifecycle.clone(), control),
            audit: config
                .audit_transitions
                .then(|| Mutex::new(TransitionAudit::new())),
            transport,
            config,
            main_frame: RwLock::new(None),
        }
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    pub fn root_url(&self) -> &str {
        &self.config.root_url
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn tracker(&self) -> &WorkerTracker {
        &self.tracker
    }

    /// Enable the `Page`, `Network` and `ServiceWorker` domains plus page lifecycle events.
    pub async fn enable(&self) -> Result<(), AdapterError> {
        futures::try_join!(
            self.send("Page.enable", json!({})),
            self.send("Page.setLifecycleEventsEnabled", json!({ "enabled": true })),
            self.send("Network.enable", json!({})),
            self.send("ServiceWorker.enable", json!({})),
        )?;
        debug!(target: "cdp-adapter", target_id = %self.target_id, "page domains enabled");
        Ok(())
    }

    pub async fn close(&self) -> Result<(), AdapterError> {
        futures::try_join!(
            self.send("Page.disable", json!({})),
            self.send("ServiceWorker.disable", json!({})),
            self.send("Network.disable", json!({})),
        )?;
        Ok(())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self
            .transport
            .send_command(CommandTarget::Session(self.session.clone()), method, params)
            .await
        {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    /// Route one notification from this page's session.
    pub fn handle_event(&self, event: &TransportEvent) {
        let decoded = match ProtocolEvent::decode(event) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(err) => {
                warn!(target: "cdp-adapter", method = %event.method, %err, "ignoring malformed notification");
                return;
            }
        };
        metrics::record_event(&event.method);

        match decoded {
            ProtocolEvent::RequestWillBeSent {
                request_id,
                frame_id: Some(frame),
            } => self.frames.on_request_will_be_sent(request_id, &frame),
            ProtocolEvent::RequestWillBeSent { request_id, frame_id: None } => {
                debug!(target: "cdp-adapter", request = %request_id, "request without frame");
            }
            ProtocolEvent::ResponseReceived(record) => self.frames.on_network_response(record),
            ProtocolEvent::UnscopedResponse { request_id, url } => {
                debug!(target: "cdp-adapter", request = %request_id, %url, "response without frame");
            }
            ProtocolEvent::FrameNavigated {
                frame_id,
                parent_id,
                url,
            } => {
                if parent_id.is_none() {
                    *self.main_frame.write() = Some(frame_id.clone());
                }
                debug!(target: "cdp-adapter", frame = %frame_id, %url, "frame navigated");
                self.frames.on_navigation_complete(&frame_id);
            }
            ProtocolEvent::FrameLoaded(frame) => self.frames.on_load_event(&frame),
            ProtocolEvent::LoadEventFired => {
                let main = self.main_frame.read().clone();
                match main {
                    Some(frame) => self.frames.on_load_event(&frame),
                    None => self.frames.on_unscoped_load_event(),
                }
            }
            ProtocolEvent::WorkerVersionUpdated(versions) => {
                if let Some(audit) = &self.audit {
                    let mut audit = audit.lock();
                    for version in &versions {
                        if let Some(anomaly) = audit.observe(version) {
                            warn!(target: "sw-lifecycle", %anomaly, "unexpected lifecycle transition");
                        }
                    }
                }
                self.tracker.record_versions(versions);
            }
            ProtocolEvent::WorkerRegistrationUpdated(registrations) => {
                for registration in registrations {
                    self.tracker.record_registration(registration);
                }
            }
            ProtocolEvent::WorkerErrorReported(report) => self.tracker.record_error(report),
            ProtocolEvent::TargetDetached { .. } => {}
        }
    }

    /// Id of the tab's top-level frame.
    pub async fn main_frame_id(&self) -> Result<FrameId, AdapterError> {
        if let Some(frame) = self.main_frame.read().clone() {
            return Ok(frame);
        }
        let tree = self.send("Page.getFrameTree", json!({})).await?;
        let id = tree
            .pointer("/frameTree/frame/id")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::protocol("Page.getFrameTree", "missing frameTree.frame.id"))?;
        let frame = FrameId::from(id);
        *self.main_frame.write() = Some(frame.clone());
        Ok(frame)
    }

    /// Navigate and settle once the browser commits to the new document.
    pub async fn navigate(&self, target: Option<&str>) -> Result<NavigateResult, AdapterError> {
        self.navigate_with(target, NavPolicy::CommitOnly).await
    }

    /// Navigate and settle once the load event fired and every request was answered.
    pub async fn load(&self, target: Option<&str>) -> Result<NavigateResult, AdapterError> {
        self.navigate_with(target, NavPolicy::FullLoad).await
    }

    async fn navigate_with(
        &self,
        target: Option<&str>,
        policy: NavPolicy,
    ) -> Result<NavigateResult, AdapterError> {
        let url = resolve_target_url(&self.config.root_url, target).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("invalid navigation target {target:?}: {err}"))
        })?;
        let frame = self.main_frame_id().await?;
        let handle = self.frames.start(frame.clone(), policy);

        let response = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = response.get("errorText").and_then(Value::as_str) {
            return Err(AdapterError::new(AdapterErrorKind::Protocol)
                .with_hint(format!("navigation to {url} failed: {error_text}")));
        }

        let responses = handle.await.map_err(|err| {
            metrics::record_navigation_timeout();
            AdapterError::from(err)
        })?;
        let policy_label = if policy.waits_for_load() {
            "full_load"
        } else {
            "commit_only"
        };
        metrics::record_navigation(policy_label);
        info!(
            target: "cdp-adapter",
            %url,
            frame = %frame,
            responses = responses.len(),
            policy = policy_label,
            "navigation settled"
        );

        let document = responses
            .iter()
            .find(|record| record.is_document())
            .or_else(|| responses.first())
            .cloned();
        let body = match &document {
            Some(record) => match self.response_body(&record.request_id).await {
                Ok(body) => Some(body),
                Err(err) => {
                    warn!(target: "cdp-adapter", request = %record.request_id, %err, "response body unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(NavigateResult {
            frame_id: frame,
            url,
            responses,
            document,
            body,
        })
    }

    /// Captured body of a completed response, base64-decoded when the browser flags it.
    pub async fn response_body(&self, request: &RequestId) -> Result<String, AdapterError> {
        let response = self
            .send("Network.getResponseBody", json!({ "requestId": request }))
            .await?;
        let body = response
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let encoded = response
            .get("base64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !encoded {
            return Ok(body.to_string());
        }
        let bytes = STANDARD
            .decode(body)
            .map_err(|err| AdapterError::protocol("Network.getResponseBody", err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `Runtime.evaluate` with promise awaiting and by-value results.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("runtime exception")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::JsException)
                .with_hint(message)
                .with_data(details.clone()));
        }

        Ok(response
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Register `script_url` from the page and resolve with the registration scope.
    pub async fn register_service_worker(
        &self,
        script_url: &str,
        scope: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let script = json_literal(script_url)?;
        let options = match scope {
            Some(scope) => format!("{{ scope: {} }}", json_literal(scope)?),
            None => "{}".to_string(),
        };
        self.evaluate(&format!(
            "navigator.serviceWorker.register({script}, {options}).then((registration) => registration.scope)"
        ))
        .await
    }

    /// Resolve once the page has a ready registration.
    pub async fn wait_for_service_worker_registration(&self) -> Result<Value, AdapterError> {
        self.evaluate(
            "navigator.serviceWorker.ready \
             .then(() => navigator.serviceWorker.getRegistration()) \
             .then((registration) => registration \
                 ? { scope: registration.scope, active: !!registration.active } \
                 : null)",
        )
        .await
    }

    pub async fn emulate_offline(&self, offline: bool) -> Result<(), AdapterError> {
        self.send(
            "Network.emulateNetworkConditions",
            json!({
                "offline": offline,
                "latency": 0,
                "downloadThroughput": -1,
                "uploadThroughput": -1,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn wait_for_installed(
        &self,
        version: Option<&str>,
    ) -> Result<VersionSnapshot, AdapterError> {
        lifecycle_wait(self.tracker.wait_for_installed(version).await)
    }

    pub async fn wait_for_activated(
        &self,
        version: Option<&str>,
    ) -> Result<VersionSnapshot, AdapterError> {
        lifecycle_wait(self.tracker.wait_for_activated(version).await)
    }

    pub fn get_active(&self) -> Result<VersionSnapshot, AdapterError> {
        Ok(self.tracker.get_active()?)
    }

    pub fn get_last_installed(&self) -> Option<VersionSnapshot> {
        self.tracker.get_last_installed()
    }

    pub async fn skip_waiting(&self) -> Result<(), AdapterError> {
        Ok(self.tracker.skip_waiting().await?)
    }

    pub fn catch_errors(&self, callback: impl Fn(&WorkerErrorReport) + Send + Sync + 'static) {
        self.tracker.catch_errors(callback);
    }

    pub fn ensure_no_errors(&self) -> Result<(), AdapterError> {
        Ok(self.tracker.ensure_no_errors()?)
    }

    /// Lifecycle transitions flagged so far. Empty when auditing is disabled.
    pub fn anomalies(&self) -> Vec<TransitionAnomaly> {
        self.audit
            .as_ref()
            .map(|audit| audit.lock().anomalies().to_vec())
            .unwrap_or_default()
    }
}

fn lifecycle_wait(
    result: Result<VersionSnapshot, WaitError>,
) -> Result<VersionSnapshot, AdapterError> {
    result.map_err(|err| {
        metrics::record_lifecycle_timeout();
        AdapterError::from(LifecycleError::from(err))
    })
}

fn json_literal(value: &str) -> Result<String, AdapterError> {
    serde_json::to_string(value)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}
