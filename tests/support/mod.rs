#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, CdpTransport, CommandTarget, TransportEvent};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&Value) -> Value + Send + Sync>;

/// Browser stand-in with one page tab `T1` reachable through session `S-T1`.
pub struct ScriptedBrowser {
    responders: Mutex<HashMap<String, Responder>>,
    sent: Mutex<Vec<(CommandTarget, String, Value)>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    pub notify: mpsc::UnboundedSender<TransportEvent>,
}

pub const SESSION: &str = "S-T1";

impl ScriptedBrowser {
    pub fn new() -> Arc<Self> {
        let (notify, rx) = mpsc::unbounded_channel();
        let browser = Arc::new(Self {
            responders: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            events: tokio::sync::Mutex::new(rx),
            notify,
        });
        browser.respond(
            "Target.getTargets",
            json!({ "targetInfos": [{ "targetId": "T1", "type": "page", "url": "about:blank" }] }),
        );
        browser.respond("Target.attachToTarget", json!({ "sessionId": SESSION }));
        browser.respond(
            "Page.getFrameTree",
            json!({ "frameTree": { "frame": { "id": "F1", "loaderId": "L0", "url": "about:blank" } } }),
        );
        browser
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.on(method, move |_| value.clone());
    }

    pub fn on(&self, method: &str, responder: impl Fn(&Value) -> Value + Send + Sync + 'static) {
        self.responders
            .lock()
            .insert(method.to_string(), Box::new(responder));
    }

    pub fn methods(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, method, _)| method.clone()).collect()
    }

    pub fn params(&self, method: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, sent, _)| sent == method)
            .map(|(_, _, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl CdpTransport for ScriptedBrowser {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let response = self
            .responders
            .lock()
            .get(method)
            .map(|responder| responder(&params))
            .unwrap_or_else(|| json!({}));
        self.sent.lock().push((target, method.to_string(), params));
        Ok(response)
    }
}

pub fn page_event(method: &str, params: Value) -> TransportEvent {
    TransportEvent::new(method, params).for_session(SESSION)
}

/// Notifications the browser emits for a top-level document load.
pub fn document_events(request: &str, url: &str, from_service_worker: bool) -> Vec<TransportEvent> {
    vec![
        page_event(
            "Network.requestWillBeSent",
            json!({ "requestId": request, "frameId": "F1", "loaderId": "L1" }),
        ),
        page_event(
            "Network.responseReceived",
            json!({
                "requestId": request,
                "frameId": "F1",
                "loaderId": "L1",
                "type": "Document",
                "response": {
                    "url": url,
                    "status": 200,
                    "statusText": "OK",
                    "mimeType": "text/html",
                    "fromServiceWorker": from_service_worker
                }
            }),
        ),
        page_event(
            "Page.frameNavigated",
            json!({ "frame": { "id": "F1", "loaderId": "L1", "url": url } }),
        ),
    ]
}

pub fn version_event(version: &str, status: &str, running: &str, clients: &[&str]) -> TransportEvent {
    page_event(
        "ServiceWorker.workerVersionUpdated",
        json!({ "versions": [{
            "versionId": version,
            "registrationId": "0",
            "scriptURL": "http://localhost:4000/sw.js",
            "status": status,
            "runningStatus": running,
            "controlledClients": clients,
        }]}),
    )
}
