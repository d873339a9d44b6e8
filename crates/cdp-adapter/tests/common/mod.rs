#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, CdpTransport, CommandTarget, TransportEvent};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SentCommand {
    pub target: CommandTarget,
    pub method: String,
    pub params: Value,
}

/// Scripted transport: records every command and answers from per-method responders.
pub struct MockTransport {
    responders: Mutex<HashMap<String, Responder>>,
    commands: Mutex<Vec<SentCommand>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                responders: Mutex::new(HashMap::new()),
                commands: Mutex::new(Vec::new()),
                events: tokio::sync::Mutex::new(rx),
            }),
            tx,
        )
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.on(method, move |_| value.clone());
    }

    pub fn on(&self, method: &str, responder: impl Fn(&Value) -> Value + Send + Sync + 'static) {
        self.responders
            .lock()
            .insert(method.to_string(), Box::new(responder));
    }

    pub fn commands(&self) -> Vec<SentCommand> {
        self.commands.lock().clone()
    }

    pub fn sent(&self, method: &str) -> Vec<SentCommand> {
        self.commands()
            .into_iter()
            .filter(|command| command.method == method)
            .collect()
    }

    pub async fn wait_for_command(&self, method: &str) -> SentCommand {
        for _ in 0..400 {
            if let Some(found) = self.sent(method).into_iter().next() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{method} was never sent; saw {:?}", self.commands());
    }
}

#[async_trait]
impl CdpTransport for MockTransport {
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
        self.commands.lock().push(SentCommand {
            target,
            method: method.to_string(),
            params,
        });
        Ok(response)
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

pub fn request_sent(request: &str, frame: &str) -> TransportEvent {
    TransportEvent::new(
        "Network.requestWillBeSent",
        json!({ "requestId": request, "frameId": frame, "loaderId": "L1" }),
    )
}

pub fn response_received(request: &str, frame: &str, kind: &str, url: &str) -> TransportEvent {
    TransportEvent::new(
        "Network.responseReceived",
        json!({
            "requestId": request,
            "frameId": frame,
            "loaderId": "L1",
            "type": kind,
            "response": { "url": url, "status": 200, "statusText": "OK", "mimeType": "text/html" }
        }),
    )
}

pub fn frame_navigated(frame: &str, url: &str) -> TransportEvent {
    TransportEvent::new(
        "Page.frameNavigated",
        json!({ "frame": { "id": frame, "loaderId": "L1", "url": url } }),
    )
}

pub fn frame_loaded(frame: &str) -> TransportEvent {
    TransportEvent::new(
        "Page.lifecycleEvent",
        json!({ "frameId": frame, "loaderId": "L1", "name": "load", "timestamp": 1.0 }),
    )
}

pub fn versions(batch: &[(&str, &str, &str)]) -> TransportEvent {
    let versions: Vec<Value> = batch
        .iter()
        .map(|(version, status, running)| {
            json!({
                "versionId": version,
                "registrationId": "0",
                "scriptURL": "http://localhost:4000/sw.js",
                "status": status,
                "runningStatus": running,
            })
        })
        .collect();
    TransportEvent::new(
        "ServiceWorker.workerVersionUpdated",
        json!({ "versions": versions }),
    )
}
