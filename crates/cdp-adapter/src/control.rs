use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sw_lifecycle::{ControlError, WorkerControl, WorkerSession};
use swtk_core_types::{SessionId, TargetId};
use tracing::debug;

use crate::error::AdapterError;
use crate::transport::{CdpTransport, CommandTarget};

/// Worker control routed through a page's protocol session.
pub struct SessionControl {
    transport: Arc<dyn CdpTransport>,
    page_session: String,
}

impl SessionControl {
    pub fn new(transport: Arc<dyn CdpTransport>, page_session: impl Into<String>) -> Self {
        Self {
            transport,
            page_session: page_session.into(),
        }
    }
}

fn command_error(method: &str, err: AdapterError) -> ControlError {
    ControlError::Command {
        method: method.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl WorkerControl for SessionControl {
    async fn skip_waiting(&self, scope_url: &str) -> Result<(), ControlError> {
        const METHOD: &str = "ServiceWorker.skipWaiting";
        self.transport
            .send_command(
                CommandTarget::Session(self.page_session.clone()),
                METHOD,
                json!({ "scopeURL": scope_url }),
            )
            .await
            .map_err(|err| command_error(METHOD, err))?;
        Ok(())
    }

    async fn attach_worker(&self, target: &TargetId) -> Result<WorkerSession, ControlError> {
        const ATTACH: &str = "Target.attachToTarget";
        let response = self
            .transport
            .send_command(
                CommandTarget::Browser,
                ATTACH,
                json!({ "targetId": target, "flatten": true }),
            )
            .await
            .map_err(|err| command_error(ATTACH, err))?;
        let session = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ControlError::Command {
                method: ATTACH.to_string(),
                reason: "response missing sessionId".to_string(),
            })?
            .to_string();

        const ENABLE: &str = "Network.enable";
        self.transport
            .send_command(CommandTarget::Session(session.clone()), ENABLE, json!({}))
            .await
            .map_err(|err| command_error(ENABLE, err))?;

        debug!(target: "cdp-adapter", target_id = %target, session = %session, "worker network enabled");
        Ok(WorkerSession {
            target_id: target.clone(),
            session_id: SessionId(session),
        })
    }
}
