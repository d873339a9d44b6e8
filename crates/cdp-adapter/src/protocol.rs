//! Typed decoding of the protocol notifications the harness routes.

use frame_nav::{ResponseMeta, ResponseRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sw_lifecycle::{RegistrationSnapshot, VersionSnapshot, WorkerErrorReport};
use swtk_core_types::{FrameId, RequestId, TargetId};

use crate::error::AdapterError;
use crate::transport::TransportEvent;

/// Notifications the page client understands. Everything else is ignored.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolEvent {
    RequestWillBeSent {
        request_id: RequestId,
        frame_id: Option<FrameId>,
    },
    ResponseReceived(ResponseRecord),
    /// Response without a frame (worker-initiated fetches, for instance).
    UnscopedResponse { request_id: RequestId, url: String },
    FrameNavigated {
        frame_id: FrameId,
        parent_id: Option<FrameId>,
        url: String,
    },
    /// `Page.lifecycleEvent` with `name == "load"`.
    FrameLoaded(FrameId),
    /// `Page.loadEventFired`, which names no frame.
    LoadEventFired,
    WorkerVersionUpdated(Vec<VersionSnapshot>),
    WorkerRegistrationUpdated(Vec<RegistrationSnapshot>),
    WorkerErrorReported(WorkerErrorReport),
    TargetDetached { session_id: String, target_id: Option<TargetId> },
}

impl ProtocolEvent {
    /// Decode `event`. `Ok(None)` means the method is not routed by the harness.
    pub fn decode(event: &TransportEvent) -> Result<Option<Self>, AdapterError> {
        let method = event.method.as_str();
        let decoded = match method {
            "Network.requestWillBeSent" => {
                let params: RequestWillBeSentParams = parse(method, &event.params)?;
                ProtocolEvent::RequestWillBeSent {
                    request_id: params.request_id,
                    frame_id: params.frame_id,
                }
            }
            "Network.responseReceived" => {
                let params: ResponseReceivedParams = parse(method, &event.params)?;
                match params.frame_id {
                    Some(frame) => {
                        let mut record =
                            ResponseRecord::new(params.request_id, frame, params.response);
                        if let Some(kind) = params.resource_type {
                            record = record.with_resource_type(kind);
                        }
                        if let Some(loader) = params.loader_id {
                            record = record.with_loader_id(loader);
                        }
                        ProtocolEvent::ResponseReceived(record)
                    }
                    None => ProtocolEvent::UnscopedResponse {
                        request_id: params.request_id,
                        url: params.response.url,
                    },
                }
            }
            "Page.frameNavigated" => {
                let params: FrameNavigatedParams = parse(method, &event.params)?;
                ProtocolEvent::FrameNavigated {
                    frame_id: params.frame.id,
                    parent_id: params.frame.parent_id,
                    url: params.frame.url,
                }
            }
            "Page.lifecycleEvent" => {
                let params: LifecycleEventParams = parse(method, &event.params)?;
                if params.name != "load" {
                    return Ok(None);
                }
                ProtocolEvent::FrameLoaded(params.frame_id)
            }
            "Page.loadEventFired" => ProtocolEvent::LoadEventFired,
            "ServiceWorker.workerVersionUpdated" => {
                let params: VersionUpdatedParams = parse(method, &event.params)?;
                ProtocolEvent::WorkerVersionUpdated(params.versions)
            }
            "ServiceWorker.workerRegistrationUpdated" => {
                let params: RegistrationUpdatedParams = parse(method, &event.params)?;
                ProtocolEvent::WorkerRegistrationUpdated(params.registrations)
            }
            "ServiceWorker.workerErrorReported" => {
                let params: ErrorReportedParams = parse(method, &event.params)?;
                ProtocolEvent::WorkerErrorReported(params.error_message)
            }
            "Target.detachedFromTarget" => {
                let params: DetachedParams = parse(method, &event.params)?;
                ProtocolEvent::TargetDetached {
                    session_id: params.session_id,
                    target_id: params.target_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

fn parse<T: DeserializeOwned>(method: &str, params: &Value) -> Result<T, AdapterError> {
    T::deserialize(params).map_err(|err| AdapterError::protocol(method, err))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSentParams {
    request_id: RequestId,
    frame_id: Option<FrameId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceivedParams {
    request_id: RequestId,
    frame_id: Option<FrameId>,
    loader_id: Option<String>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    response: ResponseMeta,
}

#[derive(Debug, Deserialize)]
struct FrameNavigatedParams {
    frame: FramePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FramePayload {
    id: FrameId,
    parent_id: Option<FrameId>,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleEventParams {
    frame_id: FrameId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VersionUpdatedParams {
    versions: Vec<VersionSnapshot>,
}

#[derive(Debug, Deserialize)]
struct RegistrationUpdatedParams {
    registrations: Vec<RegistrationSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReportedParams {
    error_message: WorkerErrorReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetachedParams {
    session_id: String,
    target_id: Option<TargetId>,
}
