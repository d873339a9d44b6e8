use serde::{Deserialize, Serialize};
use swtk_core_types::{FrameId, RequestId};

/// Response metadata as reported by `Network.responseReceived`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseMeta {
    pub url: String,
    pub status: i64,
    pub status_text: String,
    pub mime_type: String,
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub from_service_worker: bool,
    pub from_disk_cache: bool,
    #[serde(rename = "remoteIPAddress", skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// One captured response, owned by the frame that issued the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub request_id: RequestId,
    pub frame_id: FrameId,
    pub url: String,
    pub resource_type: Option<String>,
    pub loader_id: Option<String>,
    pub response: ResponseMeta,
}

impl ResponseRecord {
    pub fn new(request_id: RequestId, frame_id: FrameId, response: ResponseMeta) -> Self {
        Self {
            request_id,
            frame_id,
            url: response.url.clone(),
            resource_type: None,
            loader_id: None,
            response,
        }
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_loader_id(mut self, loader_id: impl Into<String>) -> Self {
        self.loader_id = Some(loader_id.into());
        self
    }

    pub fn is_document(&self) -> bool {
        self.resource_type.as_deref() == Some("Document")
    }
}
