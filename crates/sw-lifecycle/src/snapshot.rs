//! Wire shapes of the `ServiceWorker` domain notifications the tracker consumes.

use serde::{Deserialize, Serialize};
use swtk_core_types::{RegistrationId, RunningStatus, TargetId, VersionId, VersionStatus};

/// One observed state of a service worker version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub version_id: VersionId,
    pub registration_id: RegistrationId,
    #[serde(rename = "scriptURL", default)]
    pub script_url: String,
    pub status: VersionStatus,
    pub running_status: RunningStatus,
    #[serde(default)]
    pub controlled_clients: Vec<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_last_modified: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_response_time: Option<f64>,
}

impl VersionSnapshot {
    pub fn new(
        version_id: impl Into<VersionId>,
        registration_id: impl Into<RegistrationId>,
        status: VersionStatus,
        running_status: RunningStatus,
    ) -> Self {
        Self {
            version_id: version_id.into(),
            registration_id: registration_id.into(),
            script_url: String::new(),
            status,
            running_status,
            controlled_clients: Vec::new(),
            target_id: None,
            script_last_modified: None,
            script_response_time: None,
        }
    }

    pub fn with_script_url(mut self, url: impl Into<String>) -> Self {
        self.script_url = url.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<TargetId>) -> Self {
        self.target_id = Some(target.into());
        self
    }

    pub fn with_controlled_clients(mut self, clients: Vec<TargetId>) -> Self {
        self.controlled_clients = clients;
        self
    }

    pub fn is_running_in(&self, status: VersionStatus) -> bool {
        self.status == status && self.running_status == RunningStatus::Running
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSnapshot {
    pub registration_id: RegistrationId,
    #[serde(rename = "scopeURL")]
    pub scope_url: String,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Uncaught error reported by a worker (`ServiceWorker.workerErrorReported`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerErrorReport {
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<RegistrationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<VersionId>,
    #[serde(rename = "sourceURL", default)]
    pub source_url: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
}

impl WorkerErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            registration_id: None,
            version_id: None,
            source_url: String::new(),
            line_number: 0,
            column_number: 0,
        }
    }
}
