use std::fmt;

use swtk_core_types::{RunningStatus, VersionId, VersionStatus};

use crate::snapshot::VersionSnapshot;

/// Key into the state history and the listener registry.
///
/// Omitting `version` makes the identity a wildcard over every version with the same
/// status pair. An omitted `running_status` means `running` once the identity is used to wait.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct VersionIdentity {
    pub version: Option<VersionId>,
    pub status: VersionStatus,
    pub running_status: Option<RunningStatus>,
}

impl VersionIdentity {
    pub fn any(status: VersionStatus) -> Self {
        Self {
            version: None,
            status,
            running_status: None,
        }
    }

    pub fn of_version(version: impl Into<VersionId>, status: VersionStatus) -> Self {
        Self {
            version: Some(version.into()),
            status,
            running_status: None,
        }
    }

    pub fn with_running_status(mut self, running_status: RunningStatus) -> Self {
        self.running_status = Some(running_status);
        self
    }

    /// Exact identity of an observed snapshot.
    pub fn of(snapshot: &VersionSnapshot) -> Self {
        Self {
            version: Some(snapshot.version_id.clone()),
            status: snapshot.status,
            running_status: Some(snapshot.running_status),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.version.is_none()
    }

    pub(crate) fn running_or_default(&self) -> RunningStatus {
        self.running_status.unwrap_or_default()
    }

    pub(crate) fn wait_key(&self) -> Self {
        Self {
            version: self.version.clone(),
            status: self.status,
            running_status: Some(self.running_or_default()),
        }
    }

    pub(crate) fn as_wildcard(&self) -> Self {
        Self {
            version: None,
            status: self.status,
            running_status: self.running_status,
        }
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "version {version}")?,
            None => f.write_str("any version")?,
        }
        write!(f, " {}", self.status)?;
        if let Some(running) = self.running_status {
            write!(f, " ({running})")?;
        }
        Ok(())
    }
}
