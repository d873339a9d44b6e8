//! Optional transition validator layered next to the tracker.
//!
//! The tracker records whatever the browser reports. [`TransitionAudit`] watches the same
//! snapshots and flags sequences a well-behaved browser should not produce, without touching
//! the tracker's state.

use std::collections::HashMap;
use std::fmt;

use swtk_core_types::{VersionId, VersionStatus};

use crate::snapshot::VersionSnapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionAnomaly {
    pub version_id: VersionId,
    pub from: VersionStatus,
    pub to: VersionStatus,
}

impl fmt::Display for TransitionAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {} moved from {} to {}",
            self.version_id, self.from, self.to
        )
    }
}

#[derive(Debug, Default)]
pub struct TransitionAudit {
    last: HashMap<VersionId, VersionStatus>,
    anomalies: Vec<TransitionAnomaly>,
}

impl TransitionAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: &VersionSnapshot) -> Option<TransitionAnomaly> {
        let to = snapshot.status;
        let from = self.last.insert(snapshot.version_id.clone(), to)?;
        let regressed = to.rank() < from.rank();
        let skipped_to_redundant = from == VersionStatus::New && to == VersionStatus::Redundant;
        if !(regressed || skipped_to_redundant) {
            return None;
        }
        let anomaly = TransitionAnomaly {
            version_id: snapshot.version_id.clone(),
            from,
            to,
        };
        self.anomalies.push(anomaly.clone());
        Some(anomaly)
    }

    pub fn anomalies(&self) -> &[TransitionAnomaly] {
        &self.anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swtk_core_types::RunningStatus;

    fn snap(version: &str, status: VersionStatus) -> VersionSnapshot {
        VersionSnapshot::new(version, "0", status, RunningStatus::Running)
    }

    #[test]
    fn forward_progress_and_skips_are_accepted() {
        let mut audit = TransitionAudit::new();
        assert!(audit.observe(&snap("0", VersionStatus::New)).is_none());
        assert!(audit.observe(&snap("0", VersionStatus::Installed)).is_none());
        assert!(audit.observe(&snap("0", VersionStatus::Installed)).is_none());
        assert!(audit.observe(&snap("0", VersionStatus::Activated)).is_none());
        assert!(audit.observe(&snap("0", VersionStatus::Redundant)).is_none());
        assert!(audit.anomalies().is_empty());
    }

    #[test]
    fn regressions_and_new_to_redundant_are_flagged() {
        let mut audit = TransitionAudit::new();
        audit.observe(&snap("0", VersionStatus::Activated));
        let anomaly = audit
            .observe(&snap("0", VersionStatus::Installing))
            .expect("regression flagged");
        assert_eq!(anomaly.to_string(), "version 0 moved from activated to installing");

        audit.observe(&snap("1", VersionStatus::New));
        assert!(audit.observe(&snap("1", VersionStatus::Redundant)).is_some());
        assert_eq!(audit.anomalies().len(), 2);
    }
}
