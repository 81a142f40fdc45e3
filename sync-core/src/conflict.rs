//! Conflict detection policies.
//!
//! Pushing a change never blocks on a conflict: the change is appended to
//! the log regardless, and a policy decides whether the push should also
//! record a [`SyncConflict`](filesync_sync_types::SyncConflict) for the
//! user to settle later.

use filesync_sync_types::{ChangeKind, ChangeLogEntry, DeviceId, FileId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Conflict type recorded for two concurrent edits.
pub const CONCURRENT_EDIT: &str = "concurrent_edit";
/// Conflict type recorded when one side deleted the file.
pub const DELETE_CONFLICT: &str = "delete_conflict";

/// A conflict a policy wants recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    /// File in disagreement.
    pub file_id: FileId,
    /// Owning user.
    pub user_id: UserId,
    /// Classification.
    pub conflict_type: String,
    /// Device holding the latest logged version.
    pub device_a: DeviceId,
    /// Device pushing the incoming change.
    pub device_b: DeviceId,
    /// Latest logged version.
    pub version_a: i32,
    /// Incoming version.
    pub version_b: i32,
}

/// Decides whether an incoming change conflicts with the log.
pub trait ConflictPolicy: Send + Sync + Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether [`ConflictPolicy::evaluate`] looks at `latest`. When false
    /// the caller may skip the lookup.
    fn inspects_history(&self) -> bool {
        true
    }

    /// Compare `incoming` with the latest logged entry for the same file.
    fn evaluate(
        &self,
        latest: Option<&ChangeLogEntry>,
        incoming: &ChangeLogEntry,
    ) -> Option<ConflictCandidate>;
}

/// Never reports a conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetection;

impl ConflictPolicy for NoDetection {
    fn name(&self) -> &'static str {
        "none"
    }

    fn inspects_history(&self) -> bool {
        false
    }

    fn evaluate(
        &self,
        _latest: Option<&ChangeLogEntry>,
        _incoming: &ChangeLogEntry,
    ) -> Option<ConflictCandidate> {
        None
    }
}

/// Reports a conflict when a device pushes a version that does not move
/// past the latest version another device logged for the same file.
///
/// Entries without a device (upstream events) never take part.
#[derive(Debug, Clone, Copy, Default)]
pub struct DivergentVersion;

impl ConflictPolicy for DivergentVersion {
    fn name(&self) -> &'static str {
        "divergent-version"
    }

    fn evaluate(
        &self,
        latest: Option<&ChangeLogEntry>,
        incoming: &ChangeLogEntry,
    ) -> Option<ConflictCandidate> {
        let latest = latest?;
        let device_a = latest.device_id?;
        let device_b = incoming.device_id?;
        if device_a == device_b || latest.file_id != incoming.file_id {
            return None;
        }
        if incoming.version > latest.version {
            return None;
        }

        let deleted_a = latest.change_type == ChangeKind::Deleted;
        let deleted_b = incoming.change_type == ChangeKind::Deleted;
        let conflict_type = if deleted_a != deleted_b {
            DELETE_CONFLICT
        } else {
            CONCURRENT_EDIT
        };

        Some(ConflictCandidate {
            file_id: incoming.file_id,
            user_id: incoming.user_id,
            conflict_type: conflict_type.to_string(),
            device_a,
            device_b,
            version_a: latest.version,
            version_b: incoming.version,
        })
    }
}

/// Configurable policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// [`NoDetection`]
    #[default]
    None,
    /// [`DivergentVersion`]
    DivergentVersion,
}

impl PolicyKind {
    /// Instantiate the selected policy.
    pub fn build(self) -> Arc<dyn ConflictPolicy> {
        match self {
            PolicyKind::None => Arc::new(NoDetection),
            PolicyKind::DivergentVersion => Arc::new(DivergentVersion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use filesync_sync_types::ChangeId;

    fn entry(
        file: FileId,
        user: UserId,
        device: Option<DeviceId>,
        kind: ChangeKind,
        version: i32,
    ) -> ChangeLogEntry {
        ChangeLogEntry {
            change_id: ChangeId::generate(),
            file_id: file,
            user_id: user,
            device_id: device,
            change_type: kind,
            file_path: "/doc.txt".to_string(),
            file_hash: String::new(),
            file_size: 1,
            version,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn no_detection_is_silent() {
        let (f, u) = (FileId::new(), UserId::new());
        let a = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 2);
        let b = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 2);
        assert!(NoDetection.evaluate(Some(&a), &b).is_none());
    }

    #[test]
    fn same_version_from_other_device_conflicts() {
        let (f, u) = (FileId::new(), UserId::new());
        let (da, db) = (DeviceId::new(), DeviceId::new());
        let a = entry(f, u, Some(da), ChangeKind::Updated, 2);
        let b = entry(f, u, Some(db), ChangeKind::Updated, 2);

        let c = DivergentVersion.evaluate(Some(&a), &b).unwrap();
        assert_eq!(c.conflict_type, CONCURRENT_EDIT);
        assert_eq!(c.device_a, da);
        assert_eq!(c.device_b, db);
        assert_eq!((c.version_a, c.version_b), (2, 2));
    }

    #[test]
    fn newer_version_does_not_conflict() {
        let (f, u) = (FileId::new(), UserId::new());
        let a = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 2);
        let b = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 3);
        assert!(DivergentVersion.evaluate(Some(&a), &b).is_none());
    }

    #[test]
    fn same_device_never_conflicts() {
        let (f, u, d) = (FileId::new(), UserId::new(), DeviceId::new());
        let a = entry(f, u, Some(d), ChangeKind::Updated, 5);
        let b = entry(f, u, Some(d), ChangeKind::Updated, 1);
        assert!(DivergentVersion.evaluate(Some(&a), &b).is_none());
    }

    #[test]
    fn upstream_entries_are_ignored() {
        let (f, u) = (FileId::new(), UserId::new());
        let a = entry(f, u, None, ChangeKind::Updated, 5);
        let b = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 1);
        assert!(DivergentVersion.evaluate(Some(&a), &b).is_none());
        assert!(DivergentVersion.evaluate(None, &b).is_none());
    }

    #[test]
    fn one_sided_delete_is_classified() {
        let (f, u) = (FileId::new(), UserId::new());
        let a = entry(f, u, Some(DeviceId::new()), ChangeKind::Deleted, 4);
        let b = entry(f, u, Some(DeviceId::new()), ChangeKind::Updated, 4);
        let c = DivergentVersion.evaluate(Some(&a), &b).unwrap();
        assert_eq!(c.conflict_type, DELETE_CONFLICT);
    }

    #[test]
    fn policy_kind_from_config_name() {
        let kind: PolicyKind = serde_json::from_str("\"divergent-version\"").unwrap();
        assert_eq!(kind, PolicyKind::DivergentVersion);
        assert_eq!(kind.build().name(), "divergent-version");
        assert!(kind.build().inspects_history());
        assert_eq!(PolicyKind::default().build().name(), "none");
        assert!(!PolicyKind::default().build().inspects_history());
    }
}
