//! Sync cursors for incremental pulls.
//!
//! A cursor records the position of the last change-log entry a device has
//! consumed. The log is ordered by `(timestamp, change_id)`; the change id
//! breaks timestamp ties so that two entries written in the same
//! microsecond are still delivered exactly once and in a stable order.
//!
//! On the wire a cursor is an opaque URL-safe base64 token. Clients must
//! not interpret it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use filesync_sync_types::{ChangeId, ChangeLogEntry, DeviceId, SyncError};
use std::cmp::Ordering;

/// Token format version prefix.
const TOKEN_VERSION: &str = "v1";

/// Position in the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    timestamp: DateTime<Utc>,
    change_id: ChangeId,
}

impl SyncCursor {
    /// Create a cursor at the given position.
    pub fn new(timestamp: DateTime<Utc>, change_id: ChangeId) -> Self {
        Self {
            timestamp,
            change_id,
        }
    }

    /// Cursor positioned at an entry (that entry counts as consumed).
    pub fn at(entry: &ChangeLogEntry) -> Self {
        Self::new(entry.timestamp, entry.change_id.clone())
    }

    /// Timestamp component.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Tie-break component.
    pub fn change_id(&self) -> &ChangeId {
        &self.change_id
    }

    /// Whether an entry lies strictly after this cursor.
    pub fn precedes(&self, entry: &ChangeLogEntry) -> bool {
        (self.timestamp, &self.change_id) < (entry.timestamp, &entry.change_id)
    }

    /// Encode as an opaque token.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}:{}:{}",
            TOKEN_VERSION,
            self.timestamp.timestamp_micros(),
            self.change_id
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    /// Decode a token produced by [`SyncCursor::encode`].
    pub fn decode(token: &str) -> Result<Self, SyncError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| SyncError::InvalidCursor)?;
        let raw = String::from_utf8(bytes).map_err(|_| SyncError::InvalidCursor)?;

        // Change ids may contain ':' so only split off the first two fields.
        let mut parts = raw.splitn(3, ':');
        let (Some(version), Some(micros), Some(change_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(SyncError::InvalidCursor);
        };
        if version != TOKEN_VERSION || change_id.is_empty() {
            return Err(SyncError::InvalidCursor);
        }
        let micros: i64 = micros.parse().map_err(|_| SyncError::InvalidCursor)?;
        let timestamp =
            DateTime::<Utc>::from_timestamp_micros(micros).ok_or(SyncError::InvalidCursor)?;

        Ok(Self::new(timestamp, ChangeId::from(change_id.to_string())))
    }
}

impl PartialOrd for SyncCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SyncCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, &self.change_id).cmp(&(other.timestamp, &other.change_id))
    }
}

/// The result of a pull, assembled from the user's log slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PullBatch {
    /// Entries to deliver, in log order, without the requester's own.
    pub changes: Vec<ChangeLogEntry>,
    /// Cursor to commit after applying `changes`.
    pub cursor: Option<SyncCursor>,
}

impl PullBatch {
    /// Build a batch for `device` from the entries after `previous`.
    ///
    /// `entries` is everything the store returned for the user after the
    /// previous cursor. The new cursor covers the requester's own entries
    /// too, so they are not scanned again on the next pull. When nothing
    /// was fetched the previous cursor is kept.
    pub fn assemble(
        mut entries: Vec<ChangeLogEntry>,
        device: &DeviceId,
        previous: Option<SyncCursor>,
    ) -> Self {
        entries.sort_by(|a, b| {
            (a.timestamp, &a.change_id).cmp(&(b.timestamp, &b.change_id))
        });
        if let Some(prev) = &previous {
            entries.retain(|e| prev.precedes(e));
        }

        let cursor = entries.last().map(SyncCursor::at).or(previous);
        let changes = entries
            .into_iter()
            .filter(|e| !e.originated_by(device))
            .collect();

        Self { changes, cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use filesync_sync_types::{ChangeKind, FileId, UserId};

    fn entry(secs: i64, change_id: &str, device: Option<DeviceId>) -> ChangeLogEntry {
        ChangeLogEntry {
            change_id: ChangeId::from(change_id.to_string()),
            file_id: FileId::new(),
            user_id: UserId::new(),
            device_id: device,
            change_type: ChangeKind::Updated,
            file_path: format!("/{change_id}"),
            file_hash: String::new(),
            file_size: 0,
            version: 1,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn token_roundtrip() {
        let ts = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let cursor = SyncCursor::new(ts, ChangeId::from("abc:def".to_string()));
        let decoded = SyncCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.change_id().as_str(), "abc:def");
    }

    #[test]
    fn token_is_url_safe() {
        let cursor = SyncCursor::at(&entry(1, "x/y+z", None));
        let token = cursor.encode();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(SyncCursor::decode("%%%").is_err());
        assert!(SyncCursor::decode(&URL_SAFE_NO_PAD.encode("v2:1:x")).is_err());
        assert!(SyncCursor::decode(&URL_SAFE_NO_PAD.encode("v1:nope:x")).is_err());
        assert!(SyncCursor::decode(&URL_SAFE_NO_PAD.encode("v1:1:")).is_err());
        assert!(SyncCursor::decode(&URL_SAFE_NO_PAD.encode("v1:1")).is_err());
    }

    #[test]
    fn ties_broken_by_change_id() {
        let a = entry(10, "a", None);
        let b = entry(10, "b", None);
        let cursor = SyncCursor::at(&a);
        assert!(cursor.precedes(&b));
        assert!(!cursor.precedes(&a));
        assert!(SyncCursor::at(&a) < SyncCursor::at(&b));
    }

    #[test]
    fn assemble_filters_own_entries_and_sorts() {
        let me = DeviceId::new();
        let other = DeviceId::new();
        let entries = vec![
            entry(3, "c", Some(other)),
            entry(1, "a", Some(other)),
            entry(2, "b", Some(me)),
        ];

        let batch = PullBatch::assemble(entries, &me, None);
        let ids: Vec<_> = batch.changes.iter().map(|e| e.change_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(batch.cursor.unwrap().change_id().as_str(), "c");
    }

    #[test]
    fn cursor_advances_past_own_entries() {
        let me = DeviceId::new();
        let batch = PullBatch::assemble(vec![entry(5, "mine", Some(me))], &me, None);
        assert!(batch.changes.is_empty());
        assert_eq!(batch.cursor.unwrap().change_id().as_str(), "mine");
    }

    #[test]
    fn empty_fetch_keeps_previous_cursor() {
        let me = DeviceId::new();
        let previous = SyncCursor::at(&entry(7, "p", None));
        let batch = PullBatch::assemble(Vec::new(), &me, Some(previous.clone()));
        assert!(batch.changes.is_empty());
        assert_eq!(batch.cursor, Some(previous));
    }

    #[test]
    fn assemble_drops_entries_at_or_before_previous() {
        let me = DeviceId::new();
        let previous = SyncCursor::at(&entry(5, "m", None));
        let entries = vec![entry(5, "a", None), entry(5, "m", None), entry(5, "z", None)];
        let batch = PullBatch::assemble(entries, &me, Some(previous));
        let ids: Vec<_> = batch.changes.iter().map(|e| e.change_id.as_str()).collect();
        assert_eq!(ids, vec!["z"]);
    }

    #[test]
    fn upstream_entries_reach_every_device() {
        let me = DeviceId::new();
        let batch = PullBatch::assemble(vec![entry(1, "u", None)], &me, None);
        assert_eq!(batch.changes.len(), 1);
    }
}
