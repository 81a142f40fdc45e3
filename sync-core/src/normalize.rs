//! Upstream event decoding and normalization.
//!
//! File events come from producers written in different languages. Some
//! send the snake_case shape [`FileEvent`] expects, others send camelCase.
//! Decoding therefore happens in two steps:
//!
//! 1. Strict decode into [`FileEvent`] ([`DecodedFileEvent::Typed`]).
//! 2. On failure, decode into a generic JSON object
//!    ([`DecodedFileEvent::Generic`]) and pull recognized keys out of it
//!    using [`FIELD_TABLE`], which lists the accepted names per field in
//!    priority order.
//!
//! The decoded event is then mapped onto a [`ChangeKind`] and validated
//! into a [`FileChangeEvent`].

use chrono::{DateTime, Utc};
use filesync_sync_types::{
    ChangeKind, DeviceId, FileChangeEvent, FileEvent, FileId, StorageEvent, SyncError, UserId,
};
use serde_json::{Map, Value};

/// Fields the fallback decoder knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    /// `event_type`
    EventType,
    /// `file_id`
    FileId,
    /// `user_id`
    UserId,
    /// `device_id`
    DeviceId,
    /// `version`
    Version,
    /// `file_name`
    FileName,
    /// `file_path`
    FilePath,
    /// `size`
    Size,
    /// `hash`
    Hash,
    /// `timestamp`
    Timestamp,
    /// `metadata`
    Metadata,
}

/// Accepted key names per field, first match wins.
pub const FIELD_TABLE: &[(EventField, &[&str])] = &[
    (EventField::EventType, &["event_type", "eventType"]),
    (EventField::FileId, &["file_id", "fileId"]),
    (EventField::UserId, &["user_id", "userId"]),
    (EventField::DeviceId, &["device_id", "deviceId"]),
    (EventField::Version, &["version"]),
    (EventField::FileName, &["file_name", "fileName"]),
    (EventField::FilePath, &["file_path", "filePath"]),
    (EventField::Size, &["size", "file_size", "fileSize"]),
    (EventField::Hash, &["hash", "file_hash", "fileHash"]),
    (EventField::Timestamp, &["timestamp", "createdAt", "occurredAt"]),
    (EventField::Metadata, &["metadata"]),
];

fn names_for(field: EventField) -> &'static [&'static str] {
    FIELD_TABLE
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

fn lookup<'a>(map: &'a Map<String, Value>, field: EventField) -> Option<&'a Value> {
    names_for(field).iter().find_map(|name| map.get(*name))
}

fn string_field(map: &Map<String, Value>, field: EventField) -> Option<String> {
    names_for(field)
        .iter()
        .find_map(|name| map.get(*name).and_then(Value::as_str))
        .map(str::to_string)
}

fn int_field(map: &Map<String, Value>, field: EventField) -> Option<i64> {
    match lookup(map, field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Epoch values above this are taken as milliseconds, below as seconds.
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

fn time_field(map: &Map<String, Value>, field: EventField) -> Option<DateTime<Utc>> {
    match lookup(map, field)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let micros = if raw.abs() >= MILLIS_THRESHOLD {
                raw * 1_000.0
            } else {
                raw * 1_000_000.0
            };
            DateTime::<Utc>::from_timestamp_micros(micros as i64)
        }
        _ => None,
    }
}

/// A file event after the first decoding step.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFileEvent {
    /// Payload matched the strict shape.
    Typed(FileEvent),
    /// Payload was a JSON object of some other shape.
    Generic(Map<String, Value>),
}

impl DecodedFileEvent {
    /// Collapse into a [`FileEvent`], extracting fields from a generic
    /// object through [`FIELD_TABLE`]. Missing keys become empty values.
    pub fn into_file_event(self) -> FileEvent {
        match self {
            DecodedFileEvent::Typed(event) => event,
            DecodedFileEvent::Generic(map) => FileEvent {
                event_type: string_field(&map, EventField::EventType).unwrap_or_default(),
                file_id: string_field(&map, EventField::FileId).unwrap_or_default(),
                user_id: string_field(&map, EventField::UserId).unwrap_or_default(),
                device_id: string_field(&map, EventField::DeviceId),
                version: int_field(&map, EventField::Version)
                    .and_then(|v| i32::try_from(v).ok())
                    .unwrap_or_default(),
                file_name: string_field(&map, EventField::FileName).unwrap_or_default(),
                file_path: string_field(&map, EventField::FilePath).unwrap_or_default(),
                size: int_field(&map, EventField::Size).unwrap_or_default(),
                hash: string_field(&map, EventField::Hash).unwrap_or_default(),
                timestamp: time_field(&map, EventField::Timestamp),
                metadata: lookup(&map, EventField::Metadata)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            },
        }
    }

    /// Whether the strict decode succeeded.
    pub fn is_typed(&self) -> bool {
        matches!(self, DecodedFileEvent::Typed(_))
    }
}

/// Decode a file event payload, falling back to a generic object.
///
/// Fails with [`SyncError::DecodeFailure`] only when the payload is not a
/// JSON object at all.
pub fn decode_file_event(payload: &[u8]) -> Result<DecodedFileEvent, SyncError> {
    match serde_json::from_slice::<FileEvent>(payload) {
        Ok(event) => Ok(DecodedFileEvent::Typed(event)),
        Err(strict) => serde_json::from_slice::<Map<String, Value>>(payload)
            .map(DecodedFileEvent::Generic)
            .map_err(|fallback| {
                SyncError::DecodeFailure(format!("strict: {strict}; fallback: {fallback}"))
            }),
    }
}

/// Decode a storage event payload (strict only).
pub fn decode_storage_event(payload: &[u8]) -> Result<StorageEvent, SyncError> {
    serde_json::from_slice(payload).map_err(|e| SyncError::DecodeFailure(e.to_string()))
}

/// Map an upstream event type onto a change kind.
///
/// | upstream                                         | kind    |
/// |--------------------------------------------------|---------|
/// | file.created, file.uploaded, FILE_UPLOADED, created | created |
/// | file.updated, file.modified, updated             | updated |
/// | file.deleted, FILE_DELETED, deleted              | deleted |
/// | anything else                                    | updated |
pub fn change_kind_for(event_type: &str) -> ChangeKind {
    match event_type {
        "file.created" | "file.uploaded" | "FILE_UPLOADED" | "created" => ChangeKind::Created,
        "file.updated" | "file.modified" | "updated" => ChangeKind::Updated,
        "file.deleted" | "FILE_DELETED" | "deleted" => ChangeKind::Deleted,
        _ => ChangeKind::Updated,
    }
}

/// Validate and normalize a decoded file event.
///
/// `now` stands in for a missing timestamp. An unparseable device id is
/// dropped rather than failing the event; an unparseable user or file id
/// fails with [`SyncError::InvalidIdentifier`].
pub fn normalize_file_event(
    event: FileEvent,
    now: DateTime<Utc>,
) -> Result<FileChangeEvent, SyncError> {
    let file_id = FileId::parse(&event.file_id)?;
    let user_id = UserId::parse(&event.user_id)?;
    let device_id = event
        .device_id
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| DeviceId::parse(d).ok());

    let file_path = if event.file_path.is_empty() {
        event.file_name
    } else {
        event.file_path
    };

    Ok(FileChangeEvent {
        change_type: change_kind_for(&event.event_type),
        event_type: event.event_type,
        file_id,
        user_id,
        device_id,
        file_path,
        file_hash: event.hash,
        file_size: event.size,
        version: event.version,
        timestamp: event.timestamp.unwrap_or(now),
        metadata: event.metadata,
    })
}
