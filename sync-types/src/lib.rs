//! # sync-types
//!
//! Shared types for the file sync service.
//!
//! This crate provides the foundational types used across all sync crates:
//! - [`UserId`], [`DeviceId`], [`FileId`], [`ConflictId`] - Identifier types
//! - [`Device`], [`ChangeLogEntry`], [`SyncState`], [`SyncConflict`] - Stored records
//! - [`FileEvent`], [`StorageEvent`], [`SyncEvent`] - Event payloads
//! - [`api`] - HTTP request/response bodies
//! - [`SyncError`] - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
mod error;
mod events;
mod ids;
mod models;

pub use error::SyncError;
pub use events::{
    FileChangeEvent, FileEvent, NotificationEvent, StorageEvent, SyncEvent, SyncEventType,
};
pub use ids::{ChangeId, ConflictId, DeviceId, FileId, SyncCredential, UserId};
pub use models::{
    log_precision, ChangeKind, ChangeLogEntry, ConflictStatus, Device, ResolutionType,
    SyncConflict, SyncState,
};
