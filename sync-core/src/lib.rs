//! # sync-core
//!
//! Pure logic for the file sync service (no I/O, instant tests).
//!
//! ## Design Philosophy
//!
//! Every module here takes input and produces output without side
//! effects. The server crate performs the storage and network I/O and
//! calls into these functions for the decisions:
//! - [`cursor`]: opaque resumption tokens and pull batch assembly
//! - [`normalize`]: upstream file/storage event decoding and change-kind mapping
//! - [`conflict`]: pluggable conflict-detection policies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod cursor;
pub mod normalize;

pub use conflict::{ConflictCandidate, ConflictPolicy, DivergentVersion, NoDetection, PolicyKind};
pub use cursor::{PullBatch, SyncCursor};
pub use normalize::{
    change_kind_for, decode_file_event, decode_storage_event, normalize_file_event,
    DecodedFileEvent,
};
