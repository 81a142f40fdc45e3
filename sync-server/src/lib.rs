//! # filesync-sync-server
//!
//! Multi-device file synchronization server.
//!
//! This crate implements a server that:
//! - Registers devices and issues their sync credentials
//! - Keeps an append-only change log and hands each device the changes
//!   it has not seen, keyed by an opaque cursor
//! - Records version conflicts and their resolution
//! - Bridges upstream file events into the change log
//! - Fans sync and notification events out to live websocket sessions
//!
//! ## Architecture
//!
//! ```text
//!  upstream events ──► EventBridge ──► ChangeLog ──► outbound queue
//!                                        ▲                │
//!  HTTP /v1 ─────────────────────────────┘                ▼
//!                                                     Forwarder ──► Hub ──► /ws/sync
//!        ┌────────────────────────────┐
//!        │  SQLite (devices, changes, │
//!        │  sync state, conflicts)    │
//!        └────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changelog;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod events;
pub mod http;
pub mod hub;
pub mod limits;
pub mod maintenance;
pub mod registry;
pub mod server;
pub mod storage;
