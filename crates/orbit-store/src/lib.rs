//! Orbit Store — the append-only SQLite event store (§4.7).
//!
//! Owns the relay's single SQLite file and the forward-only migrations
//! that define its schema: `events`, `events_fts`, `thread_metadata`,
//! `upload_tokens`, `token_sessions`. [`EventStore`] provides the
//! event-replay operations; `orbit-auth` reaches the same database through
//! [`EventStore::pool`] to manage the token tables with its own query
//! logic, keeping one schema source of truth without coupling the two
//! crates' APIs together.

#![deny(unsafe_code)]

mod error;
mod event;
mod migrations;
mod store;

pub use error::{StoreError, StoreResult};
pub use event::{EventDirection, ExportFormat, NewEvent, ReadOptions, ReadOrder, StoredEvent};
pub use store::EventStore;
