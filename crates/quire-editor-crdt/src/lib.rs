//! Replicated documents for the quire editor.
//!
//! This crate provides:
//! - `ReplicatedDocument`: a Loro-backed document tree with a materialized view
//! - Post-merge schema repair
//! - `OpenDocument` and `DocumentRegistry`: one replica and one transport
//!   provider per open document
//! - Connection status, status badge and presence coalescing
//! - Debounced snapshot persistence and snapshot stores
//! - `EditorConfig`

pub mod config;
mod error;
mod open;
pub mod persistence;
pub mod presence;
mod registry;
pub mod repair;
pub mod replica;
pub mod status;

pub use config::{ConfigError, EditorConfig};
pub use error::CrdtError;
pub use open::{KeyOutcome, OpenDocument};
pub use persistence::{
    Debouncer, FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, PersistenceError,
    SnapshotStore,
};
pub use presence::PresenceChannel;
pub use registry::DocumentRegistry;
pub use replica::{MergeOutcome, ReplicatedDocument, StableSelection};
pub use status::{BadgeLabel, ConnectionStatus, StatusBadge, StatusEvent};

// Re-export Loro types that consumers need
pub use loro::{ContainerID, ExportMode, LoroDoc, VersionVector};
