//! Real-time collaboration transport layer.
//!
//! - `CollabMessage`: wire protocol for CRDT updates, catch-up and presence
//! - `TransportProvider` / `TransportFactory`: the per-document connection
//!   contract the editor drives
//! - `MemoryHub`: in-process relay implementing that contract
//! - `PresenceTracker`: remote sessions and their selections

mod memory;
mod messages;
mod presence;
mod presence_types;
mod provider;
mod topic;

pub use memory::{Compactor, MemoryHub, MemoryProvider};
pub use messages::CollabMessage;
pub use presence::{COLLABORATOR_COLORS, PresenceTracker, PresenceUpdate, RemoteSession};
pub use presence_types::{PresenceSnapshot, SessionInfo};
pub use provider::{ProviderEvent, TransportError, TransportFactory, TransportProvider};
pub use topic::TopicId;
