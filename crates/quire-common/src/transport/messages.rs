//! Wire protocol for collaborative editing messages.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Messages exchanged between replicas of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollabMessage {
    /// Loro CRDT update - incremental changes
    CrdtUpdate {
        /// Serialized Loro update bytes
        data: Vec<u8>,
        /// Encoded version vector of the sender after this update
        version: Vec<u8>,
    },

    /// Cursor and identity of one editing session (awareness)
    Presence {
        /// Session id, also the sender's CRDT peer id
        session_id: u64,
        /// Display name for presence UI
        display_name: SmolStr,
        /// Colour chosen by the sender (RGBA), if any
        color: Option<u32>,
        /// Selection anchor (linear position)
        anchor: usize,
        /// Selection head (linear position)
        head: usize,
        /// Per-session counter; higher wins
        clock: u64,
    },

    /// Session closed the document
    Leave {
        /// Session id of the leaving editor
        session_id: u64,
    },

    /// Request the updates we are missing (on open and reconnect)
    SyncRequest {
        /// Encoded version vector of what we already have
        have_version: Vec<u8>,
    },

    /// Response to sync request
    SyncResponse {
        /// Loro update/snapshot bytes
        data: Vec<u8>,
        /// True if this is a full snapshot, false if incremental
        is_snapshot: bool,
    },
}

impl CollabMessage {
    /// Serialize message to postcard bytes for wire transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    /// Deserialize message from postcard bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CrdtUpdate { .. } => "crdt_update",
            Self::Presence { .. } => "presence",
            Self::Leave { .. } => "leave",
            Self::SyncRequest { .. } => "sync_request",
            Self::SyncResponse { .. } => "sync_response",
        }
    }
}
