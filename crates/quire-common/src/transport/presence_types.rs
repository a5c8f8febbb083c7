//! Presence types handed to the host for rendering.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A remote editing session for presence display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: u64,
    /// Display name for UI
    pub display_name: SmolStr,
    /// Assigned colour (RGBA)
    pub color: u32,
    /// Selection anchor (linear position)
    pub anchor: usize,
    /// Selection head (linear position)
    pub head: usize,
}

impl SessionInfo {
    pub fn is_caret(&self) -> bool {
        self.anchor == self.head
    }
}

/// All remote sessions of one document, ordered by session id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub sessions: Vec<SessionInfo>,
    /// Number of remote peers currently connected
    pub peer_count: usize,
}
