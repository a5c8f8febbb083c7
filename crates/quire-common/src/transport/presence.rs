//! Presence tracking for collaborative editing sessions.
//!
//! Tracks remote sessions, their selections and display info. Updates are
//! ordered per session by a sender-side clock; the most recent wins.

use std::collections::HashMap;
use std::time::Duration;

use smol_str::SmolStr;
use web_time::Instant;

use super::presence_types::{PresenceSnapshot, SessionInfo};

/// One presence update as received from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceUpdate {
    pub session_id: u64,
    pub display_name: SmolStr,
    pub color: Option<u32>,
    pub anchor: usize,
    pub head: usize,
    pub clock: u64,
}

/// A remote session as tracked locally.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSession {
    pub session_id: u64,
    pub display_name: SmolStr,
    /// Assigned colour (RGBA).
    pub color: u32,
    pub anchor: usize,
    pub head: usize,
    /// Highest clock seen from this session.
    pub clock: u64,
    /// When this session was last heard from.
    pub updated_at: Instant,
}

/// Tracks all remote sessions of one document.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    sessions: HashMap<u64, RemoteSession>,
    /// Colour assignment counter.
    next_color_index: usize,
}

/// Predefined collaborator colours (pastel-ish for readability).
pub const COLLABORATOR_COLORS: [u32; 8] = [
    0xFF6B6BFF, // Red
    0x4ECDC4FF, // Teal
    0xFFE66DFF, // Yellow
    0x95E1D3FF, // Mint
    0xF38181FF, // Coral
    0xAA96DAFF, // Purple
    0xFCBF49FF, // Orange
    0x2EC4B6FF, // Cyan
];

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an update. Returns `false` if it was older than (or the same
    /// as) what we already have for that session.
    pub fn apply(&mut self, update: PresenceUpdate, now: Instant) -> bool {
        if let Some(existing) = self.sessions.get_mut(&update.session_id) {
            if update.clock <= existing.clock {
                tracing::trace!(
                    session = update.session_id,
                    clock = update.clock,
                    seen = existing.clock,
                    "dropping stale presence"
                );
                return false;
            }
            existing.display_name = update.display_name;
            if let Some(color) = update.color {
                existing.color = color;
            }
            existing.anchor = update.anchor;
            existing.head = update.head;
            existing.clock = update.clock;
            existing.updated_at = now;
            return true;
        }

        let color = match update.color {
            Some(color) => color,
            None => self.assign_color(),
        };
        tracing::debug!(session = update.session_id, name = %update.display_name, "session joined");
        self.sessions.insert(
            update.session_id,
            RemoteSession {
                session_id: update.session_id,
                display_name: update.display_name,
                color,
                anchor: update.anchor,
                head: update.head,
                clock: update.clock,
                updated_at: now,
            },
        );
        true
    }

    /// Remove a session when it leaves.
    pub fn remove(&mut self, session_id: u64) -> Option<RemoteSession> {
        self.sessions.remove(&session_id)
    }

    /// Forget everyone (transport closed).
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn get(&self, session_id: u64) -> Option<&RemoteSession> {
        self.sessions.get(&session_id)
    }

    pub fn contains(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions ordered by id.
    pub fn sessions(&self) -> Vec<&RemoteSession> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.session_id);
        sessions
    }

    /// Drop sessions not heard from within `max_age`. Returns their ids.
    pub fn prune_stale(&mut self, now: Instant, max_age: Duration) -> Vec<u64> {
        let mut pruned = Vec::new();
        self.sessions.retain(|id, session| {
            let alive = now.saturating_duration_since(session.updated_at) <= max_age;
            if !alive {
                pruned.push(*id);
            }
            alive
        });
        if !pruned.is_empty() {
            tracing::debug!(?pruned, "pruned stale sessions");
        }
        pruned
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        let sessions: Vec<SessionInfo> = self
            .sessions()
            .into_iter()
            .map(|s| SessionInfo {
                session_id: s.session_id,
                display_name: s.display_name.clone(),
                color: s.color,
                anchor: s.anchor,
                head: s.head,
            })
            .collect();
        PresenceSnapshot {
            peer_count: sessions.len(),
            sessions,
        }
    }

    fn assign_color(&mut self) -> u32 {
        let color = COLLABORATOR_COLORS[self.next_color_index % COLLABORATOR_COLORS.len()];
        self.next_color_index += 1;
        color
    }
}
