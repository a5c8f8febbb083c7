//! Connection status per open document.
//!
//! `disconnected → connecting → connected → syncing → synced`, with
//! `disconnected` reachable from anywhere on transport loss. Transitions are
//! driven by provider events only.

use std::fmt;
use std::time::Duration;

use web_time::Instant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Syncing,
    Synced,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
        }
    }

    /// Whether the transport socket is up.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Connected | Self::Syncing | Self::Synced)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    ConnectRequested,
    Open,
    SyncStarted,
    Synced,
    Close,
    Error,
}

/// Status of one document's connection, with the history of accepted
/// transitions.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStateMachine {
    status: ConnectionStatus,
    last_transition: Option<Instant>,
    history: Vec<ConnectionStatus>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// When the last accepted transition happened.
    pub fn last_transition(&self) -> Option<Instant> {
        self.last_transition
    }

    /// Every status entered so far, in order.
    pub fn history(&self) -> &[ConnectionStatus] {
        &self.history
    }

    /// Feed an event. Returns the new status if the event caused a
    /// transition; invalid events are ignored.
    pub fn handle(&mut self, event: StatusEvent, now: Instant) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;

        let next = match (self.status, event) {
            (Disconnected, StatusEvent::ConnectRequested) => Connecting,
            (Connecting, StatusEvent::Open) => Connected,
            (Connected | Synced, StatusEvent::SyncStarted) => Syncing,
            (Syncing, StatusEvent::Synced) => Synced,
            (Connecting | Connected | Syncing | Synced, StatusEvent::Close | StatusEvent::Error) => {
                Disconnected
            }
            (status, event) => {
                tracing::debug!(%status, ?event, "ignoring status event");
                return None;
            }
        };

        tracing::debug!(from = %self.status, to = %next, "connection status");
        self.status = next;
        self.last_transition = Some(now);
        self.history.push(next);
        Some(next)
    }
}

/// What the status badge shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadgeLabel {
    Status(ConnectionStatus),
    /// The last snapshot write failed.
    SaveError,
}

impl BadgeLabel {
    pub fn text(self) -> &'static str {
        match self {
            Self::Status(ConnectionStatus::Disconnected) => "Offline",
            Self::Status(ConnectionStatus::Connecting) => "Connecting",
            Self::Status(ConnectionStatus::Connected) => "Connected",
            Self::Status(ConnectionStatus::Syncing) => "Syncing",
            Self::Status(ConnectionStatus::Synced) => "Saved",
            Self::SaveError => "Error",
        }
    }
}

/// Transient badge, visible for a fixed window after the last change.
#[derive(Clone, Debug)]
pub struct StatusBadge {
    window: Duration,
    shown: Option<(BadgeLabel, Instant)>,
}

impl StatusBadge {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            shown: None,
        }
    }

    /// Show `label`, restarting the display window.
    pub fn show(&mut self, label: BadgeLabel, now: Instant) {
        self.shown = Some((label, now));
    }

    /// The label to render at `now`, if the badge is still up.
    pub fn visible(&self, now: Instant) -> Option<BadgeLabel> {
        let (label, since) = self.shown?;
        (now.saturating_duration_since(since) < self.window).then_some(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionStatus::*;

    #[test]
    fn test_full_connect_sequence() {
        let mut sm = ConnectionStateMachine::new();
        let now = Instant::now();
        assert_eq!(sm.status(), Disconnected);
        for event in [
            StatusEvent::ConnectRequested,
            StatusEvent::Open,
            StatusEvent::SyncStarted,
            StatusEvent::Synced,
        ] {
            assert!(sm.handle(event, now).is_some());
        }
        assert_eq!(sm.history(), &[Connecting, Connected, Syncing, Synced]);
    }

    #[test]
    fn test_drop_from_any_state() {
        let events = [
            StatusEvent::ConnectRequested,
            StatusEvent::Open,
            StatusEvent::SyncStarted,
            StatusEvent::Synced,
        ];
        for n in 1..=events.len() {
            let mut sm = ConnectionStateMachine::new();
            let now = Instant::now();
            for event in &events[..n] {
                sm.handle(*event, now);
            }
            assert_eq!(sm.handle(StatusEvent::Close, now), Some(Disconnected));
        }
    }

    #[test]
    fn test_invalid_events_are_ignored() {
        let mut sm = ConnectionStateMachine::new();
        let now = Instant::now();
        assert_eq!(sm.handle(StatusEvent::Open, now), None);
        assert_eq!(sm.handle(StatusEvent::Close, now), None);
        sm.handle(StatusEvent::ConnectRequested, now);
        assert_eq!(sm.handle(StatusEvent::Synced, now), None);
        assert_eq!(sm.status(), Connecting);
        assert_eq!(sm.history(), &[Connecting]);
    }

    #[test]
    fn test_badge_window_runs_from_last_show() {
        let mut badge = StatusBadge::new(Duration::from_millis(2500));
        let start = Instant::now();
        assert_eq!(badge.visible(start), None);

        badge.show(BadgeLabel::Status(Syncing), start);
        badge.show(BadgeLabel::Status(Synced), start + Duration::from_millis(100));
        let label = badge.visible(start + Duration::from_millis(2550));
        assert_eq!(label, Some(BadgeLabel::Status(Synced)));
        assert_eq!(label.map(BadgeLabel::text), Some("Saved"));
        assert_eq!(badge.visible(start + Duration::from_millis(2600)), None);
    }
}
