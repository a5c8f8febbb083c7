//! Outgoing presence for the local session.
//!
//! Selection changes can arrive many times per frame while typing or
//! dragging. Only the latest one is kept, and at most one message goes out
//! per animation frame.

use quire_common::transport::CollabMessage;
use smol_str::SmolStr;

#[derive(Clone, Debug)]
pub struct PresenceChannel {
    session_id: u64,
    display_name: SmolStr,
    color: Option<u32>,
    clock: u64,
    pending: Option<(usize, usize)>,
    last_sent: Option<(usize, usize)>,
}

impl PresenceChannel {
    pub fn new(session_id: u64, display_name: SmolStr, color: Option<u32>) -> Self {
        Self {
            session_id,
            display_name,
            color,
            clock: 0,
            pending: None,
            last_sent: None,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Record the local selection, replacing any update not yet sent.
    pub fn set_local_selection(&mut self, anchor: usize, head: usize) {
        self.pending = Some((anchor, head));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the coalesced update for this frame.
    pub fn on_animation_frame(&mut self) -> Option<CollabMessage> {
        let (anchor, head) = self.pending.take()?;
        if self.last_sent == Some((anchor, head)) {
            return None;
        }
        self.last_sent = Some((anchor, head));
        self.clock += 1;
        Some(CollabMessage::Presence {
            session_id: self.session_id,
            display_name: self.display_name.clone(),
            color: self.color,
            anchor,
            head,
            clock: self.clock,
        })
    }

    /// Queue the last known selection again, e.g. after a reconnect, so
    /// peers that joined meanwhile see us.
    pub fn announce(&mut self, anchor: usize, head: usize) {
        self.last_sent = None;
        self.pending = Some((anchor, head));
    }

    pub fn leave(&self) -> CollabMessage {
        CollabMessage::Leave {
            session_id: self.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(msg: Option<CollabMessage>) -> Option<(usize, u64)> {
        match msg? {
            CollabMessage::Presence { head, clock, .. } => Some((head, clock)),
            _ => None,
        }
    }

    #[test]
    fn test_one_message_per_frame_with_latest_selection() {
        let mut channel = PresenceChannel::new(7, "Ada".into(), None);
        channel.set_local_selection(3, 3);
        channel.set_local_selection(4, 4);
        channel.set_local_selection(5, 5);

        assert_eq!(head_of(channel.on_animation_frame()), Some((5, 1)));
        assert_eq!(channel.on_animation_frame(), None);

        channel.set_local_selection(6, 6);
        assert_eq!(head_of(channel.on_animation_frame()), Some((6, 2)));
    }

    #[test]
    fn test_unchanged_selection_is_not_resent() {
        let mut channel = PresenceChannel::new(7, "Ada".into(), None);
        channel.set_local_selection(3, 3);
        channel.on_animation_frame();
        channel.set_local_selection(3, 3);
        assert_eq!(channel.on_animation_frame(), None);

        channel.announce(3, 3);
        assert_eq!(head_of(channel.on_animation_frame()), Some((3, 2)));
    }
}
