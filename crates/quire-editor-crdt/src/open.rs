//! One open document: replica, transport, presence, status and autosave.
//!
//! `OpenDocument` is the replicated [`EditorHandle`]. Every accepted edit is
//! written to the CRDT, broadcast, and re-arms the autosave timer. Provider
//! events are fed in through [`OpenDocument::handle_event`]; timers advance in
//! [`OpenDocument::tick`]. Nothing here blocks or spawns.

use std::time::Duration;

use quire_common::transport::{
    CollabMessage, PresenceSnapshot, PresenceTracker, PresenceUpdate, ProviderEvent,
    TransportProvider,
};
use quire_editor_core::{
    Direction, Document, DocumentEdit, EditorAction, EditorHandle, EditorKey, EditorSelection,
    HardBreakLayout, NavigationController, Range, SchemaViolation, execute_action,
};
use loro::ContainerID;
use smol_str::SmolStr;
use web_time::Instant;

use crate::config::EditorConfig;
use crate::persistence::{self, Debouncer, SnapshotStore};
use crate::presence::PresenceChannel;
use crate::replica::ReplicatedDocument;
use crate::status::{BadgeLabel, ConnectionStateMachine, ConnectionStatus, StatusBadge, StatusEvent};
use crate::CrdtError;

/// Result of an intercepted key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// `true` suppresses the host's default handling.
    pub handled: bool,
    pub scroll_into_view: bool,
}

pub struct OpenDocument {
    id: SmolStr,
    auth_token: Option<SmolStr>,
    replica: ReplicatedDocument,
    selection: EditorSelection,
    provider: Box<dyn TransportProvider>,
    status: ConnectionStateMachine,
    badge: StatusBadge,
    outgoing: PresenceChannel,
    remote: PresenceTracker,
    autosave: Debouncer,
    navigation: NavigationController<HardBreakLayout>,
    liveness: Duration,
    /// Latest time the host passed in; edits made between calls use it.
    clock: Instant,
    /// When our presence last went out.
    last_announce: Option<Instant>,
    /// Top-level blocks changed by remote merges since the host last asked.
    changed_blocks: Vec<ContainerID>,
}

impl OpenDocument {
    pub fn new(
        id: impl Into<SmolStr>,
        replica: ReplicatedDocument,
        selection: EditorSelection,
        provider: Box<dyn TransportProvider>,
        config: &EditorConfig,
        now: Instant,
    ) -> Self {
        let outgoing = PresenceChannel::new(
            replica.session_id(),
            config.display_name.clone(),
            config.color,
        );
        Self {
            id: id.into(),
            auth_token: None,
            replica,
            selection,
            provider,
            status: ConnectionStateMachine::new(),
            badge: StatusBadge::new(config.status_badge()),
            outgoing,
            remote: PresenceTracker::new(),
            autosave: Debouncer::new(config.autosave_debounce()),
            navigation: NavigationController::new(HardBreakLayout),
            liveness: config.presence_liveness(),
            clock: now,
            last_announce: None,
            changed_blocks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn replica(&self) -> &ReplicatedDocument {
        &self.replica
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.status()
    }

    pub fn status_history(&self) -> &[ConnectionStatus] {
        self.status.history()
    }

    /// Badge to render at `now`, if any.
    pub fn badge(&self, now: Instant) -> Option<BadgeLabel> {
        self.badge.visible(now)
    }

    pub fn presence(&self) -> PresenceSnapshot {
        self.remote.snapshot()
    }

    pub fn autosave_pending(&self) -> bool {
        self.autosave.is_armed()
    }

    /// Blocks to re-render after remote changes, in the order they changed.
    /// [`ReplicatedDocument::block_index`] maps them to root positions.
    pub fn take_changed_blocks(&mut self) -> Vec<ContainerID> {
        std::mem::take(&mut self.changed_blocks)
    }

    // === Input ===

    /// Run a semantic action against this document.
    pub fn execute(&mut self, action: &EditorAction) -> Result<bool, SchemaViolation> {
        execute_action(self, action)
    }

    /// Handle a key the host intercepts before its default behaviour.
    pub fn handle_key(&mut self, key: EditorKey) -> KeyOutcome {
        let direction = match key {
            EditorKey::ArrowUp => Direction::Up,
            EditorKey::ArrowDown => Direction::Down,
            EditorKey::Enter => return self.handle_enter(),
        };
        let outcome = self
            .navigation
            .handle(self.replica.document(), &self.selection, direction);
        if let Some(selection) = outcome.selection {
            self.set_selection(selection);
        }
        KeyOutcome {
            handled: outcome.handled,
            scroll_into_view: outcome.scroll_into_view,
        }
    }

    fn handle_enter(&mut self) -> KeyOutcome {
        let range = match &self.selection {
            EditorSelection::Text(sel) => Range::from(*sel),
            EditorSelection::Node(_) => {
                let (pos, _) = self.replica.document().selection_positions(&self.selection);
                Range::caret(pos)
            }
        };
        let handled = match execute_action(self, &EditorAction::SplitBlock { range }) {
            Ok(handled) => handled,
            Err(violation) => {
                tracing::debug!(%violation, "enter rejected by schema");
                true
            }
        };
        KeyOutcome {
            handled,
            scroll_into_view: handled,
        }
    }

    // === Transport ===

    /// Start (or restart) the connection for this document. A live
    /// connection is closed first, so the status walks through
    /// `disconnected` again.
    pub fn connect(&mut self, auth_token: Option<&str>, now: Instant) {
        self.advance(now);
        if self.status.status() != ConnectionStatus::Disconnected {
            tracing::debug!(document = %self.id, status = %self.status.status(), "dropping live connection");
            self.provider.disconnect();
            self.transition(StatusEvent::Close, now);
            self.remote.clear();
        }
        self.auth_token = auth_token.map(SmolStr::from);
        self.transition(StatusEvent::ConnectRequested, now);
        self.provider.connect(&self.id, auth_token);
    }

    /// Reconnect with the token given to the last [`connect`](Self::connect).
    pub fn reconnect(&mut self, now: Instant) {
        let token = self.auth_token.clone();
        self.connect(token.as_deref(), now);
    }

    /// Drain every event the provider has ready. Returns how many were
    /// handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Some(event) = self.provider.try_next_event() {
            if let Err(e) = self.handle_event(event, now) {
                tracing::warn!(document = %self.id, error = %e, "failed to handle provider event");
            }
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: ProviderEvent, now: Instant) -> Result<(), CrdtError> {
        self.advance(now);
        match event {
            ProviderEvent::Open => {
                self.transition(StatusEvent::Open, now);
                self.provider.send(CollabMessage::SyncRequest {
                    have_version: self.replica.encoded_version(),
                });
                self.transition(StatusEvent::SyncStarted, now);
            }
            ProviderEvent::Synced => {
                if self.transition(StatusEvent::Synced, now).is_some() {
                    self.resend_unsynced()?;
                    let (anchor, head) = self.replica.document().selection_positions(&self.selection);
                    self.outgoing.announce(anchor, head);
                }
            }
            ProviderEvent::Close => {
                self.transition(StatusEvent::Close, now);
                self.remote.clear();
            }
            ProviderEvent::Error(e) => {
                tracing::warn!(document = %self.id, error = %e, "transport error");
                self.transition(StatusEvent::Error, now);
                self.remote.clear();
            }
            ProviderEvent::Message(message) => self.handle_message(message, now)?,
        }
        Ok(())
    }

    fn handle_message(&mut self, message: CollabMessage, now: Instant) -> Result<(), CrdtError> {
        match message {
            CollabMessage::CrdtUpdate { data, .. } | CollabMessage::SyncResponse { data, .. } => {
                self.merge(&data)?;
            }
            CollabMessage::Presence {
                session_id,
                display_name,
                color,
                anchor,
                head,
                clock,
            } => {
                if session_id != self.replica.session_id() {
                    self.remote.apply(
                        PresenceUpdate {
                            session_id,
                            display_name,
                            color,
                            anchor,
                            head,
                            clock,
                        },
                        now,
                    );
                }
            }
            CollabMessage::Leave { session_id } => {
                self.remote.remove(session_id);
            }
            CollabMessage::SyncRequest { have_version } => {
                if let Some(data) = self.replica.updates_for(&have_version)? {
                    self.provider.send(CollabMessage::SyncResponse {
                        data,
                        is_snapshot: false,
                    });
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, data: &[u8]) -> Result<(), CrdtError> {
        let stable = self.replica.stabilize(&self.selection);
        let (anchor, head) = self.replica.document().selection_positions(&self.selection);

        let outcome = self.replica.merge_remote(data)?;
        if outcome.is_noop() {
            return Ok(());
        }

        let selection = stable
            .and_then(|s| self.replica.resolve(&s))
            .unwrap_or_else(|| self.replica.document().restore_selection(anchor, head));
        if selection != self.selection {
            self.set_selection(selection);
        }

        self.changed_blocks
            .retain(|id| !outcome.removed_blocks.contains(id) && !outcome.changed_blocks.contains(id));
        self.changed_blocks.extend(outcome.changed_blocks);

        if let Some(update) = outcome.repair_update {
            self.autosave.notify(self.clock);
            self.broadcast(update);
        }
        Ok(())
    }

    fn broadcast(&mut self, data: Vec<u8>) {
        if !self.provider.is_connected() {
            return;
        }
        self.provider.send(CollabMessage::CrdtUpdate {
            data,
            version: self.replica.encoded_version(),
        });
        if self.status.status() == ConnectionStatus::Synced {
            self.replica.mark_synced();
        }
    }

    /// After a catch-up, send what peers may have missed while we were
    /// offline or still syncing.
    fn resend_unsynced(&mut self) -> Result<(), CrdtError> {
        if let Some(data) = self.replica.unsynced_updates()? {
            tracing::debug!(document = %self.id, bytes = data.len(), "resending unsynced updates");
            self.provider.send(CollabMessage::CrdtUpdate {
                data,
                version: self.replica.encoded_version(),
            });
        }
        self.replica.mark_synced();
        Ok(())
    }

    fn advance(&mut self, now: Instant) {
        self.clock = self.clock.max(now);
    }

    fn transition(&mut self, event: StatusEvent, now: Instant) -> Option<ConnectionStatus> {
        let next = self.status.handle(event, now)?;
        self.badge.show(BadgeLabel::Status(next), now);
        Some(next)
    }

    // === Timers ===

    /// Send the coalesced presence update for this frame, if any.
    pub fn on_animation_frame(&mut self) {
        if let Some(message) = self.outgoing.on_animation_frame() {
            if self.provider.is_connected() {
                self.provider.send(message);
                self.last_announce = Some(self.clock);
            }
        }
    }

    /// Peers forget a session after `liveness` of silence, so an idle
    /// session repeats its selection well inside that window.
    fn keep_presence_alive(&mut self, now: Instant) {
        if self.status.status() != ConnectionStatus::Synced {
            return;
        }
        let interval = self.liveness / 3;
        if self
            .last_announce
            .is_none_or(|at| now.saturating_duration_since(at) >= interval)
        {
            let (anchor, head) = self.replica.document().selection_positions(&self.selection);
            self.outgoing.announce(anchor, head);
        }
    }

    /// Advance timers: autosave, presence liveness and the presence frame.
    pub fn tick(&mut self, store: &dyn SnapshotStore, now: Instant) {
        self.advance(now);
        if self.autosave.poll(now) {
            self.flush_snapshot(store, now);
        }
        let pruned = self.remote.prune_stale(now, self.liveness);
        if !pruned.is_empty() {
            tracing::debug!(document = %self.id, ?pruned, "pruned silent sessions");
        }
        self.keep_presence_alive(now);
        self.on_animation_frame();
    }

    /// Capture and write a snapshot now. Returns whether the write succeeded.
    pub fn flush_snapshot(&mut self, store: &dyn SnapshotStore, now: Instant) -> bool {
        self.advance(now);
        let crdt = match self.replica.export_snapshot() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "saving without CRDT history");
                None
            }
        };
        let document = self.replica.document();
        let result = persistence::capture(&self.id, document, &self.selection, crdt.as_deref())
            .and_then(|snapshot| persistence::write(store, &snapshot).map(|()| snapshot));
        match result {
            Ok(snapshot) => {
                self.selection = snapshot.selection_in(document);
                true
            }
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "snapshot write failed");
                self.badge.show(BadgeLabel::SaveError, now);
                false
            }
        }
    }

    /// Flush a pending autosave, say goodbye and drop the connection.
    pub fn close(&mut self, store: &dyn SnapshotStore, now: Instant) {
        if self.autosave.close() {
            self.flush_snapshot(store, now);
        }
        if self.provider.is_connected() {
            self.provider.send(self.outgoing.leave());
        }
        self.provider.disconnect();
        self.transition(StatusEvent::Close, now);
        self.remote.clear();
    }
}

impl EditorHandle for OpenDocument {
    fn document(&self) -> &Document {
        self.replica.document()
    }

    fn selection(&self) -> &EditorSelection {
        &self.selection
    }

    fn set_selection(&mut self, selection: EditorSelection) {
        let (anchor, head) = self.replica.document().selection_positions(&selection);
        self.outgoing.set_local_selection(anchor, head);
        self.selection = selection;
    }

    fn apply(&mut self, edit: DocumentEdit) -> Result<(), SchemaViolation> {
        match self.replica.apply_local_edit(&edit) {
            Ok(update) => {
                self.autosave.notify(self.clock);
                self.broadcast(update);
                Ok(())
            }
            Err(CrdtError::Schema(violation)) => Err(violation),
            Err(e) => {
                tracing::error!(document = %self.id, error = %e, "failed to write edit to CRDT");
                Err(SchemaViolation::InvalidPath(edit.target().as_slice().to_vec()))
            }
        }
    }
}

impl std::fmt::Debug for OpenDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenDocument")
            .field("id", &self.id)
            .field("status", &self.status.status())
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}
