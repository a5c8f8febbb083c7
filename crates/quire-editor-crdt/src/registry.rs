//! Coordinator for every open document of one editor instance.
//!
//! Holds exactly one [`OpenDocument`] (replica plus provider) per document
//! id. Opening an id that is already open tears the old one down first, so
//! a document never has two live connections from the same editor.

use std::collections::HashMap;

use quire_common::transport::{PresenceSnapshot, TransportFactory};
use quire_editor_core::{DocumentEdit, EditorHandle, EditorSelection, SnapDirection};
use smol_str::SmolStr;
use web_time::Instant;

use crate::config::EditorConfig;
use crate::open::OpenDocument;
use crate::persistence::{PersistedSnapshot, PersistenceError, SnapshotStore};
use crate::replica::{self, ReplicatedDocument};
use crate::status::{BadgeLabel, ConnectionStatus};
use crate::CrdtError;

pub struct DocumentRegistry {
    factory: Box<dyn TransportFactory>,
    store: Box<dyn SnapshotStore>,
    config: EditorConfig,
    documents: HashMap<SmolStr, OpenDocument>,
}

impl DocumentRegistry {
    pub fn new(
        factory: impl TransportFactory + 'static,
        store: impl SnapshotStore + 'static,
        config: EditorConfig,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            store: Box::new(store),
            config,
            documents: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Open a document, restoring the last snapshot if the store has one,
    /// and start connecting.
    pub fn open(
        &mut self,
        document_id: &str,
        auth_token: Option<&str>,
        now: Instant,
    ) -> Result<&mut OpenDocument, CrdtError> {
        if let Some(mut previous) = self.documents.remove(document_id) {
            tracing::debug!(document = document_id, "re-opening, tearing down previous session");
            previous.close(self.store.as_ref(), now);
        }

        let (replica, selection) = self.restore(document_id)?;
        let mut doc = OpenDocument::new(
            document_id,
            replica,
            selection,
            self.factory.create(),
            &self.config,
            now,
        );
        doc.connect(auth_token, now);
        Ok(self.documents.entry(document_id.into()).or_insert(doc))
    }

    fn restore(&self, document_id: &str) -> Result<(ReplicatedDocument, EditorSelection), CrdtError> {
        let session_id = replica::new_session_id();
        let restored = self
            .store
            .load(document_id)
            .and_then(|snapshot| snapshot.map(|s| restore_snapshot(session_id, &s)).transpose());
        match restored {
            Ok(Some(restored)) => return Ok(restored),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(document = document_id, error = %e, "ignoring unreadable snapshot");
            }
        }
        let replica = ReplicatedDocument::new(session_id)?;
        let selection = replica
            .document()
            .nearest_text_position(0, SnapDirection::Forward)
            .map(EditorSelection::caret)
            .unwrap_or_default();
        Ok((replica, selection))
    }

    /// Flush, leave and disconnect. Returns false if the id was not open.
    pub fn close(&mut self, document_id: &str, now: Instant) -> bool {
        match self.documents.remove(document_id) {
            Some(mut doc) => {
                doc.close(self.store.as_ref(), now);
                true
            }
            None => false,
        }
    }

    /// Close every open document.
    pub fn close_all(&mut self, now: Instant) {
        for (_, mut doc) in self.documents.drain() {
            doc.close(self.store.as_ref(), now);
        }
    }

    pub fn apply_local_edit(&mut self, document_id: &str, edit: DocumentEdit) -> Result<(), CrdtError> {
        Ok(self.require(document_id)?.apply(edit)?)
    }

    /// Drain provider events for one document.
    pub fn pump(&mut self, document_id: &str, now: Instant) -> Result<usize, CrdtError> {
        Ok(self.require(document_id)?.pump(now))
    }

    /// Drain provider events for every document.
    pub fn pump_all(&mut self, now: Instant) -> usize {
        self.documents.values_mut().map(|doc| doc.pump(now)).sum()
    }

    /// Advance the timers of every open document.
    pub fn tick(&mut self, now: Instant) {
        for doc in self.documents.values_mut() {
            doc.tick(self.store.as_ref(), now);
        }
    }

    /// Reconnect a document. A live connection is dropped first.
    pub fn reconnect(&mut self, document_id: &str, now: Instant) -> Result<(), CrdtError> {
        self.require(document_id)?.reconnect(now);
        Ok(())
    }

    pub fn status(&self, document_id: &str) -> Option<ConnectionStatus> {
        self.documents.get(document_id).map(OpenDocument::status)
    }

    pub fn presence(&self, document_id: &str) -> Option<PresenceSnapshot> {
        self.documents.get(document_id).map(OpenDocument::presence)
    }

    pub fn badge(&self, document_id: &str, now: Instant) -> Option<BadgeLabel> {
        self.documents.get(document_id)?.badge(now)
    }

    pub fn get(&self, document_id: &str) -> Option<&OpenDocument> {
        self.documents.get(document_id)
    }

    pub fn get_mut(&mut self, document_id: &str) -> Option<&mut OpenDocument> {
        self.documents.get_mut(document_id)
    }

    pub fn is_open(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn require(&mut self, document_id: &str) -> Result<&mut OpenDocument, CrdtError> {
        self.documents
            .get_mut(document_id)
            .ok_or_else(|| CrdtError::UnknownDocument(document_id.into()))
    }
}

/// Rebuild a replica and selection from a stored snapshot. Prefers the CRDT
/// history; falls back to the plain tree.
fn restore_snapshot(
    session_id: u64,
    snapshot: &PersistedSnapshot,
) -> Result<(ReplicatedDocument, EditorSelection), PersistenceError> {
    let replica = match snapshot.crdt_bytes()? {
        Some(bytes) => ReplicatedDocument::from_snapshot(session_id, &bytes),
        None => ReplicatedDocument::from_document(session_id, &snapshot.document()?),
    }
    .map_err(|e| PersistenceError::Store(e.to_string()))?;
    let selection = snapshot.selection_in(replica.document());
    Ok((replica, selection))
}
