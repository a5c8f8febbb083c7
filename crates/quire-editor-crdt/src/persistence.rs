//! Debounced snapshots of open documents.
//!
//! Every local content change (re)arms a [`Debouncer`]. When it fires, the
//! current tree and selection are captured into a [`PersistedSnapshot`] and
//! handed to a [`SnapshotStore`]. Stores own their retry policy; a failed
//! write is logged and surfaced as a badge, never retried here.
//!
//! Snapshots carry both the human-readable tree (for debugging and
//! fallback) and the base64-encoded CRDT snapshot (so history survives a
//! restart).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use quire_editor_core::{Document, DocumentLoadError, EditorSelection};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error on {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("snapshot CRDT payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("snapshot tree is invalid: {0}")]
    Load(#[from] DocumentLoadError),

    #[error("snapshot store rejected the write: {0}")]
    Store(String),
}

/// Trailing-edge debounce timer driven by the host event loop.
#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
    closed: bool,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            closed: false,
        }
    }

    /// Start or restart the timer. Returns `false` once closed.
    pub fn notify(&mut self, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    /// `true` exactly once when the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Stop accepting notifications. Returns whether a timer was still
    /// pending, in which case the caller should flush now.
    pub fn close(&mut self) -> bool {
        self.closed = true;
        self.deadline.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// What gets written for one document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedSnapshot {
    pub document_id: SmolStr,

    /// The document tree as JSON.
    pub content_tree: String,

    /// Base64-encoded CRDT snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crdt_snapshot: Option<String>,

    /// Selection as linear positions at capture time
    #[serde(default)]
    pub selection_anchor: usize,
    #[serde(default)]
    pub selection_head: usize,

    pub saved_at: DateTime<Utc>,
}

impl PersistedSnapshot {
    /// Decoded CRDT snapshot bytes, if one was stored.
    pub fn crdt_bytes(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.crdt_snapshot
            .as_deref()
            .map(|s| BASE64.decode(s))
            .transpose()
            .map_err(Into::into)
    }

    /// The stored tree, validated.
    pub fn document(&self) -> Result<Document, PersistenceError> {
        Ok(Document::from_json(&self.content_tree)?)
    }

    /// The stored selection against `document`, clamped and snapped.
    pub fn selection_in(&self, document: &Document) -> EditorSelection {
        restore_selection(document, self.selection_anchor, self.selection_head)
    }
}

/// Capture the tree and selection of a document.
pub fn capture(
    document_id: &str,
    document: &Document,
    selection: &EditorSelection,
    crdt_snapshot: Option<&[u8]>,
) -> Result<PersistedSnapshot, PersistenceError> {
    let (anchor, head) = document.selection_positions(selection);
    Ok(PersistedSnapshot {
        document_id: document_id.into(),
        content_tree: document.to_json()?,
        crdt_snapshot: crdt_snapshot.filter(|b| !b.is_empty()).map(|b| BASE64.encode(b)),
        selection_anchor: anchor,
        selection_head: head,
        saved_at: Utc::now(),
    })
}

/// Hand a snapshot to the store.
pub fn write(store: &dyn SnapshotStore, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
    store.save(snapshot)?;
    tracing::debug!(
        document = %snapshot.document_id,
        bytes = snapshot.content_tree.len(),
        "snapshot written"
    );
    Ok(())
}

/// Reapply captured offsets to the current document: clamp to
/// `[0, size]`, then snap onto a valid caret (or node) position.
pub fn restore_selection(document: &Document, anchor: usize, head: usize) -> EditorSelection {
    document.restore_selection(anchor, head)
}

/// Durable storage for snapshots. Implementations own their retry policy.
pub trait SnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError>;

    fn load(&self, document_id: &str) -> Result<Option<PersistedSnapshot>, PersistenceError>;
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<Mutex<HashMap<SmolStr, PersistedSnapshot>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<Mutex<usize>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Store("store unavailable".into()));
        }
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.document_id.clone(), snapshot.clone());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn load(&self, document_id: &str) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned())
    }
}

/// One pretty-printed JSON file per document in a directory.
#[derive(Clone, Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name for a document. Ids are arbitrary strings, so hash them.
    pub fn path_for(&self, document_id: &str) -> PathBuf {
        let hash = quire_common::blake3::hash(document_id.as_bytes());
        self.dir.join(format!("{}.json", &hash.to_hex()[..32]))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |error| PersistenceError::Io {
        path: path.to_path_buf(),
        error,
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_for(&snapshot.document_id);
        let json = serde_json::to_string_pretty(snapshot)?;

        // write-then-rename so a crash never leaves half a snapshot
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_error(&path))?;
        Ok(())
    }

    fn load(&self, document_id: &str) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        let path = self.path_for(document_id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }
}
