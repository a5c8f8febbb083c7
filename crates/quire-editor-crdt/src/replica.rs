//! Loro-backed replicated document.
//!
//! The tree lives in a root list `blocks`. Each node is a map
//! `{type, attrs, text?, children?}` where `text` is a `LoroText` for
//! text-bearing nodes and `children` a nested `LoroList` for containers.
//!
//! Alongside the CRDT the replica keeps a materialized [`Document`]. Local
//! edits are validated against it before they are written. A root
//! subscription records which top-level blocks each commit or import touched,
//! and only those blocks are read back into the view; untouched blocks keep
//! their materialized nodes.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use loro::cursor::{Cursor, Side};
use loro::event::DiffEvent;
use loro::{
    Container, ContainerID, ContainerTrait, ExportMode, LoroDoc, LoroList, LoroMap, LoroText,
    LoroValue, Subscription, ValueOrContainer, VersionVector,
};
use quire_editor_core::{
    AttrValue, Attrs, ContentKind, Document, DocumentEdit, EditorSelection, Node, NodeContent,
    NodePath, NodeType, Selection,
};
use smol_str::SmolStr;

use crate::CrdtError;
use crate::repair;

const BLOCKS: &str = "blocks";
const TYPE: &str = "type";
const ATTRS: &str = "attrs";
const TEXT: &str = "text";
const CHILDREN: &str = "children";

/// Author of the seed content every replica starts from.
const GENESIS_PEER: u64 = 0;

/// Upper bound on corrective edits after one merge.
const MAX_REPAIRS: usize = 256;

/// Result of merging a remote update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Top-level blocks that are new or whose subtree was touched, in
    /// document order.
    pub changed_blocks: Vec<ContainerID>,
    /// Top-level blocks that no longer exist.
    pub removed_blocks: Vec<ContainerID>,
    /// Corrective edits made after the merge, to broadcast like local edits.
    pub repair_update: Option<Vec<u8>>,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed_blocks.is_empty()
            && self.removed_blocks.is_empty()
            && self.repair_update.is_none()
    }
}

/// Block-level changes found while settling the view.
#[derive(Debug, Default)]
struct Settled {
    repairs: usize,
    changed: Vec<ContainerID>,
    removed: Vec<ContainerID>,
}

/// Top-level block containers touched by commits and imports since the
/// last refresh.
type Touched = Arc<Mutex<HashSet<ContainerID>>>;

fn watch_blocks(doc: &LoroDoc) -> (Subscription, Touched) {
    let touched: Touched = Arc::default();
    let sink = Arc::clone(&touched);
    let subscription = doc.subscribe_root(Arc::new(move |event: DiffEvent<'_>| {
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        for diff in &event.events {
            // [(blocks, "blocks"), (block map, index), ...]
            if let Some((block, _)) = diff.path.get(1) {
                sink.insert(block.clone());
            }
        }
    }));
    (subscription, touched)
}

/// A selection pinned to CRDT identities instead of linear positions, so it
/// survives remote edits before it.
#[derive(Clone, Debug)]
pub enum StableSelection {
    Text { anchor: Cursor, head: Cursor },
    Node(ContainerID),
}

/// Random peer id for a new editing session. Never the genesis peer.
pub fn new_session_id() -> u64 {
    rand::random_range(1..u64::MAX)
}

/// Fold a run of updates into one snapshot carrying the same history, e.g.
/// for a relay's stored backlog.
pub fn compact_updates(updates: &[Vec<u8>]) -> Result<Vec<u8>, CrdtError> {
    let doc = LoroDoc::new();
    doc.import_batch(updates)
        .map_err(|e| CrdtError::Import(e.to_string()))?;
    doc.export(ExportMode::Snapshot)
        .map_err(|e| CrdtError::Export(e.to_string()))
}

/// The seed change: an empty title and an empty paragraph authored by
/// [`GENESIS_PEER`].
///
/// Every replica imports the same bytes, so seeding is idempotent and two
/// replicas that both start a document offline still converge.
fn genesis() -> Result<Vec<u8>, CrdtError> {
    let doc = LoroDoc::new();
    doc.set_peer_id(GENESIS_PEER)?;
    let blocks = doc.get_list(BLOCKS);
    for (index, node) in Document::new().children().iter().enumerate() {
        write_node(&blocks, index, node)?;
    }
    doc.commit();
    doc.export(ExportMode::Updates {
        from: Cow::Owned(VersionVector::default()),
    })
    .map_err(|e| CrdtError::Export(e.to_string()))
}

/// One document replica: the Loro document plus its materialized view.
pub struct ReplicatedDocument {
    doc: LoroDoc,
    view: Document,
    /// Container id of each top-level block, parallel to the view's children.
    block_ids: Vec<ContainerID>,
    touched: Touched,
    _changes: Subscription,
    session_id: u64,
    /// Version at the time of the last successful broadcast.
    last_synced_version: Option<VersionVector>,
}

impl ReplicatedDocument {
    /// A fresh replica holding the seed document.
    pub fn new(session_id: u64) -> Result<Self, CrdtError> {
        let doc = LoroDoc::new();
        doc.set_peer_id(session_id)?;
        let (changes, touched) = watch_blocks(&doc);
        doc.import(&genesis()?)?;
        let mut replica = Self {
            doc,
            view: Document::new(),
            block_ids: Vec::new(),
            touched,
            _changes: changes,
            session_id,
            last_synced_version: None,
        };
        replica.settle()?;
        Ok(replica)
    }

    /// Restore a replica from a CRDT snapshot.
    pub fn from_snapshot(session_id: u64, snapshot: &[u8]) -> Result<Self, CrdtError> {
        let mut replica = Self::new(session_id)?;
        replica
            .doc
            .import(snapshot)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        replica.settle()?;
        Ok(replica)
    }

    /// Seed a replica with an existing tree (e.g. a snapshot saved without
    /// CRDT history). The tree is written as local edits on top of genesis.
    pub fn from_document(session_id: u64, document: &Document) -> Result<Self, CrdtError> {
        document.validate()?;
        let mut replica = Self::new(session_id)?;
        let blocks = replica.doc.get_list(BLOCKS);
        blocks.delete(0, blocks.len())?;
        for (index, node) in document.children().iter().enumerate() {
            write_node(&blocks, index, node)?;
        }
        replica.doc.commit();
        replica.settle()?;
        Ok(replica)
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The materialized tree.
    pub fn document(&self) -> &Document {
        &self.view
    }

    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    pub fn encoded_version(&self) -> Vec<u8> {
        self.doc.oplog_vv().encode()
    }

    /// Container id of the top-level block at `index`.
    pub fn block_id(&self, index: usize) -> Option<&ContainerID> {
        self.block_ids.get(index)
    }

    /// Current root index of a top-level block.
    pub fn block_index(&self, id: &ContainerID) -> Option<usize> {
        self.block_ids.iter().position(|b| b == id)
    }

    /// Validate an edit against the view, write it to the CRDT and return
    /// the update bytes to broadcast.
    pub fn apply_local_edit(&mut self, edit: &DocumentEdit) -> Result<Vec<u8>, CrdtError> {
        self.view.validate_edit(edit)?;
        let before = self.doc.oplog_vv();

        let written = write_edit(&self.doc, edit);
        // Part of a failed edit may have been written; trust the CRDT.
        self.doc.commit();
        self.settle()?;
        written?;

        self.export_from(&before)
    }

    /// Merge an update from another replica.
    ///
    /// Importing the same bytes twice is a no-op. Updates whose
    /// dependencies have not arrived yet are held by Loro until they do.
    pub fn merge_remote(&mut self, data: &[u8]) -> Result<MergeOutcome, CrdtError> {
        let before = self.doc.oplog_vv();
        self.doc
            .import(data)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        let merged = self.doc.oplog_vv();
        if merged == before {
            return Ok(MergeOutcome::default());
        }

        let settled = self.settle()?;
        let repair_update = if settled.repairs > 0 {
            tracing::debug!(repairs = settled.repairs, "repaired merged tree");
            Some(self.export_from(&merged)?)
        } else {
            None
        };

        Ok(MergeOutcome {
            changed_blocks: settled.changed,
            removed_blocks: settled.removed,
            repair_update,
        })
    }

    /// Export full snapshot bytes.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, CrdtError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Export(e.to_string()))
    }

    /// Export updates since the given version.
    ///
    /// Returns None if nothing changed since then.
    pub fn export_updates_since(&self, version: &VersionVector) -> Result<Option<Vec<u8>>, CrdtError> {
        if *version == self.doc.oplog_vv() {
            return Ok(None);
        }
        let updates = self.export_from(version)?;
        Ok((!updates.is_empty()).then_some(updates))
    }

    /// Updates for a peer that announced `have_version` (encoded).
    pub fn updates_for(&self, have_version: &[u8]) -> Result<Option<Vec<u8>>, CrdtError> {
        let version = if have_version.is_empty() {
            VersionVector::default()
        } else {
            VersionVector::decode(have_version).map_err(|e| CrdtError::Version(e.to_string()))?
        };
        self.export_updates_since(&version)
    }

    /// Everything not yet broadcast while connected.
    pub fn unsynced_updates(&self) -> Result<Option<Vec<u8>>, CrdtError> {
        match &self.last_synced_version {
            Some(version) => self.export_updates_since(version),
            None => self.export_updates_since(&VersionVector::default()),
        }
    }

    /// Mark current version as synced.
    pub fn mark_synced(&mut self) {
        self.last_synced_version = Some(self.doc.oplog_vv());
    }

    /// Check if there are changes since last sync.
    pub fn has_unsynced_changes(&self) -> bool {
        self.last_synced_version.as_ref() != Some(&self.doc.oplog_vv())
    }

    /// Pin a selection to CRDT identities.
    pub fn stabilize(&self, selection: &EditorSelection) -> Option<StableSelection> {
        match selection {
            EditorSelection::Text(sel) => Some(StableSelection::Text {
                anchor: self.cursor_at(sel.anchor)?,
                head: self.cursor_at(sel.head)?,
            }),
            EditorSelection::Node(path) => Some(StableSelection::Node(
                node_map(&self.doc, path).ok()?.id(),
            )),
        }
    }

    /// Resolve a pinned selection against the current tree.
    pub fn resolve(&self, stable: &StableSelection) -> Option<EditorSelection> {
        match stable {
            StableSelection::Text { anchor, head } => Some(EditorSelection::Text(Selection::new(
                self.cursor_position(anchor)?,
                self.cursor_position(head)?,
            ))),
            StableSelection::Node(id) => self
                .view
                .leaves()
                .into_iter()
                .filter(|l| l.is_atomic())
                .find(|l| node_map(&self.doc, &l.path).is_ok_and(|m| m.id() == *id))
                .map(|l| EditorSelection::Node(l.path)),
        }
    }

    fn cursor_at(&self, pos: usize) -> Option<Cursor> {
        let at = self.view.resolve_text(pos)?;
        text_of(&self.doc, &at.path)
            .ok()?
            .get_cursor(at.offset, Side::default())
    }

    fn cursor_position(&self, cursor: &Cursor) -> Option<usize> {
        let offset = self.doc.get_cursor_pos(cursor).ok()?.current.pos;
        let leaf = self.view.leaves().into_iter().find(|l| {
            !l.is_atomic() && text_of(&self.doc, &l.path).is_ok_and(|t| t.id() == cursor.container)
        })?;
        Some(leaf.content_start() + offset.min(leaf.text_len))
    }

    fn export_from(&self, from: &VersionVector) -> Result<Vec<u8>, CrdtError> {
        self.doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(from),
            })
            .map_err(|e| CrdtError::Export(e.to_string()))
    }

    /// Bring the view up to date with the CRDT, applying corrective edits
    /// until the tree is valid.
    fn settle(&mut self) -> Result<Settled, CrdtError> {
        let before: HashSet<ContainerID> = self.block_ids.iter().cloned().collect();
        let mut changed = HashSet::new();
        let mut repairs = 0;
        loop {
            let fix = match self.refresh(&mut changed)? {
                Some(CrdtError::Malformed { path, reason }) if repairs < MAX_REPAIRS => {
                    tracing::warn!(?path, reason, "dropping malformed node");
                    DocumentEdit::DeleteNode { path: path.into() }
                }
                Some(e) => return Err(e),
                None => match repair::next_fix(&self.view) {
                    Some(fix) if repairs < MAX_REPAIRS => fix,
                    Some(_) => {
                        tracing::warn!(repairs, "giving up on repairing merged tree");
                        break;
                    }
                    None => break,
                },
            };
            write_edit(&self.doc, &fix)?;
            self.doc.commit();
            repairs += 1;
        }

        let current: HashSet<&ContainerID> = self.block_ids.iter().collect();
        Ok(Settled {
            repairs,
            changed: self
                .block_ids
                .iter()
                .filter(|id| changed.contains(*id))
                .cloned()
                .collect(),
            removed: before
                .into_iter()
                .filter(|id| !current.contains(id))
                .collect(),
        })
    }

    /// Re-read touched and new top-level blocks; reuse every other node.
    ///
    /// A block that cannot be read is left out of the view and its error
    /// returned, so the caller can delete it.
    fn refresh(&mut self, changed: &mut HashSet<ContainerID>) -> Result<Option<CrdtError>, CrdtError> {
        let touched = std::mem::take(&mut *self.touched.lock().unwrap_or_else(PoisonError::into_inner));
        let mut previous: HashMap<ContainerID, Node> = std::mem::take(&mut self.block_ids)
            .into_iter()
            .zip(std::mem::take(&mut self.view).into_children())
            .collect();

        let list = self.doc.get_list(BLOCKS);
        let mut ids = Vec::with_capacity(list.len());
        let mut nodes = Vec::with_capacity(list.len());
        let mut failed = None;
        for index in 0..list.len() {
            let path = NodePath::root().child(index);
            let read = entry(&list, index, path.as_slice()).and_then(|map| {
                let id = map.id();
                match previous.remove(&id) {
                    Some(node) if !touched.contains(&id) => Ok((id, node)),
                    _ => {
                        let node = read_node(&map, &path)?;
                        changed.insert(id.clone());
                        Ok((id, node))
                    }
                }
            });
            match read {
                Ok((id, node)) => {
                    ids.push(id);
                    nodes.push(node);
                }
                Err(e @ CrdtError::Malformed { .. }) => {
                    failed.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        self.block_ids = ids;
        self.view = Document::from_nodes_unchecked(nodes);
        Ok(failed)
    }
}

impl std::fmt::Debug for ReplicatedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedDocument")
            .field("session_id", &self.session_id)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

fn malformed(path: &[usize], reason: &'static str) -> CrdtError {
    CrdtError::Malformed {
        path: path.to_vec(),
        reason,
    }
}

// === Writing ===

fn attr_to_loro(value: &AttrValue) -> LoroValue {
    match value {
        AttrValue::Null => LoroValue::Null,
        AttrValue::Bool(b) => LoroValue::from(*b),
        AttrValue::Int(i) => LoroValue::from(*i),
        AttrValue::Float(f) => LoroValue::from(*f),
        AttrValue::String(s) => LoroValue::from(s.as_str()),
    }
}

fn write_node(list: &LoroList, index: usize, node: &Node) -> Result<(), CrdtError> {
    let map = list.insert_container(index, LoroMap::new())?;
    map.insert(TYPE, node.node_type.as_str())?;
    let attrs = map.insert_container(ATTRS, LoroMap::new())?;
    for (key, value) in &node.attrs {
        attrs.insert(key.as_str(), attr_to_loro(value))?;
    }
    match &node.content {
        NodeContent::Text(t) => {
            let text = map.insert_container(TEXT, LoroText::new())?;
            if !t.is_empty() {
                text.insert(0, t)?;
            }
        }
        NodeContent::Children(children) => {
            let list = map.insert_container(CHILDREN, LoroList::new())?;
            for (i, child) in children.iter().enumerate() {
                write_node(&list, i, child)?;
            }
        }
        NodeContent::Atom => {}
    }
    Ok(())
}

fn entry(list: &LoroList, index: usize, path: &[usize]) -> Result<LoroMap, CrdtError> {
    match list.get(index) {
        Some(ValueOrContainer::Container(Container::Map(map))) => Ok(map),
        Some(_) => Err(malformed(path, "expected a node map")),
        None => Err(malformed(path, "index out of range")),
    }
}

fn children_list(map: &LoroMap, path: &[usize]) -> Result<LoroList, CrdtError> {
    match map.get(CHILDREN) {
        Some(ValueOrContainer::Container(Container::List(list))) => Ok(list),
        _ => Err(malformed(path, "node has no children list")),
    }
}

fn node_map(doc: &LoroDoc, path: &NodePath) -> Result<LoroMap, CrdtError> {
    let indices = path.as_slice();
    let (first, rest) = indices
        .split_first()
        .ok_or_else(|| malformed(indices, "the root is not a node"))?;
    let mut map = entry(&doc.get_list(BLOCKS), *first, &indices[..1])?;
    for (depth, index) in rest.iter().enumerate() {
        let list = children_list(&map, &indices[..=depth])?;
        map = entry(&list, *index, &indices[..depth + 2])?;
    }
    Ok(map)
}

fn children_of(doc: &LoroDoc, parent: &NodePath) -> Result<LoroList, CrdtError> {
    if parent.is_root() {
        return Ok(doc.get_list(BLOCKS));
    }
    children_list(&node_map(doc, parent)?, parent.as_slice())
}

fn text_of(doc: &LoroDoc, path: &NodePath) -> Result<LoroText, CrdtError> {
    match node_map(doc, path)?.get(TEXT) {
        Some(ValueOrContainer::Container(Container::Text(text))) => Ok(text),
        _ => Err(malformed(path.as_slice(), "node has no text")),
    }
}

/// Translate one schema-level edit into CRDT operations. Does not commit.
fn write_edit(doc: &LoroDoc, edit: &DocumentEdit) -> Result<(), CrdtError> {
    match edit {
        DocumentEdit::InsertNode {
            parent,
            index,
            node,
        } => {
            let list = children_of(doc, parent)?;
            write_node(&list, (*index).min(list.len()), node)?;
        }
        DocumentEdit::DeleteNode { path } => {
            let (parent, index) = path
                .split_last()
                .ok_or_else(|| malformed(&[], "cannot delete the root"))?;
            let list = children_of(doc, &parent)?;
            if index < list.len() {
                list.delete(index, 1)?;
            }
        }
        DocumentEdit::InsertText { path, offset, text } => {
            text_of(doc, path)?.insert(*offset, text)?;
        }
        DocumentEdit::DeleteText { path, range } => {
            text_of(doc, path)?.delete(range.start, range.len())?;
        }
        DocumentEdit::SetAttribute { path, key, value } => {
            let attrs = node_map(doc, path)?.get_or_create_container(ATTRS, LoroMap::new())?;
            attrs.insert(key.as_str(), attr_to_loro(value))?;
        }
        DocumentEdit::SetNodeType { path, node_type } => {
            node_map(doc, path)?.insert(TYPE, node_type.as_str())?;
        }
    }
    Ok(())
}

// === Reading ===

fn attr_from_loro(value: &LoroValue) -> AttrValue {
    match value {
        LoroValue::Bool(b) => AttrValue::Bool(*b),
        LoroValue::I64(i) => AttrValue::Int(*i),
        LoroValue::Double(f) => AttrValue::Float(*f),
        LoroValue::String(s) => AttrValue::String(SmolStr::from(s.to_string())),
        _ => AttrValue::Null,
    }
}

fn read_children(list: &LoroList, base: &NodePath) -> Result<Vec<Node>, CrdtError> {
    (0..list.len())
        .map(|i| {
            let path = base.child(i);
            let map = entry(list, i, path.as_slice())?;
            read_node(&map, &path)
        })
        .collect()
}

fn read_node(map: &LoroMap, path: &NodePath) -> Result<Node, CrdtError> {
    let node_type: NodeType = match map.get(TYPE) {
        Some(ValueOrContainer::Value(value)) => value
            .as_string()
            .and_then(|t| t.to_string().parse::<NodeType>().ok())
            .ok_or_else(|| malformed(path.as_slice(), "unknown node type"))?,
        _ => return Err(malformed(path.as_slice(), "node has no type")),
    };

    let mut attrs = Attrs::new();
    if let Some(ValueOrContainer::Container(Container::Map(stored))) = map.get(ATTRS) {
        stored.for_each(|key, value| {
            if let ValueOrContainer::Value(value) = value {
                attrs.insert(SmolStr::from(key), attr_from_loro(&value));
            }
        });
    }

    // Content follows the type; a shape left over from a concurrent retype
    // reads as empty and is repaired.
    let content = match node_type.content_kind() {
        ContentKind::Text => NodeContent::Text(match map.get(TEXT) {
            Some(ValueOrContainer::Container(Container::Text(text))) => text.to_string(),
            _ => String::new(),
        }),
        ContentKind::Children => NodeContent::Children(match map.get(CHILDREN) {
            Some(ValueOrContainer::Container(Container::List(list))) => read_children(&list, path)?,
            _ => Vec::new(),
        }),
        ContentKind::Atom => NodeContent::Atom,
    };

    Ok(Node {
        node_type,
        attrs,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A full read of the CRDT, to check the incrementally kept view.
    fn read_tree(doc: &LoroDoc) -> Document {
        let blocks = read_children(&doc.get_list(BLOCKS), &NodePath::root()).unwrap();
        Document::from_nodes_unchecked(blocks)
    }

    fn replica(id: u64) -> ReplicatedDocument {
        ReplicatedDocument::new(id).unwrap()
    }

    fn type_text(r: &mut ReplicatedDocument, path: Vec<usize>, offset: usize, text: &str) -> Vec<u8> {
        r.apply_local_edit(&DocumentEdit::InsertText {
            path: path.into(),
            offset,
            text: text.into(),
        })
        .unwrap()
    }

    #[test]
    fn test_new_replica_is_seed_document() {
        let r = replica(1);
        assert_eq!(r.document(), &Document::new());
    }

    #[test]
    fn test_genesis_is_shared() {
        let mut a = replica(1);
        let b = replica(2);
        // b already has everything a's genesis holds
        let outcome = a.merge_remote(&b.export_snapshot().unwrap()).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(a.document().children().len(), 2);
    }

    #[test]
    fn test_local_edit_reaches_peer() {
        let mut a = replica(1);
        let mut b = replica(2);
        let update = type_text(&mut a, vec![1], 0, "héllo");
        let outcome = b.merge_remote(&update).unwrap();
        assert_eq!(outcome.changed_blocks, vec![b.block_id(1).unwrap().clone()]);
        assert!(outcome.removed_blocks.is_empty());
        assert_eq!(b.document(), a.document());
        assert_eq!(b.document().children()[1].text_content(), Some("héllo"));
    }

    #[test]
    fn test_merge_reports_only_touched_blocks() {
        let mut a = replica(1);
        let mut b = replica(2);
        let update = a
            .apply_local_edit(&DocumentEdit::InsertNode {
                parent: NodePath::root(),
                index: 1,
                node: Node::paragraph("first"),
            })
            .unwrap();
        let paragraph = b.block_id(1).unwrap().clone();

        let outcome = b.merge_remote(&update).unwrap();
        // the seed paragraph moved down but was not re-read
        assert_eq!(outcome.changed_blocks, vec![b.block_id(1).unwrap().clone()]);
        assert_eq!(b.block_index(&paragraph), Some(2));
        assert_eq!(b.document(), a.document());

        let update = a
            .apply_local_edit(&DocumentEdit::DeleteNode {
                path: NodePath::from(vec![2]),
            })
            .unwrap();
        let outcome = b.merge_remote(&update).unwrap();
        assert!(outcome.changed_blocks.is_empty());
        assert_eq!(outcome.removed_blocks, vec![paragraph.clone()]);
        assert_eq!(b.block_index(&paragraph), None);
        assert_eq!(b.document(), a.document());
        assert_eq!(&read_tree(&b.doc), b.document());
    }

    #[test]
    fn test_schema_violation_never_reaches_crdt() {
        let mut a = replica(1);
        let version = a.version();
        let err = a
            .apply_local_edit(&DocumentEdit::DeleteNode {
                path: NodePath::from(vec![0]),
            })
            .unwrap_err();
        assert!(matches!(err, CrdtError::Schema(_)));
        assert_eq!(a.version(), version);
    }

    #[test]
    fn test_structural_edits_roundtrip_through_crdt() {
        let mut a = replica(1);
        let mut b = replica(2);
        let edits = [
            DocumentEdit::InsertNode {
                parent: NodePath::root(),
                index: 2,
                node: Node::with_children(
                    NodeType::List,
                    vec![Node::paragraph("one"), Node::paragraph("two")],
                ),
            },
            DocumentEdit::SetAttribute {
                path: NodePath::from(vec![2]),
                key: "ordered".into(),
                value: AttrValue::Bool(true),
            },
            DocumentEdit::SetNodeType {
                path: NodePath::from(vec![2]),
                node_type: NodeType::TaskList,
            },
            DocumentEdit::DeleteText {
                path: NodePath::from(vec![2, 1]),
                range: 0..1,
            },
            DocumentEdit::InsertNode {
                parent: NodePath::root(),
                index: 3,
                node: Node::media().with_attr("width", 320i64),
            },
        ];
        for edit in &edits {
            let update = a.apply_local_edit(edit).unwrap();
            b.merge_remote(&update).unwrap();
        }
        assert_eq!(b.document(), a.document());
        // the view a keeps incrementally matches a fresh read of its CRDT
        assert_eq!(&read_tree(&a.doc), a.document());
        assert_eq!(a.document().children()[2].children()[1].text_content(), Some("wo"));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut a = replica(1);
        type_text(&mut a, vec![0], 0, "Title");
        let restored = ReplicatedDocument::from_snapshot(9, &a.export_snapshot().unwrap()).unwrap();
        assert_eq!(restored.document(), a.document());
        assert_eq!(restored.session_id(), 9);
    }

    #[test]
    fn test_from_document() {
        let doc = Document::from_nodes(vec![
            Node::text(NodeType::Title, "T"),
            Node::text(NodeType::Subtitle, "S"),
            Node::paragraph("body"),
        ])
        .unwrap();
        let r = ReplicatedDocument::from_document(3, &doc).unwrap();
        assert_eq!(r.document(), &doc);
    }

    #[test]
    fn test_unsynced_updates() {
        let mut a = replica(1);
        a.mark_synced();
        assert!(!a.has_unsynced_changes());
        assert_eq!(a.unsynced_updates().unwrap(), None);

        type_text(&mut a, vec![1], 0, "offline");
        assert!(a.has_unsynced_changes());
        let pending = a.unsynced_updates().unwrap().unwrap();

        let mut b = replica(2);
        b.merge_remote(&pending).unwrap();
        assert_eq!(b.document(), a.document());
    }

    #[test]
    fn test_updates_for_encoded_version() {
        let mut a = replica(1);
        let mut b = replica(2);
        type_text(&mut a, vec![1], 0, "abc");
        let have = b.encoded_version();
        let missing = a.updates_for(&have).unwrap().unwrap();
        b.merge_remote(&missing).unwrap();
        assert_eq!(b.document(), a.document());
        assert_eq!(a.updates_for(&b.encoded_version()).unwrap(), None);
    }

    #[test]
    fn test_stable_selection_follows_remote_insert() {
        let mut a = replica(1);
        let mut b = replica(2);
        let update = type_text(&mut a, vec![1], 0, "world");
        b.merge_remote(&update).unwrap();

        // b's caret after "wor": title 0..2, paragraph content starts at 3
        let caret = EditorSelection::caret(3 + 3);
        let stable = b.stabilize(&caret).unwrap();

        let update = type_text(&mut a, vec![1], 0, "hello ");
        b.merge_remote(&update).unwrap();
        assert_eq!(b.resolve(&stable), Some(EditorSelection::caret(3 + 9)));
    }
}
