//! The document tree and its typed edit operations.
//!
//! Every mutation is expressed as a [`DocumentEdit`] and validated against
//! the schema before it is applied. Validation only inspects the affected
//! parent's child sequence, never the whole tree.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::node::{AttrValue, ContentKind, Node, NodeContent, NodeType};
use crate::schema::{self, SchemaViolation};

/// Child indices from the root to a node. The empty path is the root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the child at `index` below this node.
    pub fn child(&self, index: usize) -> Self {
        let mut v = self.0.clone();
        v.push(index);
        Self(v)
    }

    /// Split into the parent path and this node's index within it.
    pub fn split_last(&self) -> Option<(NodePath, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((NodePath(rest.to_vec()), *last))
    }

    /// Index of this node among the root's children.
    pub fn root_index(&self) -> Option<usize> {
        self.0.first().copied()
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(v: Vec<usize>) -> Self {
        Self(v)
    }
}

impl From<&[usize]> for NodePath {
    fn from(v: &[usize]) -> Self {
        Self(v.to_vec())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{idx}")?;
        }
        Ok(())
    }
}

/// A schema-level edit, addressed by node path.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentEdit {
    InsertNode {
        parent: NodePath,
        index: usize,
        node: Node,
    },
    DeleteNode {
        path: NodePath,
    },
    InsertText {
        path: NodePath,
        offset: usize,
        text: String,
    },
    DeleteText {
        path: NodePath,
        range: Range<usize>,
    },
    SetAttribute {
        path: NodePath,
        key: SmolStr,
        value: AttrValue,
    },
    SetNodeType {
        path: NodePath,
        node_type: NodeType,
    },
}

impl DocumentEdit {
    /// The node the edit addresses (the parent, for insertions).
    pub fn target(&self) -> &NodePath {
        match self {
            DocumentEdit::InsertNode { parent, .. } => parent,
            DocumentEdit::DeleteNode { path }
            | DocumentEdit::InsertText { path, .. }
            | DocumentEdit::DeleteText { path, .. }
            | DocumentEdit::SetAttribute { path, .. }
            | DocumentEdit::SetNodeType { path, .. } => path,
        }
    }

    /// Whether the edit changes the tree shape rather than text or attributes.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DocumentEdit::InsertNode { .. }
                | DocumentEdit::DeleteNode { .. }
                | DocumentEdit::SetNodeType { .. }
        )
    }
}

/// A leaf of the tree in document order: a text-bearing or atomic node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub path: NodePath,
    pub node_type: NodeType,
    /// Linear position directly before the node.
    pub start: usize,
    /// Character count for text leaves, zero for atoms.
    pub text_len: usize,
}

impl Leaf {
    pub fn is_atomic(&self) -> bool {
        crate::node::is_node_atomic(self.node_type)
    }

    /// First caret position inside the leaf (text leaves only).
    pub fn content_start(&self) -> usize {
        self.start + 1
    }

    /// Last caret position inside the leaf (text leaves only).
    pub fn content_end(&self) -> usize {
        self.start + 1 + self.text_len
    }
}

/// Errors from loading a serialized document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentLoadError {
    #[error("malformed document json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

/// A document: the root's child sequence.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document {
    children: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// The smallest valid document: an empty title and an empty paragraph.
    pub fn new() -> Self {
        Self {
            children: vec![Node::empty(NodeType::Title), Node::paragraph("")],
        }
    }

    /// Build a document from root children, validating the whole tree.
    pub fn from_nodes(children: Vec<Node>) -> Result<Self, SchemaViolation> {
        let doc = Self { children };
        doc.validate()?;
        Ok(doc)
    }

    /// Build a document without validation.
    ///
    /// Used when materializing replicated state, which is repaired rather
    /// than rejected.
    pub fn from_nodes_unchecked(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Node> {
        self.children
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentLoadError> {
        let children: Vec<Node> = serde_json::from_str(json)?;
        Ok(Self::from_nodes(children)?)
    }

    /// Validate the whole tree.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        schema::validate_root(&types_of(&self.children))?;
        self.children.iter().try_for_each(validate_subtree)
    }

    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        let (first, rest) = path.as_slice().split_first()?;
        let mut node = self.children.get(*first)?;
        for idx in rest {
            node = node.children().get(*idx)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let (first, rest) = path.as_slice().split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for idx in rest {
            node = node.children_mut()?.get_mut(*idx)?;
        }
        Some(node)
    }

    /// Parent type (`None` for the root) and its children.
    fn child_list(&self, parent: &NodePath) -> Result<(Option<NodeType>, &[Node]), SchemaViolation> {
        if parent.is_root() {
            return Ok((None, &self.children));
        }
        let node = self
            .node(parent)
            .ok_or_else(|| SchemaViolation::InvalidPath(parent.as_slice().to_vec()))?;
        match &node.content {
            NodeContent::Children(c) => Ok((Some(node.node_type), c)),
            _ => Err(SchemaViolation::NotContainer(node.node_type)),
        }
    }

    fn child_list_mut(&mut self, parent: &NodePath) -> Option<&mut Vec<Node>> {
        if parent.is_root() {
            return Some(&mut self.children);
        }
        self.node_mut(parent)?.children_mut()
    }

    fn require(&self, path: &NodePath) -> Result<&Node, SchemaViolation> {
        self.node(path)
            .ok_or_else(|| SchemaViolation::InvalidPath(path.as_slice().to_vec()))
    }

    /// Check an edit without applying it.
    pub fn validate_edit(&self, edit: &DocumentEdit) -> Result<(), SchemaViolation> {
        match edit {
            DocumentEdit::InsertNode {
                parent,
                index,
                node,
            } => {
                validate_subtree(node)?;
                let (parent_type, siblings) = self.child_list(parent)?;
                if *index > siblings.len() {
                    return Err(SchemaViolation::InvalidPath(
                        parent.child(*index).as_slice().to_vec(),
                    ));
                }
                let mut types = types_of(siblings);
                types.insert(*index, node.node_type);
                validate_sequence(parent_type, &types)
            }
            DocumentEdit::DeleteNode { path } => {
                let (parent, index) = path
                    .split_last()
                    .ok_or_else(|| SchemaViolation::InvalidPath(Vec::new()))?;
                let (parent_type, siblings) = self.child_list(&parent)?;
                if index >= siblings.len() {
                    return Err(SchemaViolation::InvalidPath(path.as_slice().to_vec()));
                }
                let mut types = types_of(siblings);
                types.remove(index);
                validate_sequence(parent_type, &types)
            }
            DocumentEdit::InsertText { path, offset, .. } => {
                let node = self.require(path)?;
                let len = text_len_of(node)?;
                if *offset > len {
                    return Err(SchemaViolation::OffsetOutOfRange {
                        offset: *offset,
                        len,
                    });
                }
                Ok(())
            }
            DocumentEdit::DeleteText { path, range } => {
                let node = self.require(path)?;
                let len = text_len_of(node)?;
                if range.start > range.end || range.end > len {
                    return Err(SchemaViolation::OffsetOutOfRange {
                        offset: range.end,
                        len,
                    });
                }
                Ok(())
            }
            DocumentEdit::SetAttribute { path, .. } => self.require(path).map(|_| ()),
            DocumentEdit::SetNodeType { path, node_type } => {
                let node = self.require(path)?;
                if !schema::can_change_type(node.node_type, *node_type) {
                    return Err(SchemaViolation::TypeChangeNotAllowed {
                        from: node.node_type,
                        to: *node_type,
                    });
                }
                if node.node_type.content_kind() == ContentKind::Children {
                    schema::validate_children(*node_type, &types_of(node.children()))?;
                }
                let (parent, index) = path
                    .split_last()
                    .ok_or_else(|| SchemaViolation::InvalidPath(Vec::new()))?;
                let (parent_type, siblings) = self.child_list(&parent)?;
                let mut types = types_of(siblings);
                types[index] = *node_type;
                validate_sequence(parent_type, &types)
            }
        }
    }

    /// Validate then apply an edit.
    pub fn apply_edit(&mut self, edit: &DocumentEdit) -> Result<(), SchemaViolation> {
        self.validate_edit(edit)?;
        self.apply_unchecked(edit);
        Ok(())
    }

    /// Apply an edit that has already been validated (or comes from a
    /// replicated source that is repaired afterwards).
    ///
    /// Edits that do not address an existing node are ignored.
    pub fn apply_unchecked(&mut self, edit: &DocumentEdit) {
        match edit {
            DocumentEdit::InsertNode {
                parent,
                index,
                node,
            } => {
                if let Some(children) = self.child_list_mut(parent) {
                    let index = (*index).min(children.len());
                    children.insert(index, node.clone());
                }
            }
            DocumentEdit::DeleteNode { path } => {
                if let Some((parent, index)) = path.split_last() {
                    if let Some(children) = self.child_list_mut(&parent) {
                        if index < children.len() {
                            children.remove(index);
                        }
                    }
                }
            }
            DocumentEdit::InsertText { path, offset, text } => {
                if let Some(NodeContent::Text(t)) = self.node_mut(path).map(|n| &mut n.content) {
                    let byte = char_to_byte(t, *offset);
                    t.insert_str(byte, text);
                }
            }
            DocumentEdit::DeleteText { path, range } => {
                if let Some(NodeContent::Text(t)) = self.node_mut(path).map(|n| &mut n.content) {
                    let start = char_to_byte(t, range.start);
                    let end = char_to_byte(t, range.end);
                    t.replace_range(start..end, "");
                }
            }
            DocumentEdit::SetAttribute { path, key, value } => {
                if let Some(node) = self.node_mut(path) {
                    node.attrs.insert(key.clone(), value.clone());
                }
            }
            DocumentEdit::SetNodeType { path, node_type } => {
                if let Some(node) = self.node_mut(path) {
                    node.node_type = *node_type;
                }
            }
        }
    }

    pub fn insert_node(
        &mut self,
        parent: &NodePath,
        index: usize,
        node: Node,
    ) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::InsertNode {
            parent: parent.clone(),
            index,
            node,
        })
    }

    pub fn delete_node(&mut self, path: &NodePath) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::DeleteNode { path: path.clone() })
    }

    pub fn insert_text(
        &mut self,
        path: &NodePath,
        offset: usize,
        text: &str,
    ) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::InsertText {
            path: path.clone(),
            offset,
            text: text.to_string(),
        })
    }

    pub fn delete_text(&mut self, path: &NodePath, range: Range<usize>) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::DeleteText {
            path: path.clone(),
            range,
        })
    }

    pub fn set_attribute(
        &mut self,
        path: &NodePath,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::SetAttribute {
            path: path.clone(),
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn set_node_type(&mut self, path: &NodePath, node_type: NodeType) -> Result<(), SchemaViolation> {
        self.apply_edit(&DocumentEdit::SetNodeType {
            path: path.clone(),
            node_type,
        })
    }

    /// Text-bearing and atomic nodes in document order with their positions.
    pub fn leaves(&self) -> Vec<Leaf> {
        let mut out = Vec::new();
        let mut pos = 0;
        for (i, child) in self.children.iter().enumerate() {
            collect_leaves(child, NodePath::root().child(i), pos, &mut out);
            pos += child.node_size();
        }
        out
    }

    /// Path of the first node in document order matching the predicate.
    pub fn find_node(&self, mut pred: impl FnMut(&Node) -> bool) -> Option<NodePath> {
        fn walk(
            nodes: &[Node],
            base: &NodePath,
            pred: &mut dyn FnMut(&Node) -> bool,
        ) -> Option<NodePath> {
            for (i, node) in nodes.iter().enumerate() {
                let path = base.child(i);
                if pred(node) {
                    return Some(path);
                }
                if let Some(found) = walk(node.children(), &path, pred) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.children, &NodePath::root(), &mut pred)
    }

    /// Root index of the title's subtitle, if present.
    pub fn subtitle_index(&self) -> Option<usize> {
        match self.children.get(1) {
            Some(n) if n.node_type == NodeType::Subtitle => Some(1),
            _ => None,
        }
    }
}

fn collect_leaves(node: &Node, path: NodePath, start: usize, out: &mut Vec<Leaf>) {
    match &node.content {
        NodeContent::Text(t) => out.push(Leaf {
            path,
            node_type: node.node_type,
            start,
            text_len: t.chars().count(),
        }),
        NodeContent::Atom => out.push(Leaf {
            path,
            node_type: node.node_type,
            start,
            text_len: 0,
        }),
        NodeContent::Children(children) => {
            let mut pos = start + 1;
            for (i, child) in children.iter().enumerate() {
                collect_leaves(child, path.child(i), pos, out);
                pos += child.node_size();
            }
        }
    }
}

fn types_of(nodes: &[Node]) -> Vec<NodeType> {
    nodes.iter().map(|n| n.node_type).collect()
}

fn validate_sequence(parent: Option<NodeType>, types: &[NodeType]) -> Result<(), SchemaViolation> {
    match parent {
        None => schema::validate_root(types),
        Some(parent) => schema::validate_children(parent, types),
    }
}

fn validate_subtree(node: &Node) -> Result<(), SchemaViolation> {
    match (node.node_type.content_kind(), &node.content) {
        (ContentKind::Text, NodeContent::Text(_)) | (ContentKind::Atom, NodeContent::Atom) => Ok(()),
        (ContentKind::Children, NodeContent::Children(children)) => {
            schema::validate_children(node.node_type, &types_of(children))?;
            children.iter().try_for_each(validate_subtree)
        }
        _ => Err(SchemaViolation::ContentMismatch(node.node_type)),
    }
}

fn text_len_of(node: &Node) -> Result<usize, SchemaViolation> {
    match &node.content {
        NodeContent::Text(t) => Ok(t.chars().count()),
        _ => Err(SchemaViolation::NotTextBearing(node.node_type)),
    }
}

/// Byte index of a char offset, clamped to the end of the string.
pub(crate) fn char_to_byte(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}
