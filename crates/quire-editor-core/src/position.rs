//! Linear document positions.
//!
//! Positions count tokens the way ProseMirror does: entering or leaving a
//! node with content is one token, each character is one token and an
//! atomic node is a single token. A caret can only sit inside the content
//! of a text-bearing node; everything else has to snap to one.

use crate::document::{Document, Leaf, NodePath};
use crate::types::{EditorSelection, Selection, SnapDirection};

/// A caret location expressed as node path plus char offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPosition {
    pub path: NodePath,
    pub offset: usize,
}

impl Document {
    /// Total document size in linear positions.
    pub fn size(&self) -> usize {
        self.children().iter().map(|n| n.node_size()).sum()
    }

    /// Linear position directly before the node at `path`.
    pub fn node_position(&self, path: &NodePath) -> Option<usize> {
        let (first, rest) = path.as_slice().split_first()?;
        let siblings = self.children();
        if *first >= siblings.len() {
            return None;
        }
        let mut pos: usize = siblings[..*first].iter().map(|n| n.node_size()).sum();
        let mut node = &siblings[*first];
        for idx in rest {
            let children = node.children();
            if *idx >= children.len() {
                return None;
            }
            // Step over the container's opening token.
            pos += 1 + children[..*idx].iter().map(|n| n.node_size()).sum::<usize>();
            node = &children[*idx];
        }
        Some(pos)
    }

    /// Linear position of a caret at `offset` chars into a text-bearing node.
    pub fn text_position(&self, path: &NodePath, offset: usize) -> Option<usize> {
        let node = self.node(path)?;
        if !node.node_type.is_text_bearing() || offset > node.text_len() {
            return None;
        }
        Some(self.node_position(path)? + 1 + offset)
    }

    /// Resolve a linear position to a caret inside text, if it is one.
    pub fn resolve_text(&self, pos: usize) -> Option<TextPosition> {
        self.leaves()
            .into_iter()
            .find(|leaf| {
                !leaf.is_atomic() && pos >= leaf.content_start() && pos <= leaf.content_end()
            })
            .map(|leaf| TextPosition {
                offset: pos - leaf.content_start(),
                path: leaf.path,
            })
    }

    /// The text leaf containing the position, if any.
    pub fn text_leaf_at(&self, pos: usize) -> Option<Leaf> {
        self.leaves().into_iter().find(|leaf| {
            !leaf.is_atomic() && pos >= leaf.content_start() && pos <= leaf.content_end()
        })
    }

    /// Path of the atomic node starting exactly at `pos`.
    pub fn atom_at(&self, pos: usize) -> Option<NodePath> {
        self.leaves()
            .into_iter()
            .find(|leaf| leaf.is_atomic() && leaf.start == pos)
            .map(|leaf| leaf.path)
    }

    /// Nearest valid caret position to `pos`, looking in `direction` first.
    ///
    /// Returns `None` only for a document without any text leaf, which the
    /// schema rules out (there is always a title).
    pub fn nearest_text_position(&self, pos: usize, direction: SnapDirection) -> Option<usize> {
        let leaves: Vec<Leaf> = self.leaves().into_iter().filter(|l| !l.is_atomic()).collect();
        if let Some(leaf) = leaves
            .iter()
            .find(|l| pos >= l.content_start() && pos <= l.content_end())
        {
            return Some(pos.clamp(leaf.content_start(), leaf.content_end()));
        }

        let backward = || {
            leaves
                .iter()
                .rev()
                .find(|l| l.content_end() <= pos)
                .map(Leaf::content_end)
        };
        let forward = || {
            leaves
                .iter()
                .find(|l| l.content_start() >= pos)
                .map(Leaf::content_start)
        };

        match direction {
            SnapDirection::Backward => backward().or_else(forward),
            SnapDirection::Forward => forward().or_else(backward),
        }
    }

    /// Clamp a captured selection to the current document and snap it onto
    /// valid positions.
    ///
    /// A collapsed selection captured directly before an atomic node becomes
    /// a node selection again.
    pub fn restore_selection(&self, anchor: usize, head: usize) -> EditorSelection {
        let size = self.size();
        let anchor = anchor.min(size);
        let head = head.min(size);

        if anchor == head {
            if let Some(path) = self.atom_at(anchor) {
                return EditorSelection::Node(path);
            }
        }

        let snap = |p: usize| self.nearest_text_position(p, SnapDirection::Backward).unwrap_or(0);
        EditorSelection::Text(Selection::new(snap(anchor), snap(head)))
    }

    /// Anchor/head positions for any selection kind.
    ///
    /// Node selections are reported as the position directly before the
    /// node, collapsed.
    pub fn selection_positions(&self, selection: &EditorSelection) -> (usize, usize) {
        match selection {
            EditorSelection::Text(sel) => (sel.anchor, sel.head),
            EditorSelection::Node(path) => {
                let pos = self.node_position(path).unwrap_or(0);
                (pos, pos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeType};

    fn doc() -> Document {
        // title "T": 0..3, paragraph "hello": 3..10, media: 10..11, paragraph "X": 11..14
        Document::from_nodes(vec![
            Node::text(NodeType::Title, "T"),
            Node::paragraph("hello"),
            Node::media(),
            Node::paragraph("X"),
        ])
        .unwrap()
    }

    #[test]
    fn test_size_and_node_positions() {
        let doc = doc();
        assert_eq!(doc.size(), 14);
        assert_eq!(doc.node_position(&NodePath::from(vec![0])), Some(0));
        assert_eq!(doc.node_position(&NodePath::from(vec![2])), Some(10));
        assert_eq!(doc.node_position(&NodePath::from(vec![9])), None);
    }

    #[test]
    fn test_text_position_and_resolve() {
        let doc = doc();
        let p = NodePath::from(vec![1]);
        assert_eq!(doc.text_position(&p, 0), Some(4));
        assert_eq!(doc.text_position(&p, 5), Some(9));
        assert_eq!(doc.text_position(&p, 6), None);
        assert_eq!(
            doc.resolve_text(6),
            Some(TextPosition {
                path: p.clone(),
                offset: 2
            })
        );
        // Between nodes there is no caret.
        assert_eq!(doc.resolve_text(10), None);
    }

    #[test]
    fn test_nested_positions() {
        let doc = Document::from_nodes(vec![
            Node::text(NodeType::Title, ""),
            Node::with_children(
                NodeType::Quote,
                vec![Node::paragraph("ab"), Node::paragraph("c")],
            ),
        ])
        .unwrap();
        // title 0..2, quote opens at 2, "ab" at 3..7, "c" at 7..10
        assert_eq!(doc.node_position(&NodePath::from(vec![1, 1])), Some(7));
        assert_eq!(doc.text_position(&NodePath::from(vec![1, 1]), 1), Some(9));
    }

    #[test]
    fn test_snap_to_text() {
        let doc = doc();
        assert_eq!(doc.nearest_text_position(6, SnapDirection::Backward), Some(6));
        assert_eq!(doc.nearest_text_position(10, SnapDirection::Backward), Some(9));
        assert_eq!(doc.nearest_text_position(10, SnapDirection::Forward), Some(12));
        assert_eq!(doc.nearest_text_position(0, SnapDirection::Backward), Some(1));
    }

    #[test]
    fn test_restore_selection_clamps_and_snaps() {
        let doc = doc();
        assert_eq!(doc.restore_selection(100, 100), EditorSelection::caret(13));
        assert_eq!(
            doc.restore_selection(10, 10),
            EditorSelection::Node(NodePath::from(vec![2]))
        );
        assert_eq!(
            doc.restore_selection(5, 8),
            EditorSelection::Text(Selection::new(5, 8))
        );
    }
}
