//! Core editor types: selections, directions and keys.
//!
//! These types are framework-agnostic. All positions are linear document
//! positions (see [`crate::position`]), not byte offsets.

use serde::{Deserialize, Serialize};

use crate::document::NodePath;

/// A caret or text range in linear positions. `anchor` stays put while
/// `head` follows the caret, so `head < anchor` for a backward drag.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn collapsed(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }
}

/// What the editor currently has selected.
///
/// Atomic nodes have no caret positions, so they are selected as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorSelection {
    /// A caret or text range.
    Text(Selection),
    /// A whole-node selection of the node at this path.
    Node(NodePath),
}

impl EditorSelection {
    pub fn caret(pos: usize) -> Self {
        EditorSelection::Text(Selection::collapsed(pos))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, EditorSelection::Node(_))
    }

    pub fn as_text(&self) -> Option<Selection> {
        match self {
            EditorSelection::Text(sel) => Some(*sel),
            EditorSelection::Node(_) => None,
        }
    }
}

impl Default for EditorSelection {
    fn default() -> Self {
        EditorSelection::caret(0)
    }
}

/// Which way to look for a valid position when one lands somewhere the
/// caret cannot go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SnapDirection {
    #[default]
    Backward,
    Forward,
}

/// Vertical direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Keys the core intercepts before the host's default handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorKey {
    ArrowUp,
    ArrowDown,
    Enter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_drag_keeps_ordered_bounds() {
        let sel = Selection::new(10, 5);
        assert_eq!((sel.start(), sel.end()), (5, 10));
        assert!(!sel.is_collapsed());
        assert!(Selection::collapsed(7).is_collapsed());
    }

    #[test]
    fn test_editor_selection_accessors() {
        let caret = EditorSelection::caret(3);
        assert_eq!(caret.as_text(), Some(Selection::collapsed(3)));
        assert!(!caret.is_node());

        let node = EditorSelection::Node(NodePath::from(vec![2]));
        assert!(node.is_node());
        assert_eq!(node.as_text(), None);
    }
}
