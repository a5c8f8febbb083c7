//! Editor actions.
//!
//! `EditorAction` represents semantic editing operations, decoupled from how
//! they're triggered (keyboard, slash command, toolbar, touch).

use crate::document::NodePath;
use crate::node::{Node, NodeType};

/// A range in the document, measured in linear positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn caret(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize range so start <= end.
    pub fn normalize(self) -> Self {
        if self.start <= self.end {
            self
        } else {
            Self {
                start: self.end,
                end: self.start,
            }
        }
    }
}

impl From<std::ops::Range<usize>> for Range {
    fn from(r: std::ops::Range<usize>) -> Self {
        Self::new(r.start, r.end)
    }
}

impl From<Range> for std::ops::Range<usize> {
    fn from(r: Range) -> Self {
        r.start..r.end
    }
}

impl From<crate::types::Selection> for Range {
    fn from(sel: crate::types::Selection) -> Self {
        Self::new(sel.start(), sel.end())
    }
}

/// All possible editor actions.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    // === Text ===
    /// Insert text at the given range, replacing any selected content.
    Insert { text: String, range: Range },

    /// Enter: the title/subtitle contract first, otherwise split the
    /// current block at the caret.
    SplitBlock { range: Range },

    /// Backspace.
    DeleteBackward { range: Range },

    /// Delete key.
    DeleteForward { range: Range },

    // === Structure ===
    /// Insert a node after the block containing the caret.
    InsertNode { node: Node },

    /// Toggle the type of the node at `path`.
    ToggleNodeType { path: NodePath, node_type: NodeType },

    /// Remove the node at `path` (e.g. a selected media node).
    DeleteNode { path: NodePath },

    // === Selection ===
    SelectAll,

    /// Move the caret to a position, snapping to the nearest text.
    MoveCursor { offset: usize },

    /// Extend the selection head to a position.
    ExtendSelection { offset: usize },

    /// Select a whole atomic node.
    SelectNode { path: NodePath },
}

impl EditorAction {
    /// Update the range in actions that use one.
    pub fn with_range(self, range: Range) -> Self {
        match self {
            Self::Insert { text, .. } => Self::Insert { text, range },
            Self::SplitBlock { .. } => Self::SplitBlock { range },
            Self::DeleteBackward { .. } => Self::DeleteBackward { range },
            Self::DeleteForward { .. } => Self::DeleteForward { range },
            other => other,
        }
    }

    /// Whether executing the action may change document content.
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. }
                | Self::SplitBlock { .. }
                | Self::DeleteBackward { .. }
                | Self::DeleteForward { .. }
                | Self::InsertNode { .. }
                | Self::ToggleNodeType { .. }
                | Self::DeleteNode { .. }
        )
    }
}
