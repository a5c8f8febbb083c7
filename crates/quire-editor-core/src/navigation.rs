//! Vertical arrow-key navigation across node boundaries.
//!
//! Atomic nodes have no caret positions, so moving onto one selects the
//! whole node, and moving off one places a caret in the neighbouring text.
//! Movement inside text is left to the host's text layout.

use crate::document::{Document, Leaf};
use crate::types::{Direction, EditorSelection, Selection};

/// Answers whether a caret is on the first or last visual line of its text
/// node. Only the host's layout knows about soft wrapping.
pub trait LineLayout {
    fn is_on_edge_line(&self, doc: &Document, leaf: &Leaf, pos: usize, direction: Direction)
    -> bool;
}

/// Layout that only breaks lines at `\n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HardBreakLayout;

impl LineLayout for HardBreakLayout {
    fn is_on_edge_line(
        &self,
        doc: &Document,
        leaf: &Leaf,
        pos: usize,
        direction: Direction,
    ) -> bool {
        let Some(text) = doc.node(&leaf.path).and_then(|n| n.text_content()) else {
            return true;
        };
        let offset = pos.saturating_sub(leaf.content_start());
        let mut chars = text.chars();
        match direction {
            Direction::Up => !chars.by_ref().take(offset).any(|c| c == '\n'),
            Direction::Down => !chars.skip(offset).any(|c| c == '\n'),
        }
    }
}

/// Result of one navigation keypress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// `true` suppresses the host's default key handling.
    pub handled: bool,
    /// The new selection, if it changes.
    pub selection: Option<EditorSelection>,
    /// Ask the host to scroll the caret into view.
    pub scroll_into_view: bool,
}

impl NavigationOutcome {
    /// Leave the key to default handling.
    pub fn declined() -> Self {
        Self {
            handled: false,
            selection: None,
            scroll_into_view: false,
        }
    }

    fn select(selection: EditorSelection) -> Self {
        Self {
            handled: true,
            selection: Some(selection),
            scroll_into_view: false,
        }
    }

    /// Nothing to move to: keep the selection, scroll it into view.
    fn at_document_edge() -> Self {
        Self {
            handled: true,
            selection: None,
            scroll_into_view: true,
        }
    }
}

/// Decides how vertical arrow keys cross node boundaries.
#[derive(Clone, Debug, Default)]
pub struct NavigationController<L = HardBreakLayout> {
    layout: L,
}

impl<L: LineLayout> NavigationController<L> {
    pub fn new(layout: L) -> Self {
        Self { layout }
    }

    /// Compute the outcome of pressing an arrow key. Pure: the caller applies
    /// the returned selection.
    pub fn handle(
        &self,
        doc: &Document,
        selection: &EditorSelection,
        direction: Direction,
    ) -> NavigationOutcome {
        let leaves = doc.leaves();

        let current = match selection {
            EditorSelection::Text(sel) => {
                if !sel.is_collapsed() {
                    return NavigationOutcome::declined();
                }
                let Some(index) = leaves.iter().position(|l| {
                    !l.is_atomic() && sel.head >= l.content_start() && sel.head <= l.content_end()
                }) else {
                    return NavigationOutcome::declined();
                };
                if !self
                    .layout
                    .is_on_edge_line(doc, &leaves[index], sel.head, direction)
                {
                    return NavigationOutcome::declined();
                }
                index
            }
            EditorSelection::Node(path) => {
                match leaves.iter().position(|l| &l.path == path && l.is_atomic()) {
                    Some(index) => index,
                    None => return NavigationOutcome::declined(),
                }
            }
        };

        let adjacent = match direction {
            Direction::Up => current.checked_sub(1).and_then(|i| leaves.get(i)),
            Direction::Down => leaves.get(current + 1),
        };

        let Some(next) = adjacent else {
            tracing::trace!(?direction, "navigation at document edge");
            return NavigationOutcome::at_document_edge();
        };

        if next.is_atomic() {
            return NavigationOutcome::select(EditorSelection::Node(next.path.clone()));
        }

        match selection {
            // Text to text: default layout movement is fine.
            EditorSelection::Text(_) => NavigationOutcome::declined(),
            EditorSelection::Node(_) => {
                let pos = match direction {
                    Direction::Down => next.content_start(),
                    Direction::Up => next.content_end(),
                };
                NavigationOutcome::select(EditorSelection::Text(Selection::collapsed(pos)))
            }
        }
    }
}
