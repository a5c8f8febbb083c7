//! The editor handle: the surface commands and extensions edit through.
//!
//! `EditorHandle` is implemented by anything that owns a document and a
//! selection. `PlainEditor` keeps both in plain fields; the replicated
//! editor forwards every applied edit into its CRDT as well. All editing
//! logic lives in provided methods so every implementation shares it.

use crate::actions::Range;
use crate::document::{Document, DocumentEdit, NodePath};
use crate::node::{AttrValue, Node, NodeType};
use crate::schema::{self, SchemaViolation};
use crate::types::{EditorSelection, SnapDirection};

pub trait EditorHandle {
    // === Required ===

    /// The current document view.
    fn document(&self) -> &Document;

    /// The current selection.
    fn selection(&self) -> &EditorSelection;

    /// Replace the selection without validation.
    fn set_selection(&mut self, selection: EditorSelection);

    /// Validate and apply one edit. A rejected edit leaves the document
    /// untouched.
    fn apply(&mut self, edit: DocumentEdit) -> Result<(), SchemaViolation>;

    // === Provided ===

    /// Insert a node, schema permitting.
    fn insert_node(
        &mut self,
        parent: &NodePath,
        index: usize,
        node: Node,
    ) -> Result<(), SchemaViolation> {
        self.apply(DocumentEdit::InsertNode {
            parent: parent.clone(),
            index,
            node,
        })
    }

    fn delete_node(&mut self, path: &NodePath) -> Result<(), SchemaViolation> {
        self.apply(DocumentEdit::DeleteNode { path: path.clone() })
    }

    fn set_attribute(
        &mut self,
        path: &NodePath,
        key: &str,
        value: AttrValue,
    ) -> Result<(), SchemaViolation> {
        self.apply(DocumentEdit::SetAttribute {
            path: path.clone(),
            key: key.into(),
            value,
        })
    }

    /// Switch a node to `node_type`, or back to the family default if it
    /// already has that type (paragraph for text blocks, list for
    /// item containers).
    fn toggle_node_type(
        &mut self,
        path: &NodePath,
        node_type: NodeType,
    ) -> Result<(), SchemaViolation> {
        let current = self
            .document()
            .node(path)
            .map(|n| n.node_type)
            .ok_or_else(|| SchemaViolation::InvalidPath(path.as_slice().to_vec()))?;
        let target = if current == node_type {
            match current {
                NodeType::List | NodeType::TaskList | NodeType::Quote => NodeType::List,
                _ => NodeType::Paragraph,
            }
        } else {
            node_type
        };
        if target == current {
            return Ok(());
        }
        if !schema::can_change_type(current, target) {
            return Err(SchemaViolation::TypeChangeNotAllowed {
                from: current,
                to: target,
            });
        }
        self.apply(DocumentEdit::SetNodeType {
            path: path.clone(),
            node_type: target,
        })
    }

    /// Place a caret at `pos`, snapping onto the nearest text if `pos` is
    /// not a caret position.
    fn focus_at(&mut self, pos: usize) {
        let doc = self.document();
        let pos = pos.min(doc.size());
        let pos = doc
            .nearest_text_position(pos, SnapDirection::Backward)
            .unwrap_or(0);
        self.set_selection(EditorSelection::caret(pos));
    }

    /// Place the caret at a char offset inside a text-bearing node.
    fn focus_node(&mut self, path: &NodePath, offset: usize) -> bool {
        match self.document().text_position(path, offset) {
            Some(pos) => {
                self.set_selection(EditorSelection::caret(pos));
                true
            }
            None => false,
        }
    }

    /// Delete everything between two linear positions.
    ///
    /// Text is trimmed from every text leaf the range touches. Leaves lying
    /// entirely inside the range are removed where the schema allows it
    /// (the title and the last block always stay, emptied). The caret ends
    /// up at the start of the range.
    fn delete_range(&mut self, range: Range) -> Result<(), SchemaViolation> {
        let range = range.normalize();
        if range.is_empty() {
            return Ok(());
        }

        let mut edits = Vec::new();
        let mut removable = Vec::new();
        for leaf in self.document().leaves() {
            if leaf.is_atomic() {
                if leaf.start >= range.start && leaf.start < range.end {
                    removable.push(leaf.path.clone());
                }
                continue;
            }
            let (cs, ce) = (leaf.content_start(), leaf.content_end());
            let start = range.start.max(cs);
            let end = range.end.min(ce);
            if start >= end {
                if range.start < leaf.start && range.end > leaf.start + leaf.text_len + 1 {
                    removable.push(leaf.path.clone());
                }
                continue;
            }
            edits.push(DocumentEdit::DeleteText {
                path: leaf.path.clone(),
                range: start - cs..end - cs,
            });
            if range.start < leaf.start && range.end > ce {
                removable.push(leaf.path.clone());
            }
        }

        // Back to front so earlier paths stay valid.
        for edit in edits.into_iter().rev() {
            self.apply(edit)?;
        }
        for path in removable.into_iter().rev() {
            if let Err(violation) = self.delete_node(&path) {
                tracing::trace!(%path, %violation, "kept node inside deleted range");
            }
        }

        self.focus_at(range.start);
        Ok(())
    }
}

/// Editor holding its document and selection in plain fields.
#[derive(Clone, Debug, Default)]
pub struct PlainEditor {
    doc: Document,
    selection: EditorSelection,
    applied: Vec<DocumentEdit>,
}

impl PlainEditor {
    pub fn new(doc: Document) -> Self {
        let selection = doc
            .nearest_text_position(0, SnapDirection::Forward)
            .map(EditorSelection::caret)
            .unwrap_or_default();
        Self {
            doc,
            selection,
            applied: Vec::new(),
        }
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Edits applied since the last call, in order.
    pub fn take_applied(&mut self) -> Vec<DocumentEdit> {
        std::mem::take(&mut self.applied)
    }
}

impl EditorHandle for PlainEditor {
    fn document(&self) -> &Document {
        &self.doc
    }

    fn selection(&self) -> &EditorSelection {
        &self.selection
    }

    fn set_selection(&mut self, selection: EditorSelection) {
        self.selection = selection;
    }

    fn apply(&mut self, edit: DocumentEdit) -> Result<(), SchemaViolation> {
        self.doc.apply_edit(&edit)?;
        self.applied.push(edit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> PlainEditor {
        // title "T": 0..3, "hello": 3..10, media: 10..11, "world": 11..18
        PlainEditor::new(
            Document::from_nodes(vec![
                Node::text(NodeType::Title, "T"),
                Node::paragraph("hello"),
                Node::media(),
                Node::paragraph("world"),
            ])
            .unwrap(),
        )
    }

    fn text_at(ed: &PlainEditor, i: usize) -> Option<String> {
        ed.document()
            .node(&NodePath::from(vec![i]))
            .and_then(|n| n.text_content())
            .map(str::to_string)
    }

    #[test]
    fn test_new_places_caret_in_title() {
        let ed = editor();
        assert_eq!(ed.selection(), &EditorSelection::caret(1));
    }

    #[test]
    fn test_delete_range_within_text() {
        let mut ed = editor();
        ed.delete_range(Range::new(6, 8)).unwrap();
        assert_eq!(text_at(&ed, 1).as_deref(), Some("heo"));
        assert_eq!(ed.selection(), &EditorSelection::caret(6));
        assert_eq!(ed.take_applied().len(), 1);
    }

    #[test]
    fn test_delete_range_across_media() {
        let mut ed = editor();
        // From after "he" to after "wo".
        ed.delete_range(Range::new(6, 14)).unwrap();
        assert_eq!(ed.document().children().len(), 3);
        assert_eq!(text_at(&ed, 1).as_deref(), Some("he"));
        assert_eq!(text_at(&ed, 2).as_deref(), Some("rld"));
    }

    #[test]
    fn test_toggle_node_type() {
        let mut ed = editor();
        let p = NodePath::from(vec![1]);
        ed.toggle_node_type(&p, NodeType::Heading).unwrap();
        assert_eq!(ed.document().node(&p).unwrap().node_type, NodeType::Heading);
        ed.toggle_node_type(&p, NodeType::Heading).unwrap();
        assert_eq!(ed.document().node(&p).unwrap().node_type, NodeType::Paragraph);
        assert!(ed.toggle_node_type(&p, NodeType::List).is_err());
    }

    #[test]
    fn test_focus_at_snaps_off_media() {
        let mut ed = editor();
        ed.focus_at(10);
        assert_eq!(ed.selection(), &EditorSelection::caret(9));
        ed.focus_at(1000);
        assert_eq!(ed.selection(), &EditorSelection::caret(17));
    }

    #[test]
    fn test_rejected_edit_is_not_recorded() {
        let mut ed = editor();
        assert!(
            ed.insert_node(&NodePath::root(), 3, Node::empty(NodeType::Title))
                .is_err()
        );
        assert!(ed.take_applied().is_empty());
    }
}
