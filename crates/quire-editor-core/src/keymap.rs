//! Enter-key handling for the title and subtitle.
//!
//! Enter in the title moves into the subtitle (creating it if needed).
//! Enter in the subtitle moves into the first body block, creating an empty
//! paragraph when the body does not start with text. Everywhere else Enter
//! falls through to block splitting.

use crate::document::{Document, DocumentEdit, NodePath};
use crate::node::{Node, NodeType};
use crate::types::EditorSelection;

/// Edits to apply and where the caret goes afterwards (offset 0 of `focus`).
#[derive(Clone, Debug, PartialEq)]
pub struct EnterPlan {
    pub edits: Vec<DocumentEdit>,
    pub focus: NodePath,
}

/// Plan the Enter key for the current selection. `None` means the title /
/// subtitle contract does not apply.
pub fn handle_enter(doc: &Document, selection: &EditorSelection) -> Option<EnterPlan> {
    let sel = selection.as_text()?;
    let leaf = doc.text_leaf_at(sel.head)?;
    if leaf.path.depth() != 1 {
        return None;
    }

    match leaf.node_type {
        NodeType::Title => {
            let subtitle = NodePath::from(vec![1]);
            if doc.subtitle_index().is_some() {
                return Some(EnterPlan {
                    edits: Vec::new(),
                    focus: subtitle,
                });
            }
            Some(EnterPlan {
                edits: vec![DocumentEdit::InsertNode {
                    parent: NodePath::root(),
                    index: 1,
                    node: Node::empty(NodeType::Subtitle),
                }],
                focus: subtitle,
            })
        }
        NodeType::Subtitle => {
            let mut index = 2;
            if doc
                .children()
                .get(index)
                .is_some_and(|n| n.node_type == NodeType::HeroImage)
            {
                index += 1;
            }

            if let Some(focus) = doc
                .children()
                .get(index)
                .filter(|n| n.node_type.is_block())
                .and_then(|_| first_text_leaf(doc, index))
            {
                return Some(EnterPlan {
                    edits: Vec::new(),
                    focus,
                });
            }

            Some(EnterPlan {
                edits: vec![DocumentEdit::InsertNode {
                    parent: NodePath::root(),
                    index,
                    node: Node::paragraph(""),
                }],
                focus: NodePath::from(vec![index]),
            })
        }
        _ => None,
    }
}

/// First leaf of the root child at `index`, if it is text-bearing.
fn first_text_leaf(doc: &Document, index: usize) -> Option<NodePath> {
    let leaf = doc
        .leaves()
        .into_iter()
        .find(|l| l.path.root_index() == Some(index))?;
    (!leaf.is_atomic()).then_some(leaf.path)
}
