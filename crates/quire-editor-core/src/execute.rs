//! Action execution for editor handles.
//!
//! This module provides the `execute_action` function that applies
//! `EditorAction` operations to any type implementing `EditorHandle`.
//! Every change goes through [`EditorHandle::apply`], so a replicated
//! handle sees exactly the edits a plain one does.

use crate::actions::{EditorAction, Range};
use crate::document::{DocumentEdit, Leaf, NodePath};
use crate::handle::EditorHandle;
use crate::keymap;
use crate::node::{Node, NodeType};
use crate::schema::SchemaViolation;
use crate::types::{EditorSelection, Selection, SnapDirection};

/// Execute an editor action.
///
/// Returns `Ok(true)` if the action was handled, `Ok(false)` if it did not
/// apply at the current position, and `Err` if an edit broke the schema (in
/// which case nothing was applied).
pub fn execute_action<H: EditorHandle + ?Sized>(
    ed: &mut H,
    action: &EditorAction,
) -> Result<bool, SchemaViolation> {
    match action {
        EditorAction::Insert { text, range } => execute_insert(ed, text, *range),
        EditorAction::SplitBlock { range } => execute_split_block(ed, *range),
        EditorAction::DeleteBackward { range } => execute_delete_backward(ed, *range),
        EditorAction::DeleteForward { range } => execute_delete_forward(ed, *range),
        EditorAction::InsertNode { node } => execute_insert_node(ed, node.clone()),
        EditorAction::ToggleNodeType { path, node_type } => {
            ed.toggle_node_type(path, *node_type)?;
            Ok(true)
        }
        EditorAction::DeleteNode { path } => execute_delete_node(ed, path),
        EditorAction::SelectAll => Ok(execute_select_all(ed)),
        EditorAction::MoveCursor { offset } => {
            ed.focus_at(*offset);
            Ok(true)
        }
        EditorAction::ExtendSelection { offset } => Ok(execute_extend_selection(ed, *offset)),
        EditorAction::SelectNode { path } => {
            let atomic = ed.document().node(path).is_some_and(Node::is_atomic);
            if atomic {
                ed.set_selection(EditorSelection::Node(path.clone()));
            }
            Ok(atomic)
        }
    }
}

/// Caret position after an optional range deletion.
fn collapse<H: EditorHandle + ?Sized>(ed: &mut H, range: Range) -> Result<usize, SchemaViolation> {
    let range = range.normalize();
    if range.is_caret() {
        return Ok(range.start);
    }
    ed.delete_range(range)?;
    Ok(ed
        .selection()
        .as_text()
        .map(|s| s.head)
        .unwrap_or(range.start))
}

fn execute_insert<H: EditorHandle + ?Sized>(
    ed: &mut H,
    text: &str,
    range: Range,
) -> Result<bool, SchemaViolation> {
    if text.is_empty() {
        return Ok(false);
    }
    let pos = collapse(ed, range)?;
    let Some(at) = ed.document().resolve_text(pos) else {
        return Ok(false);
    };
    ed.apply(DocumentEdit::InsertText {
        path: at.path,
        offset: at.offset,
        text: text.to_string(),
    })?;
    ed.set_selection(EditorSelection::caret(pos + text.chars().count()));
    Ok(true)
}

fn execute_split_block<H: EditorHandle + ?Sized>(
    ed: &mut H,
    range: Range,
) -> Result<bool, SchemaViolation> {
    let pos = collapse(ed, range)?;

    if let Some(plan) = keymap::handle_enter(ed.document(), &EditorSelection::caret(pos)) {
        for edit in plan.edits {
            ed.apply(edit)?;
        }
        return Ok(ed.focus_node(&plan.focus, 0));
    }

    let Some(at) = ed.document().resolve_text(pos) else {
        return Ok(false);
    };
    let Some(node) = ed.document().node(&at.path) else {
        return Ok(false);
    };

    if node.node_type == NodeType::Code {
        ed.apply(DocumentEdit::InsertText {
            path: at.path,
            offset: at.offset,
            text: "\n".into(),
        })?;
        ed.set_selection(EditorSelection::caret(pos + 1));
        return Ok(true);
    }

    let tail: String = node
        .text_content()
        .unwrap_or_default()
        .chars()
        .skip(at.offset)
        .collect();
    let len = node.text_len();
    let Some((parent, index)) = at.path.split_last() else {
        return Ok(false);
    };

    // The continuation is always a paragraph, also after a heading. Insert
    // it first so a refused insert leaves the block untouched.
    ed.apply(DocumentEdit::InsertNode {
        parent: parent.clone(),
        index: index + 1,
        node: Node::paragraph(tail.as_str()),
    })?;
    if at.offset < len {
        ed.apply(DocumentEdit::DeleteText {
            path: at.path,
            range: at.offset..len,
        })?;
    }
    Ok(ed.focus_node(&parent.child(index + 1), 0))
}

fn execute_delete_backward<H: EditorHandle + ?Sized>(
    ed: &mut H,
    range: Range,
) -> Result<bool, SchemaViolation> {
    if let EditorSelection::Node(path) = ed.selection().clone() {
        return execute_delete_node(ed, &path);
    }
    if !range.is_caret() {
        ed.delete_range(range)?;
        return Ok(true);
    }

    let pos = range.start;
    let Some(at) = ed.document().resolve_text(pos) else {
        return Ok(false);
    };
    if at.offset > 0 {
        ed.apply(DocumentEdit::DeleteText {
            path: at.path,
            range: at.offset - 1..at.offset,
        })?;
        ed.set_selection(EditorSelection::caret(pos - 1));
        return Ok(true);
    }

    let leaves = ed.document().leaves();
    let Some(index) = leaves.iter().position(|l| l.path == at.path) else {
        return Ok(false);
    };
    let Some(prev) = index.checked_sub(1).map(|i| leaves[i].clone()) else {
        return Ok(false);
    };
    if prev.is_atomic() {
        ed.set_selection(EditorSelection::Node(prev.path));
        return Ok(true);
    }
    join_leaves(ed, &prev, &leaves[index])?;
    ed.set_selection(EditorSelection::caret(prev.content_end()));
    Ok(true)
}

fn execute_delete_forward<H: EditorHandle + ?Sized>(
    ed: &mut H,
    range: Range,
) -> Result<bool, SchemaViolation> {
    if let EditorSelection::Node(path) = ed.selection().clone() {
        return execute_delete_node(ed, &path);
    }
    if !range.is_caret() {
        ed.delete_range(range)?;
        return Ok(true);
    }

    let pos = range.start;
    let Some(at) = ed.document().resolve_text(pos) else {
        return Ok(false);
    };
    let len = ed.document().node(&at.path).map_or(0, Node::text_len);
    if at.offset < len {
        ed.apply(DocumentEdit::DeleteText {
            path: at.path,
            range: at.offset..at.offset + 1,
        })?;
        ed.set_selection(EditorSelection::caret(pos));
        return Ok(true);
    }

    let leaves = ed.document().leaves();
    let Some(index) = leaves.iter().position(|l| l.path == at.path) else {
        return Ok(false);
    };
    let Some(next) = leaves.get(index + 1).cloned() else {
        return Ok(false);
    };
    if next.is_atomic() {
        ed.set_selection(EditorSelection::Node(next.path));
        return Ok(true);
    }
    let joined = join_leaves(ed, &leaves[index], &next)?;
    ed.set_selection(EditorSelection::caret(pos));
    Ok(joined)
}

/// Append `second`'s text to `first` and remove `second`. Leaves both alone
/// if `second` cannot be removed.
fn join_leaves<H: EditorHandle + ?Sized>(
    ed: &mut H,
    first: &Leaf,
    second: &Leaf,
) -> Result<bool, SchemaViolation> {
    let delete = DocumentEdit::DeleteNode {
        path: second.path.clone(),
    };
    if let Err(violation) = ed.document().validate_edit(&delete) {
        tracing::trace!(%violation, "blocks not joined");
        return Ok(false);
    }
    let text = ed
        .document()
        .node(&second.path)
        .and_then(|n| n.text_content())
        .unwrap_or_default()
        .to_string();
    if !text.is_empty() {
        ed.apply(DocumentEdit::InsertText {
            path: first.path.clone(),
            offset: first.text_len,
            text,
        })?;
    }
    ed.apply(delete)?;
    Ok(true)
}

fn execute_insert_node<H: EditorHandle + ?Sized>(
    ed: &mut H,
    node: Node,
) -> Result<bool, SchemaViolation> {
    let doc = ed.document();
    let current = match ed.selection() {
        EditorSelection::Text(sel) => doc.text_leaf_at(sel.head).map(|l| l.path),
        EditorSelection::Node(path) => Some(path.clone()),
    };
    let children = doc.children();
    let body_start = 1
        + usize::from(doc.subtitle_index().is_some())
        + usize::from(
            children
                .iter()
                .skip(1)
                .take(2)
                .any(|n| n.node_type == NodeType::HeroImage),
        );
    let body_end = children.len()
        - usize::from(
            children
                .last()
                .is_some_and(|n| n.node_type == NodeType::Footnotes),
        );
    let after = current
        .and_then(|p| p.root_index())
        .map_or(body_end, |i| i + 1);
    let index = after.max(body_start).min(body_end);

    ed.insert_node(&NodePath::root(), index, node)?;
    focus_first_leaf(ed, &NodePath::root().child(index));
    Ok(true)
}

/// Put the selection on the first leaf of the node at `path`.
fn focus_first_leaf<H: EditorHandle + ?Sized>(ed: &mut H, path: &NodePath) {
    let doc = ed.document();
    let Some(start) = doc.node_position(path) else {
        return;
    };
    let Some(leaf) = doc.leaves().into_iter().find(|l| l.start >= start) else {
        return;
    };
    if leaf.is_atomic() {
        ed.set_selection(EditorSelection::Node(leaf.path));
    } else {
        ed.set_selection(EditorSelection::caret(leaf.content_start()));
    }
}

fn execute_delete_node<H: EditorHandle + ?Sized>(
    ed: &mut H,
    path: &NodePath,
) -> Result<bool, SchemaViolation> {
    let pos = ed.document().node_position(path).unwrap_or(0);
    ed.delete_node(path)?;
    ed.focus_at(pos);
    Ok(true)
}

fn execute_select_all<H: EditorHandle + ?Sized>(ed: &mut H) -> bool {
    let doc = ed.document();
    let start = doc.nearest_text_position(0, SnapDirection::Forward);
    let end = doc.nearest_text_position(doc.size(), SnapDirection::Backward);
    match (start, end) {
        (Some(start), Some(end)) => {
            ed.set_selection(EditorSelection::Text(Selection::new(start, end)));
            true
        }
        _ => false,
    }
}

fn execute_extend_selection<H: EditorHandle + ?Sized>(ed: &mut H, offset: usize) -> bool {
    let doc = ed.document();
    let (anchor, _) = doc.selection_positions(ed.selection());
    let Some(head) = doc.nearest_text_position(offset.min(doc.size()), SnapDirection::Backward)
    else {
        return false;
    };
    ed.set_selection(EditorSelection::Text(Selection::new(anchor, head)));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::handle::PlainEditor;

    fn editor(nodes: Vec<Node>) -> PlainEditor {
        PlainEditor::new(Document::from_nodes(nodes).unwrap())
    }

    fn caret(ed: &PlainEditor) -> usize {
        ed.selection().as_text().unwrap().head
    }

    fn texts(ed: &PlainEditor) -> Vec<(NodeType, String)> {
        ed.document()
            .children()
            .iter()
            .map(|n| (n.node_type, n.text_content().unwrap_or("").to_string()))
            .collect()
    }

    #[test]
    fn test_insert_moves_caret() {
        let mut ed = PlainEditor::new(Document::new());
        let pos = caret(&ed);
        assert!(
            execute_action(
                &mut ed,
                &EditorAction::Insert {
                    text: "Héllo".into(),
                    range: Range::caret(pos)
                }
            )
            .unwrap()
        );
        assert_eq!(caret(&ed), pos + 5);
        assert_eq!(texts(&ed)[0].1, "Héllo");
    }

    #[test]
    fn test_split_paragraph_and_heading() {
        let mut ed = editor(vec![
            Node::text(NodeType::Title, "T"),
            Node::text(NodeType::Heading, "Intro text"),
        ]);
        // heading content starts at 4; split after "Intro"
        execute_action(&mut ed, &EditorAction::SplitBlock { range: Range::caret(9) }).unwrap();
        assert_eq!(
            texts(&ed),
            vec![
                (NodeType::Title, "T".into()),
                (NodeType::Heading, "Intro".into()),
                (NodeType::Paragraph, " text".into()),
            ]
        );
        let start_of_new = ed
            .document()
            .text_position(&NodePath::from(vec![2]), 0)
            .unwrap();
        assert_eq!(caret(&ed), start_of_new);
    }

    #[test]
    fn test_split_in_code_inserts_newline() {
        let mut ed = editor(vec![
            Node::text(NodeType::Title, ""),
            Node::text(NodeType::Code, "ab"),
        ]);
        execute_action(&mut ed, &EditorAction::SplitBlock { range: Range::caret(4) }).unwrap();
        assert_eq!(texts(&ed)[1].1, "a\nb");
        assert_eq!(caret(&ed), 5);
    }

    #[test]
    fn test_split_in_title_follows_enter_contract() {
        let mut ed = PlainEditor::new(Document::new());
        execute_action(&mut ed, &EditorAction::SplitBlock { range: Range::caret(1) }).unwrap();
        assert_eq!(ed.document().children()[1].node_type, NodeType::Subtitle);
        assert_eq!(caret(&ed), 3);
    }

    #[test]
    fn test_backspace_selects_then_deletes_media() {
        // title 0..2, media 2..3, "x" 3..6
        let mut ed = editor(vec![
            Node::text(NodeType::Title, ""),
            Node::media(),
            Node::paragraph("x"),
        ]);
        execute_action(&mut ed, &EditorAction::DeleteBackward { range: Range::caret(4) }).unwrap();
        assert_eq!(
            ed.selection(),
            &EditorSelection::Node(NodePath::from(vec![1]))
        );
        execute_action(&mut ed, &EditorAction::DeleteBackward { range: Range::caret(4) }).unwrap();
        assert_eq!(ed.document().children().len(), 2);
        assert_eq!(caret(&ed), 1);
    }

    #[test]
    fn test_backspace_joins_paragraphs() {
        // title 0..2, "ab" 2..6, "cd" 6..10
        let mut ed = editor(vec![
            Node::text(NodeType::Title, ""),
            Node::paragraph("ab"),
            Node::paragraph("cd"),
        ]);
        execute_action(&mut ed, &EditorAction::DeleteBackward { range: Range::caret(7) }).unwrap();
        assert_eq!(texts(&ed)[1..], [(NodeType::Paragraph, "abcd".to_string())]);
        assert_eq!(caret(&ed), 5);
    }

    #[test]
    fn test_delete_forward_at_end_of_last_block() {
        let mut ed = PlainEditor::new(Document::new());
        let end = ed.document().size() - 1;
        assert!(
            !execute_action(&mut ed, &EditorAction::DeleteForward { range: Range::caret(end) })
                .unwrap()
        );
    }

    #[test]
    fn test_insert_node_goes_after_current_block() {
        let mut ed = editor(vec![
            Node::text(NodeType::Title, ""),
            Node::text(NodeType::Subtitle, ""),
            Node::paragraph("a"),
        ]);
        // Caret in the title: the node still lands in the body.
        ed.focus_at(1);
        execute_action(&mut ed, &EditorAction::InsertNode { node: Node::media() }).unwrap();
        let types: Vec<_> = ed.document().children().iter().map(|n| n.node_type).collect();
        assert_eq!(
            types,
            vec![
                NodeType::Title,
                NodeType::Subtitle,
                NodeType::Media,
                NodeType::Paragraph
            ]
        );
        assert_eq!(
            ed.selection(),
            &EditorSelection::Node(NodePath::from(vec![2]))
        );
    }

    #[test]
    fn test_select_all_spans_text() {
        let mut ed = editor(vec![
            Node::text(NodeType::Title, "T"),
            Node::media(),
        ]);
        execute_action(&mut ed, &EditorAction::SelectAll).unwrap();
        assert_eq!(
            ed.selection(),
            &EditorSelection::Text(Selection::new(1, 2))
        );
    }
}
