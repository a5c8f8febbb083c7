//! Post-merge schema repair.
//!
//! Every edit is validated locally, but two valid concurrent edits can merge
//! into a tree the grammar rejects: two sessions both adding a subtitle, or
//! one emptying a list while another retypes it. After each remote merge the
//! replica asks [`next_fix`] for one corrective edit at a time until the tree
//! is valid again.
//!
//! Fixes are a pure function of the merged tree, so every replica computes
//! the same ones. Retypes and deletes of the same target are idempotent under
//! concurrency; only the "no block left" insert can be duplicated, which
//! still yields a valid tree.

use quire_editor_core::schema;
use quire_editor_core::{Document, DocumentEdit, Node, NodeContent, NodePath, NodeType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Title,
    Subtitle,
    Hero,
    Body,
}

/// The first corrective edit the tree needs, or `None` if it is valid.
pub fn next_fix(doc: &Document) -> Option<DocumentEdit> {
    root_fix(doc.children()).or_else(|| nested_fix(doc.children(), &NodePath::root()))
}

fn retype(index: usize, node_type: NodeType) -> Option<DocumentEdit> {
    Some(DocumentEdit::SetNodeType {
        path: NodePath::root().child(index),
        node_type,
    })
}

fn insert(index: usize, node: Node) -> Option<DocumentEdit> {
    Some(DocumentEdit::InsertNode {
        parent: NodePath::root(),
        index,
        node,
    })
}

fn root_fix(children: &[Node]) -> Option<DocumentEdit> {
    match children.first() {
        Some(n) if n.node_type == NodeType::Title => {}
        Some(n) if n.node_type.is_text_bearing() => return retype(0, NodeType::Title),
        _ => return insert(0, Node::empty(NodeType::Title)),
    }

    let last = children.len() - 1;
    let mut stage = Stage::Title;
    let mut body_start = 1;
    let mut blocks = 0;

    for (i, node) in children.iter().enumerate().skip(1) {
        match node.node_type {
            NodeType::Title => return retype(i, NodeType::Paragraph),
            NodeType::Subtitle if stage == Stage::Title => {
                stage = Stage::Subtitle;
                body_start = i + 1;
            }
            NodeType::Subtitle => return retype(i, NodeType::Paragraph),
            NodeType::HeroImage if stage < Stage::Hero => {
                stage = Stage::Hero;
                body_start = i + 1;
            }
            NodeType::HeroImage => return retype(i, NodeType::Quote),
            NodeType::Footnotes if i == last => {}
            NodeType::Footnotes => return retype(i, NodeType::Quote),
            _ => {
                stage = Stage::Body;
                blocks += 1;
            }
        }
    }

    if blocks == 0 {
        return insert(body_start, Node::paragraph(""));
    }
    None
}

fn nested_fix(nodes: &[Node], base: &NodePath) -> Option<DocumentEdit> {
    for (i, node) in nodes.iter().enumerate() {
        let NodeContent::Children(children) = &node.content else {
            continue;
        };
        let path = base.child(i);
        if children.is_empty() {
            return Some(DocumentEdit::DeleteNode { path });
        }
        for (j, child) in children.iter().enumerate() {
            let overflow = node.node_type == NodeType::HeroImage && j > 0;
            if overflow || !schema::allows_child(node.node_type, child.node_type) {
                return Some(DocumentEdit::DeleteNode {
                    path: path.child(j),
                });
            }
        }
        if let Some(fix) = nested_fix(children, &path) {
            return Some(fix);
        }
    }
    None
}
