//! Values derived from document content.

use crate::document::{Document, NodePath};
use crate::node::NodeType;

/// The first paragraph, in document order, whose trimmed text begins with a
/// letter or digit. Used for previews and excerpts.
///
/// Recomputed on every call; callers that need it per frame should keep the
/// document revision alongside the result.
pub fn first_meaningful_paragraph(doc: &Document) -> Option<NodePath> {
    doc.find_node(|node| {
        node.node_type == NodeType::Paragraph
            && node
                .text_content()
                .and_then(|t| t.trim_start().chars().next())
                .is_some_and(char::is_alphanumeric)
    })
}

/// Text of the first meaningful paragraph.
pub fn excerpt(doc: &Document) -> Option<&str> {
    let path = first_meaningful_paragraph(doc)?;
    doc.node(&path).and_then(|n| n.text_content()).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_skips_blank_and_punctuation_paragraphs() {
        let doc = Document::from_nodes(vec![
            Node::text(NodeType::Title, "Title"),
            Node::paragraph("   "),
            Node::text(NodeType::Heading, "Heading text"),
            Node::paragraph("— quoted"),
            Node::with_children(NodeType::Quote, vec![Node::paragraph("  2nd thing")]),
            Node::paragraph("later"),
        ])
        .unwrap();
        assert_eq!(
            first_meaningful_paragraph(&doc),
            Some(NodePath::from(vec![4, 0]))
        );
        assert_eq!(excerpt(&doc), Some("2nd thing"));
    }

    #[test]
    fn test_none_when_no_paragraph_qualifies() {
        let doc = Document::from_nodes(vec![
            Node::text(NodeType::Title, "Only a title"),
            Node::paragraph("..."),
        ])
        .unwrap();
        assert_eq!(first_meaningful_paragraph(&doc), None);
    }

    #[test]
    fn test_recomputed_after_edit() {
        let mut doc = Document::new();
        assert_eq!(first_meaningful_paragraph(&doc), None);
        doc.insert_text(&NodePath::from(vec![1]), 0, "Hello").unwrap();
        assert_eq!(
            first_meaningful_paragraph(&doc),
            Some(NodePath::from(vec![1]))
        );
    }
}
