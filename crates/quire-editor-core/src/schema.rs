//! Structural grammar for documents.
//!
//! Root: `title subtitle? heroImage? block+ footnotes?`
//!
//! Containers:
//! - `heroImage`: exactly one `media`
//! - `list`, `taskList`, `footnotes`: `paragraph+`
//! - `quote`: `(paragraph | heading | code | list | media)+`

use smol_str::SmolStr;
use thiserror::Error;

use crate::node::{ContentKind, NodeType};

/// An edit was rejected because the resulting tree would break the grammar.
///
/// Schema violations are handled locally: the edit is simply not applied and
/// never reaches the replicated document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaViolation {
    /// The root does not start with a title.
    #[error("document must start with a title")]
    MissingTitle,

    /// A node type is not allowed at this position.
    #[error("{child} is not allowed in {parent} at index {index}")]
    UnexpectedNode {
        parent: SmolStr,
        child: NodeType,
        index: usize,
    },

    /// A required child is missing (e.g. no body block, empty list).
    #[error("{parent} requires at least one {expected}")]
    MissingContent {
        parent: SmolStr,
        expected: &'static str,
    },

    /// The path does not address a node.
    #[error("no node at path {0:?}")]
    InvalidPath(Vec<usize>),

    /// A text operation targeted a node without text.
    #[error("{0} does not hold text")]
    NotTextBearing(NodeType),

    /// A child operation targeted a node that has no children.
    #[error("{0} cannot have children")]
    NotContainer(NodeType),

    /// A text offset or range lies outside the node's text.
    #[error("offset {offset} out of range for text of length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    /// The node content does not match its type.
    #[error("content of {0} does not match its type")]
    ContentMismatch(NodeType),

    /// The operation only applies to another node type.
    #[error("expected {expected}, found {found}")]
    WrongNodeType { expected: NodeType, found: NodeType },

    /// The node type cannot be changed to the requested one.
    #[error("cannot change {from} into {to}")]
    TypeChangeNotAllowed { from: NodeType, to: NodeType },
}

/// Root label used in violation messages.
pub const ROOT: &str = "doc";

/// Grammar for the children of a container node type.
pub fn allows_child(parent: NodeType, child: NodeType) -> bool {
    match parent {
        NodeType::HeroImage => child == NodeType::Media,
        NodeType::List | NodeType::TaskList | NodeType::Footnotes => {
            child == NodeType::Paragraph
        }
        NodeType::Quote => matches!(
            child,
            NodeType::Paragraph
                | NodeType::Heading
                | NodeType::Code
                | NodeType::List
                | NodeType::Media
        ),
        NodeType::Title
        | NodeType::Subtitle
        | NodeType::Paragraph
        | NodeType::Heading
        | NodeType::Code
        | NodeType::Media => false,
    }
}

/// Maximum number of children a container accepts, if bounded.
fn max_children(parent: NodeType) -> Option<usize> {
    match parent {
        NodeType::HeroImage => Some(1),
        _ => None,
    }
}

/// Validate the child sequence of a container node.
pub fn validate_children(parent: NodeType, children: &[NodeType]) -> Result<(), SchemaViolation> {
    if parent.content_kind() != ContentKind::Children {
        return Err(SchemaViolation::NotContainer(parent));
    }
    if children.is_empty() {
        return Err(SchemaViolation::MissingContent {
            parent: parent.as_str().into(),
            expected: "child",
        });
    }
    for (index, child) in children.iter().enumerate() {
        if !allows_child(parent, *child) {
            return Err(SchemaViolation::UnexpectedNode {
                parent: parent.as_str().into(),
                child: *child,
                index,
            });
        }
    }
    if let Some(max) = max_children(parent) {
        if children.len() > max {
            return Err(SchemaViolation::UnexpectedNode {
                parent: parent.as_str().into(),
                child: children[max],
                index: max,
            });
        }
    }
    Ok(())
}

/// Validate the root child sequence against
/// `title subtitle? heroImage? block+ footnotes?`.
pub fn validate_root(children: &[NodeType]) -> Result<(), SchemaViolation> {
    let mut iter = children.iter().copied().enumerate().peekable();

    match iter.next() {
        Some((_, NodeType::Title)) => {}
        _ => return Err(SchemaViolation::MissingTitle),
    }
    if let Some((_, NodeType::Subtitle)) = iter.peek() {
        iter.next();
    }
    if let Some((_, NodeType::HeroImage)) = iter.peek() {
        iter.next();
    }

    let mut blocks = 0;
    while let Some((_, t)) = iter.peek() {
        if !t.is_block() {
            break;
        }
        blocks += 1;
        iter.next();
    }
    if blocks == 0 {
        if let Some((index, child)) = iter.peek().copied() {
            if child != NodeType::Footnotes {
                return Err(SchemaViolation::UnexpectedNode {
                    parent: ROOT.into(),
                    child,
                    index,
                });
            }
        }
        return Err(SchemaViolation::MissingContent {
            parent: ROOT.into(),
            expected: "block",
        });
    }

    if let Some((_, NodeType::Footnotes)) = iter.peek() {
        iter.next();
    }

    match iter.next() {
        None => Ok(()),
        Some((index, child)) => Err(SchemaViolation::UnexpectedNode {
            parent: ROOT.into(),
            child,
            index,
        }),
    }
}

/// Types a node may be toggled between without touching its content.
pub fn can_change_type(from: NodeType, to: NodeType) -> bool {
    if from == to {
        return true;
    }
    let text_blocks = [NodeType::Paragraph, NodeType::Heading, NodeType::Code];
    let item_containers = [NodeType::List, NodeType::TaskList, NodeType::Quote];
    (text_blocks.contains(&from) && text_blocks.contains(&to))
        || (item_containers.contains(&from) && item_containers.contains(&to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use NodeType::*;

    #[test]
    fn test_minimal_root() {
        assert!(validate_root(&[Title, Paragraph]).is_ok());
        assert!(validate_root(&[Title, Subtitle, HeroImage, Media, Footnotes]).is_ok());
        assert!(validate_root(&[Title, HeroImage, List, Quote, Code]).is_ok());
    }

    #[test]
    fn test_root_requires_title_first() {
        assert_eq!(validate_root(&[]), Err(SchemaViolation::MissingTitle));
        assert_eq!(
            validate_root(&[Paragraph, Title]),
            Err(SchemaViolation::MissingTitle)
        );
    }

    #[test]
    fn test_root_requires_block() {
        assert!(matches!(
            validate_root(&[Title, Subtitle]),
            Err(SchemaViolation::MissingContent { .. })
        ));
        assert!(matches!(
            validate_root(&[Title, Footnotes]),
            Err(SchemaViolation::MissingContent { .. })
        ));
    }

    #[test]
    fn test_subtitle_and_hero_only_after_title() {
        assert_eq!(
            validate_root(&[Title, Paragraph, Subtitle]),
            Err(SchemaViolation::UnexpectedNode {
                parent: ROOT.into(),
                child: Subtitle,
                index: 2
            })
        );
        assert!(validate_root(&[Title, HeroImage, Subtitle, Paragraph]).is_err());
        assert!(validate_root(&[Title, Title, Paragraph]).is_err());
        assert!(validate_root(&[Title, Subtitle, Subtitle, Paragraph]).is_err());
    }

    #[test]
    fn test_footnotes_must_be_last() {
        assert!(validate_root(&[Title, Paragraph, Footnotes, Paragraph]).is_err());
    }

    #[test]
    fn test_container_grammar() {
        assert!(validate_children(List, &[Paragraph, Paragraph]).is_ok());
        assert!(validate_children(List, &[]).is_err());
        assert!(validate_children(List, &[Media]).is_err());
        assert!(validate_children(HeroImage, &[Media]).is_ok());
        assert!(validate_children(HeroImage, &[Media, Media]).is_err());
        assert!(validate_children(Quote, &[Paragraph, Media, List]).is_ok());
        assert_eq!(
            validate_children(Paragraph, &[Paragraph]),
            Err(SchemaViolation::NotContainer(Paragraph))
        );
    }

    #[test]
    fn test_type_changes() {
        assert!(can_change_type(Paragraph, Heading));
        assert!(can_change_type(List, TaskList));
        assert!(!can_change_type(Paragraph, List));
        assert!(!can_change_type(Title, Paragraph));
        assert!(!can_change_type(Media, Paragraph));
    }
}
