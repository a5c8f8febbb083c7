//! Document node types.
//!
//! The node set is closed: every behaviour keyed on node type is an
//! exhaustive `match` over [`NodeType`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Every node type the editor knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Title,
    Subtitle,
    HeroImage,
    Paragraph,
    Heading,
    List,
    Quote,
    Code,
    TaskList,
    Media,
    Footnotes,
}

/// How a node stores its content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// A single run of text; the caret can sit anywhere inside it.
    Text,
    /// An ordered sequence of child nodes.
    Children,
    /// No content and no interior cursor positions.
    Atom,
}

impl NodeType {
    pub const ALL: [NodeType; 11] = [
        NodeType::Title,
        NodeType::Subtitle,
        NodeType::HeroImage,
        NodeType::Paragraph,
        NodeType::Heading,
        NodeType::List,
        NodeType::Quote,
        NodeType::Code,
        NodeType::TaskList,
        NodeType::Media,
        NodeType::Footnotes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Title => "title",
            NodeType::Subtitle => "subtitle",
            NodeType::HeroImage => "heroImage",
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::List => "list",
            NodeType::Quote => "quote",
            NodeType::Code => "code",
            NodeType::TaskList => "taskList",
            NodeType::Media => "media",
            NodeType::Footnotes => "footnotes",
        }
    }

    pub fn content_kind(self) -> ContentKind {
        match self {
            NodeType::Title
            | NodeType::Subtitle
            | NodeType::Paragraph
            | NodeType::Heading
            | NodeType::Code => ContentKind::Text,
            NodeType::HeroImage
            | NodeType::List
            | NodeType::Quote
            | NodeType::TaskList
            | NodeType::Footnotes => ContentKind::Children,
            NodeType::Media => ContentKind::Atom,
        }
    }

    /// Whether the caret can be placed inside this node's text.
    pub fn is_text_bearing(self) -> bool {
        self.content_kind() == ContentKind::Text
    }

    /// Whether this type may appear in the body block region of the root.
    pub fn is_block(self) -> bool {
        match self {
            NodeType::Paragraph
            | NodeType::Heading
            | NodeType::List
            | NodeType::Quote
            | NodeType::Code
            | NodeType::TaskList
            | NodeType::Media => true,
            NodeType::Title | NodeType::Subtitle | NodeType::HeroImage | NodeType::Footnotes => {
                false
            }
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a type name is not one of [`NodeType::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub SmolStr);

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNodeType(s.into()))
    }
}

/// Returns whether the node type admits no internal cursor positions.
pub fn is_node_atomic(node_type: NodeType) -> bool {
    node_type.content_kind() == ContentKind::Atom
}

/// A node attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(SmolStr),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.into())
    }
}

impl From<SmolStr> for AttrValue {
    fn from(s: SmolStr) -> Self {
        AttrValue::String(s)
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s.into())
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<u32> for AttrValue {
    fn from(i: u32) -> Self {
        AttrValue::Int(i as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

/// Attribute map. Ordered so serialization is deterministic.
pub type Attrs = BTreeMap<SmolStr, AttrValue>;

/// Node content, matching the node's [`ContentKind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeContent {
    Text(String),
    Children(Vec<Node>),
    Atom,
}

/// A typed node in the document tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attrs,
    pub content: NodeContent,
}

impl Node {
    /// Create an empty node of the given type.
    ///
    /// Containers start with no children, which the schema rejects for
    /// everything but a freshly built subtree; use [`Node::with_children`].
    pub fn empty(node_type: NodeType) -> Self {
        let content = match node_type.content_kind() {
            ContentKind::Text => NodeContent::Text(String::new()),
            ContentKind::Children => NodeContent::Children(Vec::new()),
            ContentKind::Atom => NodeContent::Atom,
        };
        Self {
            node_type,
            attrs: Attrs::new(),
            content,
        }
    }

    /// Create a text-bearing node. Falls back to [`Node::empty`] content for
    /// types that do not hold text.
    pub fn text(node_type: NodeType, text: impl Into<String>) -> Self {
        let mut node = Self::empty(node_type);
        if node_type.is_text_bearing() {
            node.content = NodeContent::Text(text.into());
        }
        node
    }

    pub fn with_children(node_type: NodeType, children: Vec<Node>) -> Self {
        let mut node = Self::empty(node_type);
        if node_type.content_kind() == ContentKind::Children {
            node.content = NodeContent::Children(children);
        }
        node
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::text(NodeType::Paragraph, text)
    }

    pub fn media() -> Self {
        Self::empty(NodeType::Media)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn is_atomic(&self) -> bool {
        is_node_atomic(self.node_type)
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Character count of the node's text, zero for non-text nodes.
    pub fn text_len(&self) -> usize {
        self.text_content().map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn children(&self) -> &[Node] {
        match &self.content {
            NodeContent::Children(c) => c.as_slice(),
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.content {
            NodeContent::Children(c) => Some(c),
            _ => None,
        }
    }

    /// Size in linear positions: text nodes are `2 + chars`, atoms `1`,
    /// containers `2 + sum(children)`.
    pub fn node_size(&self) -> usize {
        match &self.content {
            NodeContent::Text(t) => 2 + t.chars().count(),
            NodeContent::Atom => 1,
            NodeContent::Children(c) => 2 + c.iter().map(Node::node_size).sum::<usize>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_roundtrip() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("image".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_only_media_is_atomic() {
        let atomic: Vec<_> = NodeType::ALL
            .into_iter()
            .filter(|t| is_node_atomic(*t))
            .collect();
        assert_eq!(atomic, vec![NodeType::Media]);
    }

    #[test]
    fn test_node_size() {
        assert_eq!(Node::paragraph("hello").node_size(), 7);
        assert_eq!(Node::media().node_size(), 1);
        let list = Node::with_children(
            NodeType::List,
            vec![Node::paragraph("a"), Node::paragraph("")],
        );
        assert_eq!(list.node_size(), 2 + 3 + 2);
    }

    #[test]
    fn test_serialized_type_names_are_camel_case() {
        let json = serde_json::to_string(&Node::empty(NodeType::TaskList)).unwrap();
        assert!(json.contains("\"taskList\""), "{json}");
    }
}
