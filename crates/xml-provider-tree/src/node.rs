use std::fmt;

use indexmap::IndexMap;

/// Identity of a node inside a [`Tree`](crate::Tree).
///
/// Ids come from a monotonically increasing counter and are never reused, so
/// two equal ids always denote the same node object, even after it was
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Top-level container holding at most one root element.
    Document,
    Element,
    Attribute,
}

impl NodeKind {
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    /// Empty for documents.
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: IndexMap<String, NodeId>,
    /// Element text, or the attribute value.
    pub text: Option<String>,
}

impl NodeData {
    pub fn document() -> Self {
        Self::new(NodeKind::Document, String::new(), None)
    }

    pub fn element(name: String) -> Self {
        Self::new(NodeKind::Element, name, None)
    }

    pub fn attribute(name: String, value: String) -> Self {
        Self::new(NodeKind::Attribute, name, Some(value))
    }

    fn new(kind: NodeKind, name: String, text: Option<String>) -> Self {
        Self {
            kind,
            name,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            text,
        }
    }
}

/// Node names are loose: non-empty, no whitespace.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}
