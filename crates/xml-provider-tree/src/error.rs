use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("node {0} cannot contain child elements")]
    NotAContainer(NodeId),
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0} is already attached")]
    AlreadyAttached(NodeId),
    #[error("node {0} is not attached")]
    NotAttached(NodeId),
    #[error("attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle { parent: NodeId, child: NodeId },
    #[error("element {element} already has an attribute named {name:?}")]
    DuplicateAttribute { element: NodeId, name: String },
    #[error("document {0} already has a root element")]
    MultipleRoots(NodeId),
    #[error("index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("reorder of {0} must be a permutation of its current members")]
    NotAPermutation(NodeId),
    #[error("invalid JsonML: {0}")]
    InvalidJsonMl(String),
}
