use thiserror::Error;
use xml_provider_tree::TreeError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("search key must not be empty or whitespace")]
    EmptySearchKey,
    #[error("search key {0:?} is not a valid node name")]
    InvalidSearchKey(String),
    #[error("handle has no parent")]
    MissingParent,
    #[error("a root adapter has no detach target and cannot be removed")]
    RootRemoval,
    #[error("tree operation failed: {0}")]
    Tree(#[from] TreeError),
}
