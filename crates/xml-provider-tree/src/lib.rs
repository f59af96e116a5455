//! Observable XML-like tree for xml-provider.
//!
//! A [`Tree`] is an arena of documents, elements and attributes addressed by
//! [`NodeId`]. Every structural change raises a [`MutationSignal`] that
//! bubbles from the changed node up through its ancestors; listeners are
//! registered per node with [`Tree::subscribe`].
//!
//! The tree is single-threaded and assumes one logical writer.

mod error;
pub mod json_ml;
mod node;
mod observers;
mod signal;
mod tree;

pub use error::TreeError;
pub use json_ml::{JsonMlElement, JsonMlNode, Tag};
pub use node::{is_valid_name, NodeId, NodeKind};
pub use observers::SubscriptionId;
pub use signal::{MutationKind, MutationSignal};
pub use tree::Tree;
