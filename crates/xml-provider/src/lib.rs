//! Reactive handles over a mutable XML-like tree.
//!
//! A handle names a position ("the `port` element below `config`") rather
//! than a node. It resolves to a node when one matches, follows the tree as
//! it changes, and materializes the position (with any missing ancestors) on
//! write. Handles form a chain under a [`RootAdapter`]:
//!
//! - [`ElementHandle`] locates a child element and can host further handles.
//! - [`AttributeHandle`] locates an attribute of its parent's element.
//! - [`RootAdapter`] wraps an existing document or element, or nothing yet.
//!
//! Consumers observe [`HandleEvent`]s: `Added`/`Removed` when a handle gains
//! or loses its node, `ValueChanged` and `DescendantChanged`. Where new nodes
//! go is decided by the root's [`Sorter`].
//!
//! Everything is single-threaded and synchronous; events are delivered
//! before the mutating call returns.

mod attribute;
mod classify;
mod container;
mod element;
mod error;
mod events;
mod options;
mod root;
mod sort;

pub use attribute::{AttributeHandle, AttributeHandleBuilder};
pub use classify::{classify, ChangeKind};
pub use container::{Container, StructureHook, MAX_CHAIN_DEPTH};
pub use element::{Creator, ElementHandle, ElementHandleBuilder, Locator};
pub use error::HandleError;
pub use events::{DescendantChange, EventListener, HandleEvent, ListenerId};
pub use options::HandleOptions;
pub use root::{RootAdapter, RootAdapterBuilder};
pub use sort::{insertion_sort_by, NameSorter, SchemaSorter, Sorter};

pub use xml_provider_tree as tree;
