use std::rc::Rc;

use xml_provider_tree::{NodeId, Tree};

use crate::events::{EventListener, ListenerId};
use crate::options::HandleOptions;
use crate::sort::Sorter;

/// Upper bound on the length of a parent chain walk.
///
/// Chains are acyclic by construction (a parent exists before its child);
/// the bound turns an accidental cycle into a failed assertion rather than a
/// hang.
pub const MAX_CHAIN_DEPTH: usize = 1024;

/// Callback run on a child handle when it must re-run its locator.
pub type StructureHook = Rc<dyn Fn()>;

/// A handle that other handles can sit under: a [`RootAdapter`] or an
/// [`ElementHandle`].
///
/// [`RootAdapter`]: crate::RootAdapter
/// [`ElementHandle`]: crate::ElementHandle
pub trait Container {
    fn tree(&self) -> &Tree;

    fn resolved_node(&self) -> Option<NodeId>;

    /// Whether this level can produce its own node once its parent exists.
    fn has_creator(&self) -> bool;

    fn parent_container(&self) -> Option<Rc<dyn Container>>;

    fn can_be_created(&self) -> bool;

    fn create_if_missing(&self) -> Option<NodeId>;

    /// Creates this level's node, assuming the parent is already resolved.
    fn materialize(&self) -> Option<NodeId>;

    fn sorter(&self) -> Rc<dyn Sorter>;

    fn options(&self) -> HandleOptions;

    fn subscribe_events(&self, listener: EventListener) -> ListenerId;

    fn unsubscribe_events(&self, id: ListenerId) -> bool;

    /// Registers `hook` to run whenever handles below this one must re-run
    /// their locator: after this handle's own transitions, after children
    /// were added or removed, and after a child was renamed.
    fn watch_structure(&self, hook: StructureHook) -> ListenerId;

    fn unwatch_structure(&self, id: ListenerId) -> bool;
}

/// Walks up from `start` until a resolved level (creatable) or a level that
/// cannot create (not creatable).
pub(crate) fn chain_can_be_created(start: &dyn Container) -> bool {
    if start.resolved_node().is_some() {
        return true;
    }
    if !start.has_creator() {
        return false;
    }
    let mut cur = start.parent_container();
    let mut depth = 0;
    while let Some(level) = cur {
        depth += 1;
        debug_assert!(depth <= MAX_CHAIN_DEPTH, "handle chain exceeds {MAX_CHAIN_DEPTH} levels");
        if depth > MAX_CHAIN_DEPTH {
            return false;
        }
        if level.resolved_node().is_some() {
            return true;
        }
        if !level.has_creator() {
            return false;
        }
        cur = level.parent_container();
    }
    false
}

/// Materializes every missing level between the first resolved ancestor and
/// `start`, top-down.
pub(crate) fn chain_create_if_missing(start: &dyn Container) -> Option<NodeId> {
    if let Some(node) = start.resolved_node() {
        return Some(node);
    }
    if !chain_can_be_created(start) {
        return None;
    }
    let mut pending: Vec<Rc<dyn Container>> = Vec::new();
    let mut cur = start.parent_container();
    while let Some(level) = cur {
        if level.resolved_node().is_some() {
            break;
        }
        debug_assert!(pending.len() < MAX_CHAIN_DEPTH);
        cur = level.parent_container();
        pending.push(level);
    }
    for level in pending.iter().rev() {
        level.materialize()?;
    }
    start.materialize()
}
