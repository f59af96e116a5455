use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use xml_provider_tree::NodeId;

pub type ListenerId = u64;

pub type EventListener = Rc<dyn Fn(&HandleEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescendantChange {
    Added,
    Removed,
}

/// Notification raised by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEvent {
    /// The handle resolved to `node`.
    Added(NodeId),
    /// The handle lost `node`.
    Removed(NodeId),
    ValueChanged(NodeId),
    /// `source` was added below or removed from `node`.
    DescendantChanged {
        node: NodeId,
        source: NodeId,
        change: DescendantChange,
    },
}

impl HandleEvent {
    /// Whether handles below the emitter must re-run their locator.
    pub fn requires_refresh(&self) -> bool {
        !matches!(self, HandleEvent::ValueChanged(_))
    }
}

/// Multicast registry, invoked in registration order.
///
/// Emission snapshots the listener ids and releases every borrow before a
/// listener runs: listeners may register, unregister or trigger nested
/// emissions. A listener unregistered mid-emission is skipped.
pub(crate) struct Registry<T: ?Sized> {
    next_id: Cell<ListenerId>,
    listeners: RefCell<BTreeMap<ListenerId, Rc<dyn Fn(&T)>>>,
}

/// Public [`HandleEvent`] listeners of a handle.
pub(crate) type EventSource = Registry<HandleEvent>;

/// Child handles waiting to re-run their locator.
pub(crate) type StructureHooks = Registry<()>;

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(1),
            listeners: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn on(&self, listener: Rc<dyn Fn(&T)>) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        self.listeners.borrow_mut().insert(id, listener);
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn emit(&self, value: &T) {
        let ids: Vec<ListenerId> = self.listeners.borrow().keys().copied().collect();
        for id in ids {
            let listener = self.listeners.borrow().get(&id).cloned();
            if let Some(listener) = listener {
                listener(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xml_provider_tree::Tree;

    fn some_node() -> NodeId {
        Tree::new().create_document()
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let source = EventSource::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            source.on(Rc::new(move |_: &HandleEvent| seen.borrow_mut().push(tag)));
        }
        source.emit(&HandleEvent::ValueChanged(some_node()));
        assert_eq!(seen.borrow().as_slice(), &["first", "second"]);
    }

    #[test]
    fn listener_removed_mid_emission_is_skipped() {
        let source = Rc::new(EventSource::default());
        let calls = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        {
            let source_ref = Rc::downgrade(&source);
            let second = Rc::clone(&second);
            source.on(Rc::new(move |_: &HandleEvent| {
                if let Some(source) = source_ref.upgrade() {
                    source.off(second.get());
                }
            }));
        }
        {
            let calls = Rc::clone(&calls);
            second.set(source.on(Rc::new(move |_: &HandleEvent| calls.set(calls.get() + 1))));
        }
        source.emit(&HandleEvent::ValueChanged(some_node()));
        assert_eq!(calls.get(), 0);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn unit_registry_counts_calls() {
        let hooks = StructureHooks::default();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let id = hooks.on(Rc::new(move |_: &()| counter.set(counter.get() + 1)));
        hooks.emit(&());
        assert!(hooks.off(id));
        hooks.emit(&());
        assert_eq!(calls.get(), 1);
        assert!(!hooks.off(id));
    }

    #[test]
    fn only_value_changes_skip_refresh() {
        let node = some_node();
        assert!(!HandleEvent::ValueChanged(node).requires_refresh());
        assert!(HandleEvent::Added(node).requires_refresh());
        assert!(HandleEvent::Removed(node).requires_refresh());
        assert!(HandleEvent::DescendantChanged {
            node,
            source: node,
            change: DescendantChange::Added,
        }
        .requires_refresh());
    }
}
