use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};
use xml_provider_tree::{MutationSignal, NodeId, SubscriptionId, Tree, TreeError};

use crate::classify::{classify, is_freed_by, is_rename_below, ChangeKind};
use crate::container::{Container, StructureHook};
use crate::events::{
    DescendantChange, EventListener, EventSource, HandleEvent, ListenerId, StructureHooks,
};
use crate::options::HandleOptions;
use crate::sort::{NameSorter, Sorter};
use crate::HandleError;

struct RootInner {
    tree: Tree,
    node: Cell<Option<NodeId>>,
    subscription: Cell<Option<SubscriptionId>>,
    sorter: Rc<dyn Sorter>,
    options: HandleOptions,
    events: EventSource,
    structure: StructureHooks,
}

impl RootInner {
    fn announce(&self, event: HandleEvent) {
        self.events.emit(&event);
        if event.requires_refresh() {
            self.structure.emit(&());
        }
    }

    fn transition(this: &Rc<Self>, next: Option<NodeId>) {
        let prev = this.node.get();
        if prev == next {
            return;
        }
        if let Some(id) = this.subscription.take() {
            this.tree.unsubscribe(id);
        }
        if let Some(old) = prev {
            this.node.set(None);
            trace!(node = %old, "root released node");
            this.announce(HandleEvent::Removed(old));
        }
        if let Some(new) = next {
            if !this.tree.contains(new) {
                return;
            }
            this.node.set(Some(new));
            Self::subscribe(this, new);
            trace!(node = %new, "root wraps node");
            this.announce(HandleEvent::Added(new));
        }
    }

    fn subscribe(this: &Rc<Self>, node: NodeId) {
        let weak = Rc::downgrade(this);
        let subscribed = this.tree.subscribe(node, move |signal| {
            if let Some(inner) = weak.upgrade() {
                RootInner::on_signal(&inner, signal);
            }
        });
        match subscribed {
            Ok(id) => this.subscription.set(Some(id)),
            Err(err) => warn!(%node, %err, "root could not observe its node"),
        }
    }

    fn on_signal(this: &Rc<Self>, signal: &MutationSignal) {
        let Some(node) = this.node.get() else {
            return;
        };
        if is_freed_by(&this.tree, signal, node) {
            Self::transition(this, None);
            return;
        }
        let discriminate = this.options.discriminate_descendants;
        if is_rename_below(&this.tree, signal, node, discriminate) {
            this.structure.emit(&());
            return;
        }
        let change = match classify(&this.tree, signal, node, discriminate) {
            ChangeKind::None | ChangeKind::NameChanged => return,
            ChangeKind::ValueChanged => {
                this.announce(HandleEvent::ValueChanged(node));
                return;
            }
            ChangeKind::DescendantAdded => DescendantChange::Added,
            ChangeKind::DescendantRemoved => DescendantChange::Removed,
        };
        this.announce(HandleEvent::DescendantChanged {
            node,
            source: signal.source,
            change,
        });
    }
}

impl Drop for RootInner {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.tree.unsubscribe(id);
        }
    }
}

/// Top of a handle chain: wraps an existing document or element, or nothing
/// yet.
///
/// The adapter owns the ordering policy and the default [`HandleOptions`]
/// inherited by every handle below it. It has no locator; [`set_node`]
/// swaps the wrapped container and fires `Removed`/`Added` like any other
/// handle.
///
/// [`set_node`]: RootAdapter::set_node
#[derive(Clone)]
pub struct RootAdapter {
    inner: Rc<RootInner>,
}

impl fmt::Debug for RootAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootAdapter")
            .field("node", &self.inner.node.get())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl RootAdapter {
    /// An adapter that wraps nothing yet.
    pub fn new(tree: &Tree) -> Self {
        Self::builder(tree).build_empty()
    }

    pub fn with_node(tree: &Tree, node: NodeId) -> Result<Self, HandleError> {
        Self::builder(tree).node(node).build()
    }

    pub fn builder(tree: &Tree) -> RootAdapterBuilder {
        RootAdapterBuilder {
            tree: tree.clone(),
            node: None,
            sorter: None,
            options: HandleOptions::default(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.inner.tree
    }

    pub fn node(&self) -> Option<NodeId> {
        self.inner.node.get()
    }

    pub fn is_available(&self) -> bool {
        self.node().is_some()
    }

    /// Wraps `node` (a document or element), or nothing.
    pub fn set_node(&self, node: Option<NodeId>) -> Result<(), HandleError> {
        if let Some(node) = node {
            ensure_container(&self.inner.tree, node)?;
        }
        RootInner::transition(&self.inner, node);
        Ok(())
    }

    /// Re-checks that the wrapped node still exists.
    pub fn refresh(&self) {
        let current = self.node().filter(|node| self.inner.tree.contains(*node));
        RootInner::transition(&self.inner, current);
    }

    /// Always fails: the root has nothing to detach from.
    pub fn remove(&self) -> Result<(), HandleError> {
        Err(HandleError::RootRemoval)
    }

    pub fn options(&self) -> HandleOptions {
        self.inner.options
    }

    pub fn sorter(&self) -> Rc<dyn Sorter> {
        Rc::clone(&self.inner.sorter)
    }

    pub fn sort_children(&self) -> Result<(), HandleError> {
        if let Some(node) = self.node() {
            self.inner.sorter.sort_children(&self.inner.tree, node)?;
        }
        Ok(())
    }

    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + 'static,
    {
        self.inner.events.on(Rc::new(listener))
    }

    pub fn off_event(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.events.len()
    }

    /// Number of live handles directly below the adapter.
    pub fn child_handle_count(&self) -> usize {
        self.inner.structure.len()
    }
}

impl Container for RootAdapter {
    fn tree(&self) -> &Tree {
        &self.inner.tree
    }

    fn resolved_node(&self) -> Option<NodeId> {
        self.node()
    }

    fn has_creator(&self) -> bool {
        false
    }

    fn parent_container(&self) -> Option<Rc<dyn Container>> {
        None
    }

    fn can_be_created(&self) -> bool {
        self.node().is_some()
    }

    fn create_if_missing(&self) -> Option<NodeId> {
        self.node()
    }

    fn materialize(&self) -> Option<NodeId> {
        self.node()
    }

    fn sorter(&self) -> Rc<dyn Sorter> {
        RootAdapter::sorter(self)
    }

    fn options(&self) -> HandleOptions {
        self.inner.options
    }

    fn subscribe_events(&self, listener: EventListener) -> ListenerId {
        self.inner.events.on(listener)
    }

    fn unsubscribe_events(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    fn watch_structure(&self, hook: StructureHook) -> ListenerId {
        self.inner.structure.on(Rc::new(move |_: &()| hook()))
    }

    fn unwatch_structure(&self, id: ListenerId) -> bool {
        self.inner.structure.off(id)
    }
}

pub struct RootAdapterBuilder {
    tree: Tree,
    node: Option<NodeId>,
    sorter: Option<Rc<dyn Sorter>>,
    options: HandleOptions,
}

impl RootAdapterBuilder {
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn sorter<S: Sorter + 'static>(mut self, sorter: S) -> Self {
        self.sorter = Some(Rc::new(sorter));
        self
    }

    pub fn options(mut self, options: HandleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<RootAdapter, HandleError> {
        if let Some(node) = self.node {
            ensure_container(&self.tree, node)?;
        }
        let node = self.node;
        let root = self.build_empty();
        RootInner::transition(&root.inner, node);
        Ok(root)
    }

    fn build_empty(self) -> RootAdapter {
        RootAdapter {
            inner: Rc::new(RootInner {
                tree: self.tree,
                node: Cell::new(None),
                subscription: Cell::new(None),
                sorter: self.sorter.unwrap_or_else(|| Rc::new(NameSorter)),
                options: self.options,
                events: EventSource::default(),
                structure: StructureHooks::default(),
            }),
        }
    }
}

fn ensure_container(tree: &Tree, node: NodeId) -> Result<(), TreeError> {
    match tree.kind(node) {
        None => Err(TreeError::UnknownNode(node)),
        Some(kind) if !kind.is_container() => Err(TreeError::NotAContainer(node)),
        Some(_) => Ok(()),
    }
}
