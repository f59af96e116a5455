use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};
use xml_provider_tree::{
    is_valid_name, MutationSignal, NodeId, SubscriptionId, Tree, TreeError,
};

use crate::classify::{classify, is_freed_by, is_rename_below, ChangeKind};
use crate::container::{chain_can_be_created, chain_create_if_missing, Container, StructureHook};
use crate::events::{
    DescendantChange, EventListener, EventSource, HandleEvent, ListenerId, StructureHooks,
};
use crate::options::HandleOptions;
use crate::sort::Sorter;
use crate::HandleError;

/// Finds a handle's node below its parent's resolved node.
pub type Locator = Rc<dyn Fn(&Tree, NodeId) -> Option<NodeId>>;

/// Produces a detached node for a handle whose parent is resolved.
pub type Creator = Rc<dyn Fn(&Tree, NodeId) -> Result<NodeId, TreeError>>;

struct ElementInner {
    tree: Tree,
    parent: Rc<dyn Container>,
    key: String,
    locator: Locator,
    creator: Option<Creator>,
    options: HandleOptions,
    sorter: Rc<dyn Sorter>,
    resolved: Cell<Option<NodeId>>,
    tree_subscription: Cell<Option<SubscriptionId>>,
    parent_hook: Cell<Option<ListenerId>>,
    events: EventSource,
    structure: StructureHooks,
}

impl ElementInner {
    fn locate(&self) -> Option<NodeId> {
        let parent = self.parent.resolved_node()?;
        (self.locator)(&self.tree, parent)
    }

    /// Delivers `event` to listeners, then lets child handles catch up.
    fn announce(&self, event: HandleEvent) {
        self.events.emit(&event);
        if event.requires_refresh() {
            self.structure.emit(&());
        }
    }

    /// Re-runs the locator until the resolved node matches it.
    ///
    /// Listeners may mutate the tree while `Removed` is delivered, so the
    /// locator is consulted again before settling on a new node.
    fn refresh(this: &Rc<Self>) {
        loop {
            let prev = this.resolved.get();
            let next = this.locate();
            if prev == next {
                return;
            }
            if let Some(id) = this.tree_subscription.take() {
                this.tree.unsubscribe(id);
            }
            if let Some(old) = prev {
                this.resolved.set(None);
                trace!(key = %this.key, node = %old, "handle lost node");
                this.announce(HandleEvent::Removed(old));
                continue;
            }
            if let Some(new) = next {
                this.resolved.set(Some(new));
                Self::observe(this, new);
                trace!(key = %this.key, node = %new, "handle resolved node");
                this.announce(HandleEvent::Added(new));
            }
            return;
        }
    }

    fn observe(this: &Rc<Self>, node: NodeId) {
        let weak = Rc::downgrade(this);
        let subscribed = this.tree.subscribe(node, move |signal| {
            if let Some(inner) = weak.upgrade() {
                ElementInner::on_signal(&inner, signal);
            }
        });
        match subscribed {
            Ok(id) => this.tree_subscription.set(Some(id)),
            Err(err) => warn!(key = %this.key, %node, %err, "handle could not observe its node"),
        }
    }

    fn on_signal(this: &Rc<Self>, signal: &MutationSignal) {
        let Some(node) = this.resolved.get() else {
            return;
        };
        if is_freed_by(&this.tree, signal, node) {
            Self::refresh(this);
            return;
        }
        let discriminate = this.options.discriminate_descendants;
        if is_rename_below(&this.tree, signal, node, discriminate) {
            this.structure.emit(&());
            return;
        }
        let change = match classify(&this.tree, signal, node, discriminate) {
            ChangeKind::None => return,
            ChangeKind::NameChanged => {
                Self::refresh(this);
                return;
            }
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

    fn materialize(this: &Rc<Self>) -> Option<NodeId> {
        if let Some(node) = this.resolved.get() {
            return Some(node);
        }
        let parent = this.parent.resolved_node()?;
        let creator = this.creator.as_ref()?;
        let node = match creator(&this.tree, parent) {
            Ok(node) => node,
            Err(err) => {
                warn!(key = %this.key, %err, "creator failed");
                return None;
            }
        };
        if this.tree.parent(node) != Some(parent) {
            if let Err(err) = this.sorter.add_child(&this.tree, parent, node) {
                warn!(key = %this.key, %node, %err, "could not attach created node");
                if !this.tree.is_attached(node) {
                    if let Err(err) = this.tree.discard(node) {
                        debug!(%node, %err, "created node left in the arena");
                    }
                }
                return None;
            }
        }
        Self::refresh(this);
        let resolved = this.resolved.get();
        if resolved.is_none() {
            warn!(key = %this.key, %node, "locator does not find the created node");
        }
        resolved
    }
}

impl Drop for ElementInner {
    fn drop(&mut self) {
        if let Some(id) = self.parent_hook.take() {
            self.parent.unwatch_structure(id);
        }
        if let Some(id) = self.tree_subscription.take() {
            self.tree.unsubscribe(id);
        }
    }
}

/// A position in the tree named by a search key below a parent handle.
///
/// The handle follows its node as the tree changes: it resolves when a
/// matching node appears, lets go when the node disappears and re-resolves
/// when its parent does. Writes materialize the node (and missing ancestors)
/// on demand.
///
/// ```
/// use serde_json::json;
/// use xml_provider::{ElementHandle, RootAdapter};
/// use xml_provider_tree::Tree;
///
/// let tree = Tree::new();
/// let doc = tree.build_json(&json!(["", ["config"]])).unwrap();
/// let root = RootAdapter::with_node(&tree, doc).unwrap();
/// let config = ElementHandle::new(&root, "config").unwrap();
/// let port = ElementHandle::new(&config, "port").unwrap();
///
/// assert!(!port.is_available());
/// port.set_value(Some("8080")).unwrap();
/// assert_eq!(port.value().as_deref(), Some("8080"));
/// ```
#[derive(Clone)]
pub struct ElementHandle {
    inner: Rc<ElementInner>,
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("key", &self.inner.key)
            .field("resolved", &self.inner.resolved.get())
            .field("creatable", &self.inner.creator.is_some())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl ElementHandle {
    /// A handle for the first child element named `key` below `parent`.
    pub fn new<P>(parent: &P, key: &str) -> Result<Self, HandleError>
    where
        P: Container + Clone + 'static,
    {
        Self::builder(key).parent(parent).build()
    }

    pub fn builder(key: &str) -> ElementHandleBuilder {
        ElementHandleBuilder {
            key: key.to_owned(),
            parent: None,
            locator: None,
            creator: None,
            observe_only: false,
            options: None,
            discriminate_descendants: None,
        }
    }

    pub fn search_key(&self) -> &str {
        &self.inner.key
    }

    pub fn parent(&self) -> Rc<dyn Container> {
        Rc::clone(&self.inner.parent)
    }

    pub fn tree(&self) -> &Tree {
        &self.inner.tree
    }

    pub fn resolved_node(&self) -> Option<NodeId> {
        self.inner.resolved.get()
    }

    pub fn is_available(&self) -> bool {
        self.resolved_node().is_some()
    }

    pub fn can_be_created(&self) -> bool {
        chain_can_be_created(self)
    }

    pub fn refresh(&self) {
        ElementInner::refresh(&self.inner);
    }

    /// Resolves this handle, creating it and any missing ancestor levels.
    pub fn create_if_missing(&self) -> Option<NodeId> {
        chain_create_if_missing(self)
    }

    /// Own text of the node, `""` if it has none, `None` if unresolved.
    pub fn value(&self) -> Option<String> {
        let node = self.resolved_node()?;
        Some(self.inner.tree.text(node).unwrap_or_default())
    }

    /// `Some` writes text, creating the node first when needed. `None` drops
    /// the text but keeps the element.
    pub fn set_value(&self, value: Option<&str>) -> Result<(), HandleError> {
        match value {
            Some(text) => {
                let Some(node) = self.create_if_missing() else {
                    debug!(key = %self.inner.key, "value dropped, handle cannot be created");
                    return Ok(());
                };
                self.inner.tree.set_text(node, text)?;
            }
            None => {
                if let Some(node) = self.resolved_node() {
                    self.inner.tree.clear_text(node)?;
                }
            }
        }
        Ok(())
    }

    /// Detaches the resolved node from the tree; does nothing if unresolved.
    pub fn remove(&self) -> Result<(), HandleError> {
        if let Some(node) = self.resolved_node() {
            self.inner.tree.remove(node)?;
        }
        Ok(())
    }

    pub fn sort_children(&self) -> Result<(), HandleError> {
        if let Some(node) = self.resolved_node() {
            self.inner.sorter.sort_children(&self.inner.tree, node)?;
        }
        Ok(())
    }

    pub fn sort_attributes(&self) -> Result<(), HandleError> {
        if let Some(node) = self.resolved_node() {
            self.inner.sorter.sort_attributes(&self.inner.tree, node)?;
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

    /// Number of live handles directly below this one.
    pub fn child_handle_count(&self) -> usize {
        self.inner.structure.len()
    }

    pub fn options(&self) -> HandleOptions {
        self.inner.options
    }
}

impl Container for ElementHandle {
    fn tree(&self) -> &Tree {
        &self.inner.tree
    }

    fn resolved_node(&self) -> Option<NodeId> {
        self.inner.resolved.get()
    }

    fn has_creator(&self) -> bool {
        self.inner.creator.is_some()
    }

    fn parent_container(&self) -> Option<Rc<dyn Container>> {
        Some(Rc::clone(&self.inner.parent))
    }

    fn can_be_created(&self) -> bool {
        ElementHandle::can_be_created(self)
    }

    fn create_if_missing(&self) -> Option<NodeId> {
        ElementHandle::create_if_missing(self)
    }

    fn materialize(&self) -> Option<NodeId> {
        ElementInner::materialize(&self.inner)
    }

    fn sorter(&self) -> Rc<dyn Sorter> {
        Rc::clone(&self.inner.sorter)
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

pub struct ElementHandleBuilder {
    key: String,
    parent: Option<Rc<dyn Container>>,
    locator: Option<Locator>,
    creator: Option<Creator>,
    observe_only: bool,
    options: Option<HandleOptions>,
    discriminate_descendants: Option<bool>,
}

impl ElementHandleBuilder {
    pub fn parent<P>(self, parent: &P) -> Self
    where
        P: Container + Clone + 'static,
    {
        self.parent_container(Rc::new(parent.clone()))
    }

    pub fn parent_container(mut self, parent: Rc<dyn Container>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Replaces the default "first child element named key" lookup.
    pub fn locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&Tree, NodeId) -> Option<NodeId> + 'static,
    {
        self.locator = Some(Rc::new(locator));
        self
    }

    /// Replaces the default `create_element(key)` creator.
    pub fn creator<F>(mut self, creator: F) -> Self
    where
        F: Fn(&Tree, NodeId) -> Result<NodeId, TreeError> + 'static,
    {
        self.creator = Some(Rc::new(creator));
        self.observe_only = false;
        self
    }

    /// The handle never creates its node.
    pub fn observe_only(mut self) -> Self {
        self.creator = None;
        self.observe_only = true;
        self
    }

    pub fn options(mut self, options: HandleOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn discriminate_descendants(mut self, enabled: bool) -> Self {
        self.discriminate_descendants = Some(enabled);
        self
    }

    pub fn build(self) -> Result<ElementHandle, HandleError> {
        if self.key.trim().is_empty() {
            return Err(HandleError::EmptySearchKey);
        }
        if !is_valid_name(&self.key) {
            return Err(HandleError::InvalidSearchKey(self.key));
        }
        let parent = self.parent.ok_or(HandleError::MissingParent)?;
        let mut options = self.options.unwrap_or_else(|| parent.options());
        if let Some(enabled) = self.discriminate_descendants {
            options.discriminate_descendants = enabled;
        }
        let locator = self.locator.unwrap_or_else(|| {
            let key = self.key.clone();
            let locator: Locator =
                Rc::new(move |tree: &Tree, parent: NodeId| tree.element(parent, &key));
            locator
        });
        let creator = match (self.creator, self.observe_only) {
            (_, true) => None,
            (Some(creator), false) => Some(creator),
            (None, false) => {
                let key = self.key.clone();
                let creator: Creator =
                    Rc::new(move |tree: &Tree, _parent: NodeId| tree.create_element(&key));
                Some(creator)
            }
        };

        let inner = Rc::new(ElementInner {
            tree: parent.tree().clone(),
            sorter: parent.sorter(),
            parent,
            key: self.key,
            locator,
            creator,
            options,
            resolved: Cell::new(None),
            tree_subscription: Cell::new(None),
            parent_hook: Cell::new(None),
            events: EventSource::default(),
            structure: StructureHooks::default(),
        });
        let weak = Rc::downgrade(&inner);
        let hook: StructureHook = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                ElementInner::refresh(&inner);
            }
        });
        inner.parent_hook.set(Some(inner.parent.watch_structure(hook)));
        ElementInner::refresh(&inner);
        Ok(ElementHandle { inner })
    }
}
