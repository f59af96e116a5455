use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};
use xml_provider_tree::{is_valid_name, MutationSignal, NodeId, SubscriptionId, Tree};

use crate::classify::{classify, is_freed_by, ChangeKind};
use crate::container::{Container, StructureHook};
use crate::element::Locator;
use crate::events::{EventSource, HandleEvent, ListenerId};
use crate::options::HandleOptions;
use crate::HandleError;

struct AttributeInner {
    tree: Tree,
    parent: Rc<dyn Container>,
    key: String,
    locator: Locator,
    options: HandleOptions,
    resolved: Cell<Option<NodeId>>,
    tree_subscription: Cell<Option<SubscriptionId>>,
    parent_hook: Cell<Option<ListenerId>>,
    events: EventSource,
}

impl AttributeInner {
    fn refresh(this: &Rc<Self>) {
        loop {
            let prev = this.resolved.get();
            let next = this
                .parent
                .resolved_node()
                .and_then(|parent| (this.locator)(&this.tree, parent));
            if prev == next {
                return;
            }
            if let Some(id) = this.tree_subscription.take() {
                this.tree.unsubscribe(id);
            }
            if let Some(old) = prev {
                this.resolved.set(None);
                trace!(key = %this.key, node = %old, "attribute handle lost node");
                this.events.emit(&HandleEvent::Removed(old));
                continue;
            }
            if let Some(new) = next {
                this.resolved.set(Some(new));
                Self::observe(this, new);
                trace!(key = %this.key, node = %new, "attribute handle resolved node");
                this.events.emit(&HandleEvent::Added(new));
            }
            return;
        }
    }

    fn observe(this: &Rc<Self>, node: NodeId) {
        let weak = Rc::downgrade(this);
        let subscribed = this.tree.subscribe(node, move |signal| {
            if let Some(inner) = weak.upgrade() {
                AttributeInner::on_signal(&inner, signal);
            }
        });
        match subscribed {
            Ok(id) => this.tree_subscription.set(Some(id)),
            Err(err) => warn!(key = %this.key, %node, %err, "attribute could not observe its node"),
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
        match classify(&this.tree, signal, node, this.options.discriminate_descendants) {
            ChangeKind::ValueChanged => this.events.emit(&HandleEvent::ValueChanged(node)),
            ChangeKind::NameChanged => Self::refresh(this),
            ChangeKind::None | ChangeKind::DescendantAdded | ChangeKind::DescendantRemoved => {}
        }
    }
}

impl Drop for AttributeInner {
    fn drop(&mut self) {
        if let Some(id) = self.parent_hook.take() {
            self.parent.unwatch_structure(id);
        }
        if let Some(id) = self.tree_subscription.take() {
            self.tree.unsubscribe(id);
        }
    }
}

/// An attribute named by a search key on the parent handle's element.
///
/// Unlike an element, clearing an attribute's value removes it.
#[derive(Clone)]
pub struct AttributeHandle {
    inner: Rc<AttributeInner>,
}

impl fmt::Debug for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeHandle")
            .field("key", &self.inner.key)
            .field("resolved", &self.inner.resolved.get())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl AttributeHandle {
    pub fn new<P>(parent: &P, key: &str) -> Result<Self, HandleError>
    where
        P: Container + Clone + 'static,
    {
        Self::builder(key).parent(parent).build()
    }

    pub fn builder(key: &str) -> AttributeHandleBuilder {
        AttributeHandleBuilder {
            key: key.to_owned(),
            parent: None,
            locator: None,
            options: None,
            create_parent_if_missing: None,
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
        if self.is_available() || self.inner.parent.resolved_node().is_some() {
            return true;
        }
        self.inner.options.create_parent_if_missing && self.inner.parent.can_be_created()
    }

    pub fn refresh(&self) {
        AttributeInner::refresh(&self.inner);
    }

    /// Resolves the attribute, creating it with an empty value if needed.
    pub fn create_if_missing(&self) -> Option<NodeId> {
        if let Some(node) = self.resolved_node() {
            return Some(node);
        }
        if let Err(err) = self.write("") {
            warn!(key = %self.inner.key, %err, "could not create attribute");
            return None;
        }
        self.resolved_node()
    }

    pub fn value(&self) -> Option<String> {
        let node = self.resolved_node()?;
        Some(self.inner.tree.text(node).unwrap_or_default())
    }

    /// `Some` creates or updates the attribute; `None` removes it.
    pub fn set_value(&self, value: Option<&str>) -> Result<(), HandleError> {
        match value {
            Some(value) => self.write(value),
            None => self.remove(),
        }
    }

    pub fn remove(&self) -> Result<(), HandleError> {
        if let Some(node) = self.resolved_node() {
            self.inner.tree.remove(node)?;
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

    pub fn options(&self) -> HandleOptions {
        self.inner.options
    }

    fn write(&self, value: &str) -> Result<(), HandleError> {
        let inner = &self.inner;
        if let Some(node) = self.resolved_node() {
            inner.tree.set_text(node, value)?;
            return Ok(());
        }
        let element = match inner.parent.resolved_node() {
            Some(element) => Some(element),
            None if inner.options.create_parent_if_missing => inner.parent.create_if_missing(),
            None => None,
        };
        let Some(element) = element else {
            debug!(key = %inner.key, "attribute write dropped, parent is unresolved");
            return Ok(());
        };
        inner.tree.set_attribute(element, &inner.key, value)?;
        AttributeInner::refresh(inner);
        Ok(())
    }
}

pub struct AttributeHandleBuilder {
    key: String,
    parent: Option<Rc<dyn Container>>,
    locator: Option<Locator>,
    options: Option<HandleOptions>,
    create_parent_if_missing: Option<bool>,
}

impl AttributeHandleBuilder {
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

    pub fn locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&Tree, NodeId) -> Option<NodeId> + 'static,
    {
        self.locator = Some(Rc::new(locator));
        self
    }

    pub fn options(mut self, options: HandleOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn create_parent_if_missing(mut self, enabled: bool) -> Self {
        self.create_parent_if_missing = Some(enabled);
        self
    }

    pub fn build(self) -> Result<AttributeHandle, HandleError> {
        if self.key.trim().is_empty() {
            return Err(HandleError::EmptySearchKey);
        }
        if !is_valid_name(&self.key) {
            return Err(HandleError::InvalidSearchKey(self.key));
        }
        let parent = self.parent.ok_or(HandleError::MissingParent)?;
        let mut options = self.options.unwrap_or_else(|| parent.options());
        if let Some(enabled) = self.create_parent_if_missing {
            options.create_parent_if_missing = enabled;
        }
        let locator = self.locator.unwrap_or_else(|| {
            let key = self.key.clone();
            let locator: Locator =
                Rc::new(move |tree: &Tree, element: NodeId| tree.attribute(element, &key));
            locator
        });

        let inner = Rc::new(AttributeInner {
            tree: parent.tree().clone(),
            parent,
            key: self.key,
            locator,
            options,
            resolved: Cell::new(None),
            tree_subscription: Cell::new(None),
            parent_hook: Cell::new(None),
            events: EventSource::default(),
        });
        let weak = Rc::downgrade(&inner);
        let hook: StructureHook = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                AttributeInner::refresh(&inner);
            }
        });
        inner.parent_hook.set(Some(inner.parent.watch_structure(hook)));
        AttributeInner::refresh(&inner);
        Ok(AttributeHandle { inner })
    }
}
