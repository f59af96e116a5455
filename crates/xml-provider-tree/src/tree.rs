use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::node::{is_valid_name, NodeData};
use crate::observers::{Observers, SubscriptionId};
use crate::{MutationKind, MutationSignal, NodeId, NodeKind, TreeError};

#[derive(Default)]
struct Arena {
    nodes: HashMap<NodeId, NodeData>,
    next_id: u64,
}

impl Arena {
    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, data);
        id
    }

    fn get(&self, id: NodeId) -> Result<&NodeData, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))
    }

    fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|data| data.parent)
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = self.parent_of(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.parent_of(id);
        }
        false
    }

    /// Drops `id` and everything below it, returning the dropped ids.
    fn free_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut freed = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(data) = self.nodes.remove(&cur) {
                stack.extend(data.children);
                stack.extend(data.attributes.values().copied());
                freed.push(cur);
            }
        }
        freed
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(data) = self.nodes.get(&id) else {
            return;
        };
        if let Some(text) = &data.text {
            out.push_str(text);
        }
        for child in &data.children {
            self.collect_text(*child, out);
        }
    }
}

#[derive(Default)]
struct TreeInner {
    arena: RefCell<Arena>,
    observers: RefCell<Observers>,
}

/// Shared, single-threaded XML-like tree.
///
/// Cloning a `Tree` clones the handle, not the nodes. Every structural
/// mutation emits a [`MutationSignal`] that bubbles from the affected node
/// through each of its ancestors, invoking the listeners registered on those
/// nodes synchronously and in order. No internal borrow is held while a
/// listener runs, so listeners may query, subscribe and mutate re-entrantly.
#[derive(Clone, Default)]
pub struct Tree {
    inner: Rc<TreeInner>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &Tree) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.inner.arena.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.inner.arena.borrow().nodes.get(&id).map(f)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.arena.borrow().nodes.contains_key(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.read(id, |data| data.kind)
    }

    pub fn name(&self, id: NodeId) -> Option<String> {
        self.read(id, |data| data.name.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.arena.borrow().parent_of(id)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.parent(id).is_some()
    }

    /// `true` when `ancestor` sits strictly above `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.arena.borrow().is_ancestor(ancestor, node)
    }

    /// Number of ancestors above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let arena = self.inner.arena.borrow();
        let mut depth = 0;
        let mut cur = arena.parent_of(id);
        while let Some(parent) = cur {
            depth += 1;
            cur = arena.parent_of(parent);
        }
        depth
    }

    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        let arena = self.inner.arena.borrow();
        arena.nodes.get(&id)?;
        let mut cur = id;
        while let Some(parent) = arena.parent_of(cur) {
            cur = parent;
        }
        Some(cur)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.read(id, |data| data.children.clone()).unwrap_or_default()
    }

    pub fn attributes(&self, id: NodeId) -> Vec<NodeId> {
        self.read(id, |data| data.attributes.values().copied().collect())
            .unwrap_or_default()
    }

    /// First child element of `parent` named `name`.
    pub fn element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let arena = self.inner.arena.borrow();
        let data = arena.nodes.get(&parent)?;
        data.children
            .iter()
            .copied()
            .find(|child| arena.nodes.get(child).is_some_and(|c| c.name == name))
    }

    pub fn elements(&self, parent: NodeId, name: &str) -> Vec<NodeId> {
        let arena = self.inner.arena.borrow();
        let Some(data) = arena.nodes.get(&parent) else {
            return Vec::new();
        };
        data.children
            .iter()
            .copied()
            .filter(|child| arena.nodes.get(child).is_some_and(|c| c.name == name))
            .collect()
    }

    /// The root element of a document.
    pub fn document_element(&self, document: NodeId) -> Option<NodeId> {
        self.read(document, |data| match data.kind {
            NodeKind::Document => data.children.first().copied(),
            _ => None,
        })
        .flatten()
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<NodeId> {
        self.read(element, |data| data.attributes.get(name).copied())
            .flatten()
    }

    pub fn attribute_value(&self, element: NodeId, name: &str) -> Option<String> {
        let attr = self.attribute(element, name)?;
        self.text(attr)
    }

    /// Own text of an element, or the value of an attribute.
    pub fn text(&self, id: NodeId) -> Option<String> {
        self.read(id, |data| data.text.clone()).flatten()
    }

    /// Text of `id` and all of its descendants, in document order.
    pub fn text_content(&self, id: NodeId) -> Option<String> {
        let arena = self.inner.arena.borrow();
        arena.nodes.get(&id)?;
        let mut out = String::new();
        arena.collect_text(id, &mut out);
        Some(out)
    }

    // ── Construction ──────────────────────────────────────────────────────

    pub fn create_document(&self) -> NodeId {
        self.inner.arena.borrow_mut().alloc(NodeData::document())
    }

    /// Creates a detached element.
    pub fn create_element(&self, name: &str) -> Result<NodeId, TreeError> {
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName(name.to_owned()));
        }
        Ok(self
            .inner
            .arena
            .borrow_mut()
            .alloc(NodeData::element(name.to_owned())))
    }

    /// Frees a detached subtree without emitting any signal.
    pub fn discard(&self, id: NodeId) -> Result<(), TreeError> {
        let freed = {
            let mut arena = self.inner.arena.borrow_mut();
            if arena.get(id)?.parent.is_some() {
                return Err(TreeError::AlreadyAttached(id));
            }
            arena.free_subtree(id)
        };
        self.forget(freed);
        Ok(())
    }

    // ── Structural mutation ───────────────────────────────────────────────

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let len = self
            .read(parent, |data| data.children.len())
            .ok_or(TreeError::UnknownNode(parent))?;
        self.insert_child(parent, len, child)
    }

    pub fn insert_child(
        &self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        {
            let mut arena = self.inner.arena.borrow_mut();
            let parent_data = arena.get(parent)?;
            if !parent_data.kind.is_container() {
                return Err(TreeError::NotAContainer(parent));
            }
            if parent_data.kind == NodeKind::Document && !parent_data.children.is_empty() {
                return Err(TreeError::MultipleRoots(parent));
            }
            let len = parent_data.children.len();
            if index > len {
                return Err(TreeError::IndexOutOfBounds { index, len });
            }
            let child_data = arena.get(child)?;
            if child_data.kind != NodeKind::Element {
                return Err(TreeError::NotAnElement(child));
            }
            if child_data.parent.is_some() {
                return Err(TreeError::AlreadyAttached(child));
            }
            if child == parent || arena.is_ancestor(child, parent) {
                return Err(TreeError::WouldCreateCycle { parent, child });
            }
            arena.get_mut(child)?.parent = Some(parent);
            arena.get_mut(parent)?.children.insert(index, child);
        }
        self.notify(MutationSignal::new(child, MutationKind::Add, Some(parent)));
        Ok(())
    }

    /// Detaches an element or attribute and frees its subtree.
    pub fn remove(&self, id: NodeId) -> Result<(), TreeError> {
        let (parent, freed) = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get(id)?;
            let parent = data.parent.ok_or(TreeError::NotAttached(id))?;
            let kind = data.kind;
            let name = data.name.clone();
            let parent_data = arena.get_mut(parent)?;
            match kind {
                NodeKind::Attribute => {
                    parent_data.attributes.shift_remove(&name);
                }
                _ => parent_data.children.retain(|child| *child != id),
            }
            (parent, arena.free_subtree(id))
        };
        let signal = MutationSignal::new(id, MutationKind::Remove, Some(parent));
        self.notify(signal);
        // listeners below the removed node hear the same signal before they
        // are dropped; `freed` lists ancestors before descendants
        for node in freed.iter().filter(|node| **node != id) {
            self.dispatch(*node, &signal);
        }
        self.forget(freed);
        Ok(())
    }

    /// Swaps an attached element for a detached one at the same position.
    pub fn replace(&self, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        let (parent, index) = {
            let arena = self.inner.arena.borrow();
            let old_data = arena.get(old)?;
            if old_data.kind != NodeKind::Element {
                return Err(TreeError::NotAnElement(old));
            }
            let parent = old_data.parent.ok_or(TreeError::NotAttached(old))?;
            let new_data = arena.get(new)?;
            if new_data.kind != NodeKind::Element {
                return Err(TreeError::NotAnElement(new));
            }
            if new_data.parent.is_some() {
                return Err(TreeError::AlreadyAttached(new));
            }
            if arena.is_ancestor(new, parent) {
                return Err(TreeError::WouldCreateCycle { parent, child: new });
            }
            let index = arena
                .get(parent)?
                .children
                .iter()
                .position(|child| *child == old)
                .unwrap_or(0);
            (parent, index)
        };
        self.remove(old)?;
        let len = self
            .read(parent, |data| data.children.len())
            .ok_or(TreeError::UnknownNode(parent))?;
        self.insert_child(parent, index.min(len), new)
    }

    /// Creates or updates an attribute. Unchanged values emit nothing.
    pub fn set_attribute(
        &self,
        element: NodeId,
        name: &str,
        value: &str,
    ) -> Result<NodeId, TreeError> {
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName(name.to_owned()));
        }
        let (attr, kind) = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get(element)?;
            if data.kind != NodeKind::Element {
                return Err(TreeError::NotAnElement(element));
            }
            match data.attributes.get(name).copied() {
                Some(attr) => {
                    let attr_data = arena.get_mut(attr)?;
                    if attr_data.text.as_deref() == Some(value) {
                        return Ok(attr);
                    }
                    attr_data.text = Some(value.to_owned());
                    (attr, MutationKind::Value)
                }
                None => {
                    let mut data = NodeData::attribute(name.to_owned(), value.to_owned());
                    data.parent = Some(element);
                    let attr = arena.alloc(data);
                    arena
                        .get_mut(element)?
                        .attributes
                        .insert(name.to_owned(), attr);
                    (attr, MutationKind::Add)
                }
            }
        };
        self.notify(MutationSignal::new(attr, kind, Some(element)));
        Ok(attr)
    }

    /// Returns whether an attribute was removed.
    pub fn remove_attribute(&self, element: NodeId, name: &str) -> Result<bool, TreeError> {
        let attr = self
            .read(element, |data| data.attributes.get(name).copied())
            .ok_or(TreeError::UnknownNode(element))?;
        match attr {
            Some(attr) => {
                self.remove(attr)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sets element text or an attribute value.
    pub fn set_text(&self, id: NodeId, text: &str) -> Result<(), TreeError> {
        let parent = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get_mut(id)?;
            if data.kind == NodeKind::Document {
                return Err(TreeError::NotAnElement(id));
            }
            if data.text.as_deref() == Some(text) {
                return Ok(());
            }
            data.text = Some(text.to_owned());
            data.parent
        };
        self.notify(MutationSignal::new(id, MutationKind::Value, parent));
        Ok(())
    }

    /// Drops the text of an element, keeping the element. Returns whether
    /// there was any text.
    pub fn clear_text(&self, element: NodeId) -> Result<bool, TreeError> {
        let parent = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get_mut(element)?;
            if data.kind != NodeKind::Element {
                return Err(TreeError::NotAnElement(element));
            }
            if data.text.take().is_none() {
                return Ok(false);
            }
            data.parent
        };
        self.notify(MutationSignal::new(element, MutationKind::Value, parent));
        Ok(true)
    }

    pub fn rename(&self, id: NodeId, name: &str) -> Result<(), TreeError> {
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName(name.to_owned()));
        }
        let parent = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get(id)?;
            if data.kind == NodeKind::Document {
                return Err(TreeError::NotAnElement(id));
            }
            if data.name == name {
                return Ok(());
            }
            let kind = data.kind;
            let parent = data.parent;
            let old_name = data.name.clone();
            if let (NodeKind::Attribute, Some(element)) = (kind, parent) {
                let attributes = &mut arena.get_mut(element)?.attributes;
                if attributes.contains_key(name) {
                    return Err(TreeError::DuplicateAttribute {
                        element,
                        name: name.to_owned(),
                    });
                }
                if let Some(index) = attributes.get_index_of(&old_name) {
                    attributes.shift_remove_index(index);
                    attributes.shift_insert(index, name.to_owned(), id);
                }
            }
            arena.get_mut(id)?.name = name.to_owned();
            parent
        };
        self.notify(MutationSignal::new(id, MutationKind::Name, parent));
        Ok(())
    }

    /// Puts the children of `parent` into `order`, which must be a
    /// permutation of the current children. Each child whose position changed
    /// is reported as detached and re-attached: a `Remove` followed by an
    /// `Add`, both raised once the new order is in place.
    pub fn reorder_children(&self, parent: NodeId, order: &[NodeId]) -> Result<(), TreeError> {
        let moved = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get_mut(parent)?;
            if !is_permutation(&data.children, order) {
                return Err(TreeError::NotAPermutation(parent));
            }
            let moved = moved_members(&data.children, order);
            data.children = order.to_vec();
            moved
        };
        for child in moved {
            self.notify(MutationSignal::new(child, MutationKind::Remove, Some(parent)));
            self.notify(MutationSignal::new(child, MutationKind::Add, Some(parent)));
        }
        Ok(())
    }

    /// Attribute counterpart of [`Tree::reorder_children`].
    pub fn reorder_attributes(&self, element: NodeId, order: &[NodeId]) -> Result<(), TreeError> {
        let moved = {
            let mut arena = self.inner.arena.borrow_mut();
            let data = arena.get_mut(element)?;
            let current: Vec<NodeId> = data.attributes.values().copied().collect();
            if !is_permutation(&current, order) {
                return Err(TreeError::NotAPermutation(element));
            }
            let moved = moved_members(&current, order);
            let names: HashMap<NodeId, String> = data
                .attributes
                .iter()
                .map(|(name, id)| (*id, name.clone()))
                .collect();
            data.attributes = order
                .iter()
                .filter_map(|id| names.get(id).map(|name| (name.clone(), *id)))
                .collect();
            moved
        };
        for attr in moved {
            self.notify(MutationSignal::new(attr, MutationKind::Remove, Some(element)));
            self.notify(MutationSignal::new(attr, MutationKind::Add, Some(element)));
        }
        Ok(())
    }

    // ── Signals ───────────────────────────────────────────────────────────

    /// Registers `listener` for every signal raised on `node` or anywhere
    /// beneath it. When `node` is freed, its listeners hear the `Remove` that
    /// freed it (whose source may be an ancestor) and are then dropped.
    pub fn subscribe<F>(&self, node: NodeId, listener: F) -> Result<SubscriptionId, TreeError>
    where
        F: Fn(&MutationSignal) + 'static,
    {
        if !self.contains(node) {
            return Err(TreeError::UnknownNode(node));
        }
        Ok(self
            .inner
            .observers
            .borrow_mut()
            .subscribe(node, Rc::new(listener)))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.borrow_mut().unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    fn forget(&self, freed: Vec<NodeId>) {
        let mut observers = self.inner.observers.borrow_mut();
        for id in freed {
            observers.forget_node(id);
        }
    }

    fn notify(&self, signal: MutationSignal) {
        let path = {
            let arena = self.inner.arena.borrow();
            let mut path = vec![signal.source];
            let mut cur = signal.parent;
            while let Some(id) = cur {
                path.push(id);
                cur = arena.parent_of(id);
            }
            path
        };
        trace!(
            source = %signal.source,
            kind = ?signal.kind,
            levels = path.len(),
            "dispatching tree signal"
        );
        for node in path {
            self.dispatch(node, &signal);
        }
    }

    fn dispatch(&self, node: NodeId, signal: &MutationSignal) {
        let ids = self.inner.observers.borrow().ids_for(node);
        for id in ids {
            let listener = self.inner.observers.borrow().get(node, id);
            if let Some(listener) = listener {
                listener(signal);
            }
        }
    }
}

fn is_permutation(current: &[NodeId], order: &[NodeId]) -> bool {
    if current.len() != order.len() {
        return false;
    }
    let mut a = current.to_vec();
    let mut b = order.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

fn moved_members(current: &[NodeId], order: &[NodeId]) -> Vec<NodeId> {
    order
        .iter()
        .zip(current)
        .filter(|(next, prev)| next != prev)
        .map(|(next, _)| *next)
        .collect()
}
