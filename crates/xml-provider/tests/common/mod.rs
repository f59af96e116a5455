#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use xml_provider::{AttributeHandle, ElementHandle, HandleEvent, RootAdapter};
use xml_provider_tree::{NodeId, Tree};

/// Events from several handles, labelled by handle, in delivery order.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Rc<RefCell<Vec<(String, HandleEvent)>>>,
}

impl EventLog {
    fn sink(&self, label: &str) -> impl Fn(&HandleEvent) + 'static {
        let entries = Rc::clone(&self.entries);
        let label = label.to_owned();
        move |event: &HandleEvent| entries.borrow_mut().push((label.clone(), *event))
    }

    pub fn watch_element(&self, label: &str, handle: &ElementHandle) {
        handle.on_event(self.sink(label));
    }

    pub fn watch_attribute(&self, label: &str, handle: &AttributeHandle) {
        handle.on_event(self.sink(label));
    }

    pub fn watch_root(&self, label: &str, root: &RootAdapter) {
        root.on_event(self.sink(label));
    }

    pub fn entries(&self) -> Vec<(String, HandleEvent)> {
        self.entries.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Labels of the handles that fired `Added`, in order.
    pub fn added(&self) -> Vec<String> {
        self.labels_where(|event| matches!(event, HandleEvent::Added(_)))
    }

    pub fn removed(&self) -> Vec<String> {
        self.labels_where(|event| matches!(event, HandleEvent::Removed(_)))
    }

    pub fn descendant_changes(&self) -> Vec<String> {
        self.labels_where(|event| matches!(event, HandleEvent::DescendantChanged { .. }))
    }

    fn labels_where(&self, keep: impl Fn(&HandleEvent) -> bool) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, event)| keep(event))
            .map(|(label, _)| label.clone())
            .collect()
    }
}

/// Builds a chain of element handles, each below the previous one.
pub fn chain(root: &RootAdapter, keys: &[&str]) -> Vec<ElementHandle> {
    let mut handles: Vec<ElementHandle> = Vec::with_capacity(keys.len());
    for key in keys {
        let handle = match handles.last() {
            Some(parent) => ElementHandle::new(parent, key),
            None => ElementHandle::new(root, key),
        };
        handles.push(handle.unwrap());
    }
    handles
}

pub fn build(tree: &Tree, fixture: Value) -> NodeId {
    tree.build_json(&fixture).unwrap()
}

/// A handle resolves exactly when its locator finds a node below its
/// parent's resolved node.
pub fn assert_resolution_invariant(tree: &Tree, handles: &[ElementHandle], top: Option<NodeId>) {
    let mut parent = top;
    for handle in handles {
        let expected = parent.and_then(|node| tree.element(node, handle.search_key()));
        assert_eq!(
            handle.resolved_node(),
            expected,
            "handle {:?} out of sync with the tree",
            handle.search_key()
        );
        parent = expected;
    }
}
