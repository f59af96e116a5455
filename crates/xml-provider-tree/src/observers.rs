use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::{MutationSignal, NodeId};

/// Token returned by [`Tree::subscribe`](crate::Tree::subscribe).
pub type SubscriptionId = u64;

pub(crate) type Listener = Rc<dyn Fn(&MutationSignal)>;

/// Per-node listener registry.
///
/// Listeners are `Rc`'d so a dispatch can clone one out and release the
/// registry borrow before invoking it; callbacks are free to subscribe,
/// unsubscribe or mutate the tree.
pub(crate) struct Observers {
    next_id: SubscriptionId,
    by_node: HashMap<NodeId, BTreeMap<SubscriptionId, Listener>>,
    owners: HashMap<SubscriptionId, NodeId>,
}

impl Default for Observers {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_node: HashMap::new(),
            owners: HashMap::new(),
        }
    }
}

impl Observers {
    pub fn subscribe(&mut self, node: NodeId, listener: Listener) -> SubscriptionId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.by_node.entry(node).or_default().insert(id, listener);
        self.owners.insert(id, node);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(node) = self.owners.remove(&id) else {
            return false;
        };
        if let Some(listeners) = self.by_node.get_mut(&node) {
            listeners.remove(&id);
            if listeners.is_empty() {
                self.by_node.remove(&node);
            }
        }
        true
    }

    /// Ids in registration order.
    pub fn ids_for(&self, node: NodeId) -> Vec<SubscriptionId> {
        self.by_node
            .get(&node)
            .map(|listeners| listeners.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, node: NodeId, id: SubscriptionId) -> Option<Listener> {
        self.by_node.get(&node)?.get(&id).cloned()
    }

    pub fn forget_node(&mut self, node: NodeId) {
        if let Some(listeners) = self.by_node.remove(&node) {
            for id in listeners.keys() {
                self.owners.remove(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }
}
