use crate::NodeId;

/// Raw kind of a tree mutation, as seen by listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Add,
    Remove,
    Value,
    Name,
}

/// A single tree mutation.
///
/// `parent` is the parent of `source` when the mutation happened. For
/// [`MutationKind::Remove`] this is the former parent: by the time listeners
/// run, `source` is already detached. A removal is also delivered to the
/// listeners of every node freed with `source`, unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSignal {
    pub source: NodeId,
    pub kind: MutationKind,
    pub parent: Option<NodeId>,
}

impl MutationSignal {
    pub fn new(source: NodeId, kind: MutationKind, parent: Option<NodeId>) -> Self {
        Self {
            source,
            kind,
            parent,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.kind, MutationKind::Add | MutationKind::Remove)
    }
}
