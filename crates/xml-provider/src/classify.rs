//! Decides whether a raw tree signal matters to a given node.

use xml_provider_tree::{MutationKind, MutationSignal, NodeId, Tree};

/// Meaning of a [`MutationSignal`] relative to a reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    None,
    NameChanged,
    ValueChanged,
    DescendantAdded,
    DescendantRemoved,
}

/// Classifies `signal` relative to `reference`.
///
/// - On the reference itself, `Value` and `Name` map to `ValueChanged` and
///   `NameChanged`.
/// - Add/remove strictly below the reference map to `DescendantAdded` /
///   `DescendantRemoved`. With `discriminate_descendants`, only immediate
///   children and attributes are reported; deeper changes are left to the
///   intermediate node so one change is not reported at every level.
/// - Everything else is `ChangeKind::None`.
///
/// Ancestry is taken from `signal.parent`, which for removals is the former
/// parent: the removed node itself is already detached.
pub fn classify(
    tree: &Tree,
    signal: &MutationSignal,
    reference: NodeId,
    discriminate_descendants: bool,
) -> ChangeKind {
    if signal.source == reference {
        return match signal.kind {
            MutationKind::Value => ChangeKind::ValueChanged,
            MutationKind::Name => ChangeKind::NameChanged,
            MutationKind::Add | MutationKind::Remove => ChangeKind::None,
        };
    }
    let structural = match signal.kind {
        MutationKind::Add => ChangeKind::DescendantAdded,
        MutationKind::Remove => ChangeKind::DescendantRemoved,
        MutationKind::Value | MutationKind::Name => return ChangeKind::None,
    };
    let Some(parent) = signal.parent else {
        return ChangeKind::None;
    };
    if parent == reference {
        return structural;
    }
    if !discriminate_descendants && tree.is_ancestor(reference, parent) {
        return structural;
    }
    ChangeKind::None
}

/// Whether `signal` renames a node directly below `reference` (or, without
/// discrimination, anywhere below it). A rename can make a node start or stop
/// matching the locator of a handle under `reference`.
pub(crate) fn is_rename_below(
    tree: &Tree,
    signal: &MutationSignal,
    reference: NodeId,
    discriminate_descendants: bool,
) -> bool {
    if signal.kind != MutationKind::Name || signal.source == reference {
        return false;
    }
    match signal.parent {
        Some(parent) if parent == reference => true,
        Some(parent) => !discriminate_descendants && tree.is_ancestor(reference, parent),
        None => false,
    }
}

/// Whether `signal` freed `node`, either directly or along with an ancestor.
/// A reorder also raises `Remove` on a node, but leaves it in the tree.
pub(crate) fn is_freed_by(tree: &Tree, signal: &MutationSignal, node: NodeId) -> bool {
    signal.kind == MutationKind::Remove && !tree.contains(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        tree: Tree,
        root: NodeId,
        child: NodeId,
        leaf: NodeId,
    }

    fn fixture() -> Fixture {
        let tree = Tree::new();
        let root = tree
            .build_json(&json!(["root", {"id": "r"}, ["child", ["leaf"]]]))
            .unwrap();
        let child = tree.element(root, "child").unwrap();
        let leaf = tree.element(child, "leaf").unwrap();
        Fixture {
            tree,
            root,
            child,
            leaf,
        }
    }

    fn signal(source: NodeId, kind: MutationKind, parent: Option<NodeId>) -> MutationSignal {
        MutationSignal::new(source, kind, parent)
    }

    #[test]
    fn own_value_and_name() {
        let f = fixture();
        let value = signal(f.child, MutationKind::Value, Some(f.root));
        let name = signal(f.child, MutationKind::Name, Some(f.root));
        assert_eq!(classify(&f.tree, &value, f.child, true), ChangeKind::ValueChanged);
        assert_eq!(classify(&f.tree, &name, f.child, false), ChangeKind::NameChanged);
    }

    #[test]
    fn own_structural_change_is_ignored() {
        let f = fixture();
        let removed = signal(f.child, MutationKind::Remove, Some(f.root));
        assert_eq!(classify(&f.tree, &removed, f.child, true), ChangeKind::None);
    }

    #[test]
    fn immediate_child_add_and_remove() {
        let f = fixture();
        let added = signal(f.child, MutationKind::Add, Some(f.root));
        let removed = signal(f.child, MutationKind::Remove, Some(f.root));
        for discriminate in [true, false] {
            assert_eq!(
                classify(&f.tree, &added, f.root, discriminate),
                ChangeKind::DescendantAdded
            );
            assert_eq!(
                classify(&f.tree, &removed, f.root, discriminate),
                ChangeKind::DescendantRemoved
            );
        }
    }

    #[test]
    fn attribute_counts_as_immediate() {
        let f = fixture();
        let attr = f.tree.attribute(f.root, "id").unwrap();
        let added = signal(attr, MutationKind::Add, Some(f.root));
        assert_eq!(classify(&f.tree, &added, f.root, true), ChangeKind::DescendantAdded);
    }

    #[test]
    fn nested_changes_depend_on_discrimination() {
        let f = fixture();
        let added = signal(f.leaf, MutationKind::Add, Some(f.child));
        assert_eq!(classify(&f.tree, &added, f.root, true), ChangeKind::None);
        assert_eq!(
            classify(&f.tree, &added, f.root, false),
            ChangeKind::DescendantAdded
        );
        assert_eq!(classify(&f.tree, &added, f.child, true), ChangeKind::DescendantAdded);
    }

    #[test]
    fn descendant_value_changes_are_not_reported() {
        let f = fixture();
        let value = signal(f.leaf, MutationKind::Value, Some(f.child));
        assert_eq!(classify(&f.tree, &value, f.root, false), ChangeKind::None);
    }

    #[test]
    fn unrelated_nodes_are_ignored() {
        let f = fixture();
        let other = f.tree.create_element("other").unwrap();
        let stray = f.tree.create_element("stray").unwrap();
        let added = signal(stray, MutationKind::Add, Some(other));
        assert_eq!(classify(&f.tree, &added, f.root, false), ChangeKind::None);
        let added_above = signal(f.root, MutationKind::Add, Some(other));
        assert_eq!(classify(&f.tree, &added_above, f.child, false), ChangeKind::None);
    }

    #[test]
    fn renames_below_reference() {
        let f = fixture();
        let child = signal(f.child, MutationKind::Name, Some(f.root));
        let leaf = signal(f.leaf, MutationKind::Name, Some(f.child));
        assert!(is_rename_below(&f.tree, &child, f.root, true));
        assert!(!is_rename_below(&f.tree, &child, f.child, true));
        assert!(!is_rename_below(&f.tree, &leaf, f.root, true));
        assert!(is_rename_below(&f.tree, &leaf, f.root, false));
        // still a rename, classified separately
        assert_eq!(classify(&f.tree, &child, f.root, false), ChangeKind::None);
    }

    #[test]
    fn freed_only_when_gone_from_the_tree() {
        let f = fixture();
        let moved = signal(f.child, MutationKind::Remove, Some(f.root));
        assert!(!is_freed_by(&f.tree, &moved, f.child));

        f.tree.remove(f.child).unwrap();
        assert!(is_freed_by(&f.tree, &moved, f.child));
        assert!(is_freed_by(&f.tree, &moved, f.leaf));
        let value = signal(f.child, MutationKind::Value, Some(f.root));
        assert!(!is_freed_by(&f.tree, &value, f.leaf));
    }

    #[test]
    fn classification_is_deterministic() {
        let f = fixture();
        let removed = signal(f.leaf, MutationKind::Remove, Some(f.child));
        let first = classify(&f.tree, &removed, f.root, false);
        let second = classify(&f.tree, &removed, f.root, false);
        assert_eq!(first, second);
        assert_eq!(first, ChangeKind::DescendantRemoved);
    }
}
