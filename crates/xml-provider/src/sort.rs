//! Ordering policies for materialized children.

use std::cmp::Ordering;
use std::collections::HashMap;

use xml_provider_tree::{NodeId, Tree, TreeError};

/// Stable insertion sort with a custom comparator.
///
/// Children lists are short and usually nearly sorted, where this runs in
/// O(n); equal elements keep their relative order.
pub fn insertion_sort_by<T, F>(arr: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    let len = arr.len();
    for i in 1..len {
        let mut j = i;
        while j > 0 && compare(&arr[j - 1], &arr[j]) == Ordering::Greater {
            arr.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn compare_names(tree: &Tree, a: NodeId, b: NodeId) -> Ordering {
    tree.name(a).cmp(&tree.name(b))
}

/// Decides where new children go and how existing ones are normalized.
///
/// Handles that materialize a node attach it through [`Sorter::add_child`],
/// never by appending directly.
pub trait Sorter {
    fn compare_children(&self, tree: &Tree, a: NodeId, b: NodeId) -> Ordering {
        compare_names(tree, a, b)
    }

    fn compare_attributes(&self, tree: &Tree, a: NodeId, b: NodeId) -> Ordering {
        compare_names(tree, a, b)
    }

    fn add_child(&self, tree: &Tree, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        tree.append_child(parent, child)
    }

    fn sort_children(&self, tree: &Tree, parent: NodeId) -> Result<(), TreeError> {
        let mut order = tree.children(parent);
        insertion_sort_by(&mut order, |a, b| self.compare_children(tree, *a, *b));
        tree.reorder_children(parent, &order)
    }

    fn sort_attributes(&self, tree: &Tree, element: NodeId) -> Result<(), TreeError> {
        let mut order = tree.attributes(element);
        insertion_sort_by(&mut order, |a, b| self.compare_attributes(tree, *a, *b));
        tree.reorder_attributes(element, &order)
    }
}

/// Lexicographic by name; inserts append in O(1) and order is only
/// normalized by an explicit sort.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameSorter;

impl Sorter for NameSorter {}

/// Fixed element order, e.g. one mandated by a schema.
///
/// Names outside the schema go after the known ones; ties keep document
/// order. New children are inserted directly at their ranked position.
#[derive(Debug, Clone, Default)]
pub struct SchemaSorter {
    ranks: HashMap<String, usize>,
}

impl SchemaSorter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ranks = HashMap::new();
        for (rank, name) in names.into_iter().enumerate() {
            ranks.entry(name.into()).or_insert(rank);
        }
        Self { ranks }
    }

    fn rank(&self, tree: &Tree, node: NodeId) -> usize {
        tree.name(node)
            .and_then(|name| self.ranks.get(&name).copied())
            .unwrap_or(usize::MAX)
    }
}

impl Sorter for SchemaSorter {
    fn compare_children(&self, tree: &Tree, a: NodeId, b: NodeId) -> Ordering {
        self.rank(tree, a).cmp(&self.rank(tree, b))
    }

    fn add_child(&self, tree: &Tree, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let siblings = tree.children(parent);
        let index = siblings
            .iter()
            .position(|sibling| self.compare_children(tree, child, *sibling) == Ordering::Less)
            .unwrap_or(siblings.len());
        tree.insert_child(parent, index, child)
    }
}
