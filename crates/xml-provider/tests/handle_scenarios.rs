mod common;

use std::cmp::Ordering;

use common::{build, EventLog};
use serde_json::json;
use xml_provider::{
    AttributeHandle, DescendantChange, ElementHandle, HandleError, HandleEvent, HandleOptions,
    NameSorter, RootAdapter, SchemaSorter, Sorter,
};
use xml_provider_tree::{NodeId, Tree};

/// Orders children by their `n` attribute.
struct SortByN;

impl Sorter for SortByN {
    fn compare_children(&self, tree: &Tree, a: NodeId, b: NodeId) -> Ordering {
        tree.attribute_value(a, "n").cmp(&tree.attribute_value(b, "n"))
    }
}

#[test]
fn parent_name_scenario() {
    let tree = Tree::new();
    let root = RootAdapter::new(&tree);
    let parent = ElementHandle::new(&root, "parent").unwrap();
    let name = ElementHandle::new(&parent, "name").unwrap();
    assert!(!name.can_be_created());
    name.set_value(Some("ignored")).unwrap();
    assert!(tree.is_empty());

    let doc = build(&tree, json!(["", ["parent"]]));
    root.set_node(Some(doc)).unwrap();
    assert!(parent.is_available());
    assert!(name.can_be_created());

    name.set_value(Some("42")).unwrap();
    assert_eq!(name.value().as_deref(), Some("42"));
    assert_eq!(
        tree.to_json(doc),
        Some(json!(["", ["parent", ["name", "42"]]]))
    );
}

#[test]
fn null_clears_element_text_but_removes_attributes() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["item", {"id": "7"}, "text"]]));
    let root = RootAdapter::with_node(&tree, doc).unwrap();
    let item = ElementHandle::new(&root, "item").unwrap();
    let id = AttributeHandle::new(&item, "id").unwrap();

    item.set_value(None).unwrap();
    assert!(item.is_available());
    assert_eq!(item.value().as_deref(), Some(""));

    id.set_value(None).unwrap();
    assert!(!id.is_available());
    assert_eq!(id.value(), None);
    assert_eq!(tree.to_json(doc), Some(json!(["", ["item"]])));
}

#[test]
fn name_sorter_normalizes_created_children() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["list"]]));
    let root = RootAdapter::builder(&tree)
        .node(doc)
        .sorter(NameSorter)
        .build()
        .unwrap();
    let list = ElementHandle::new(&root, "list").unwrap();
    let b = ElementHandle::new(&list, "b").unwrap();
    let a = ElementHandle::new(&list, "a").unwrap();

    b.create_if_missing().unwrap();
    a.create_if_missing().unwrap();
    assert_eq!(tree.to_json(doc), Some(json!(["", ["list", ["b"], ["a"]]])));

    let log = EventLog::default();
    log.watch_element("list", &list);
    log.watch_element("a", &a);
    log.watch_element("b", &b);
    list.sort_children().unwrap();

    assert_eq!(tree.to_json(doc), Some(json!(["", ["list", ["a"], ["b"]]])));
    // reordering keeps both handles on their nodes
    assert!(log.added().is_empty());
    assert!(log.removed().is_empty());
    // each moved child is reported detached, then re-attached
    let a_node = a.resolved_node().unwrap();
    let b_node = b.resolved_node().unwrap();
    let changes: Vec<(NodeId, DescendantChange)> = log
        .entries()
        .into_iter()
        .filter_map(|(_, event)| match event {
            HandleEvent::DescendantChanged { source, change, .. } => Some((source, change)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (a_node, DescendantChange::Removed),
            (a_node, DescendantChange::Added),
            (b_node, DescendantChange::Removed),
            (b_node, DescendantChange::Added),
        ]
    );
}

#[test]
fn sorting_hands_a_key_to_the_new_first_match() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["list", ["item", {"n": "2"}], ["item", {"n": "1"}]]]));
    let root = RootAdapter::builder(&tree)
        .node(doc)
        .sorter(SortByN)
        .build()
        .unwrap();
    let list = ElementHandle::new(&root, "list").unwrap();
    let item = ElementHandle::new(&list, "item").unwrap();
    let n = AttributeHandle::new(&item, "n").unwrap();
    assert_eq!(n.value().as_deref(), Some("2"));

    list.sort_children().unwrap();

    assert_eq!(n.value().as_deref(), Some("1"));
}

#[test]
fn attributes_sort_by_name() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["item", {"z": "1", "a": "2"}]]));
    let root = RootAdapter::with_node(&tree, doc).unwrap();
    let item = ElementHandle::new(&root, "item").unwrap();
    item.sort_attributes().unwrap();
    let element = item.resolved_node().unwrap();
    let names: Vec<String> = tree
        .attributes(element)
        .into_iter()
        .filter_map(|attr| tree.name(attr))
        .collect();
    assert_eq!(names, vec!["a", "z"]);
    assert_eq!(tree.attribute_value(element, "z").as_deref(), Some("1"));
}

#[test]
fn schema_sorter_places_created_children() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["page"]]));
    let root = RootAdapter::builder(&tree)
        .node(doc)
        .sorter(SchemaSorter::new(["header", "body", "footer"]))
        .build()
        .unwrap();
    let page = ElementHandle::new(&root, "page").unwrap();
    for key in ["footer", "header", "body"] {
        ElementHandle::new(&page, key).unwrap().set_value(Some(key)).unwrap();
    }
    assert_eq!(
        tree.to_json(doc),
        Some(json!([
            "",
            ["page", ["header", "header"], ["body", "body"], ["footer", "footer"]]
        ]))
    );
}

#[test]
fn deep_changes_reach_ancestors_only_without_discrimination() {
    let fixture = json!(["", ["a", ["b"]]]);
    for (discriminate, expected) in [(true, 0), (false, 1)] {
        let tree = Tree::new();
        let doc = build(&tree, fixture.clone());
        let root = RootAdapter::builder(&tree)
            .node(doc)
            .options(HandleOptions::new().with_discriminate_descendants(discriminate))
            .build()
            .unwrap();
        let a = ElementHandle::new(&root, "a").unwrap();
        let b = ElementHandle::new(&a, "b").unwrap();
        let log = EventLog::default();
        log.watch_root("root", &root);
        log.watch_element("a", &a);
        log.watch_element("b", &b);

        let c = tree.create_element("c").unwrap();
        tree.append_child(b.resolved_node().unwrap(), c).unwrap();

        let entries = log.entries();
        let count = |label: &str| entries.iter().filter(|(l, _)| l == label).count();
        assert_eq!(count("b"), 1, "discriminate={discriminate}");
        assert_eq!(count("a"), expected, "discriminate={discriminate}");
        assert_eq!(count("root"), expected, "discriminate={discriminate}");
        assert!(entries.iter().all(|(_, event)| matches!(
            event,
            HandleEvent::DescendantChanged {
                source,
                change: DescendantChange::Added,
                ..
            } if *source == c
        )));
    }
}

#[test]
fn attribute_add_is_a_descendant_change() {
    let tree = Tree::new();
    let doc = build(&tree, json!(["", ["item"]]));
    let root = RootAdapter::with_node(&tree, doc).unwrap();
    let item = ElementHandle::new(&root, "item").unwrap();
    let id = AttributeHandle::new(&item, "id").unwrap();
    let log = EventLog::default();
    log.watch_element("item", &item);
    log.watch_attribute("id", &id);

    id.set_value(Some("1")).unwrap();
    id.set_value(Some("2")).unwrap();

    let node = id.resolved_node().unwrap();
    let element = item.resolved_node().unwrap();
    assert_eq!(
        log.entries(),
        vec![
            (
                "item".to_owned(),
                HandleEvent::DescendantChanged {
                    node: element,
                    source: node,
                    change: DescendantChange::Added,
                }
            ),
            ("id".to_owned(), HandleEvent::Added(node)),
            ("id".to_owned(), HandleEvent::ValueChanged(node)),
        ]
    );
}

#[test]
fn attribute_on_a_root_wrapped_element() {
    let tree = Tree::new();
    let element = build(&tree, json!(["settings"]));
    let root = RootAdapter::with_node(&tree, element).unwrap();
    let mode = AttributeHandle::new(&root, "mode").unwrap();
    mode.set_value(Some("dark")).unwrap();
    assert_eq!(tree.to_json(element), Some(json!(["settings", {"mode": "dark"}])));
}

#[test]
fn attribute_on_a_document_is_rejected() {
    let tree = Tree::new();
    let doc = build(&tree, json!([""]));
    let root = RootAdapter::with_node(&tree, doc).unwrap();
    let bogus = AttributeHandle::new(&root, "mode").unwrap();
    assert!(matches!(
        bogus.set_value(Some("x")),
        Err(HandleError::Tree(_))
    ));
}

#[test]
fn construction_errors() {
    let tree = Tree::new();
    let root = RootAdapter::new(&tree);
    assert_eq!(
        ElementHandle::new(&root, "").unwrap_err(),
        HandleError::EmptySearchKey
    );
    assert_eq!(
        AttributeHandle::new(&root, " \t").unwrap_err(),
        HandleError::EmptySearchKey
    );
    assert_eq!(
        ElementHandle::new(&root, "two words").unwrap_err(),
        HandleError::InvalidSearchKey("two words".to_owned())
    );
    assert_eq!(
        AttributeHandle::new(&root, "two words").unwrap_err(),
        HandleError::InvalidSearchKey("two words".to_owned())
    );
    assert_eq!(
        AttributeHandle::builder("id").build().unwrap_err(),
        HandleError::MissingParent
    );
    assert_eq!(root.remove(), Err(HandleError::RootRemoval));
}

#[test]
fn options_load_from_config() {
    let config: toml::Value = toml::from_str(
        r#"
        [handles]
        discriminate_descendants = false
        "#,
    )
    .unwrap();
    let options: HandleOptions = config["handles"].clone().try_into().unwrap();
    let tree = Tree::new();
    let root = RootAdapter::builder(&tree).options(options).build().unwrap();
    let a = ElementHandle::new(&root, "a").unwrap();
    let id = AttributeHandle::new(&a, "id").unwrap();
    assert!(!a.options().discriminate_descendants);
    assert!(!id.options().create_parent_if_missing);
}
