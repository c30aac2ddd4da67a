use live_dom::{diff, DomChangeList, Node, Tag, Text, TreePath, XmlNs};
use proptest::{collection::vec, prelude::*, sample::select};

use client_::Client;

fn leaf() -> impl Strategy<Value = Node> {
	prop_oneof![
		"[ab]{0,2}".prop_map(|text| Node::Text(Text::new(text))),
		element(Just(Vec::new())),
	]
}

fn element(children: impl Strategy<Value = Vec<Node>>) -> impl Strategy<Value = Node> {
	(
		select(vec![XmlNs::Html, XmlNs::Svg]),
		select(vec!["div", "span", "li"]),
		vec(("[a-c]", "[xy]{0,2}", any::<bool>()), 0..3),
		vec(("[a-c]", "[xy]{1,2}"), 0..3),
		children,
	)
		.prop_map(|(ns, name, attributes, styles, children)| {
			let mut tag = Tag::new(ns, name);
			for (name, value, is_property) in attributes {
				tag.set_attr(name, value, is_property);
			}
			for (name, value) in styles {
				tag.set_style(name, value);
			}
			tag.children = children;
			Node::Tag(tag)
		})
}

fn tree() -> impl Strategy<Value = Node> {
	leaf().prop_recursive(4, 32, 4, |inner| element(vec(inner, 0..4)))
}

fn changes(old: Option<&Node>, new: &Node, path: &TreePath) -> DomChangeList {
	let mut changes = DomChangeList::new();
	diff(old, new, path, &mut changes);
	changes
}

fn subtree_paths(node: &Node, path: &TreePath, paths: &mut Vec<TreePath>) {
	paths.push(path.clone());
	if let Node::Tag(tag) = node {
		for (i, child) in tag.children.iter().enumerate() {
			subtree_paths(child, &path.child_at_index(i), paths);
		}
	}
}

proptest! {
	#[test]
	fn self_diff_is_empty_everywhere(a in tree()) {
		let mut paths = Vec::new();
		subtree_paths(&a, &TreePath::root(), &mut paths);
		for path in paths {
			let subtree = a.descendant(path.as_slice()).unwrap();
			prop_assert!(changes(Some(subtree), subtree, &path).is_empty());
		}
	}

	#[test]
	fn applying_the_diff_yields_the_new_tree(a in tree(), b in tree()) {
		let root = TreePath::root();
		let mut client = Client::new(Some(&a), &root);
		client.apply(&changes(Some(&a), &b, &root).changes);
		prop_assert_eq!(client.tree(&root), Some(b));
	}

	#[test]
	fn creation_from_nothing_yields_the_tree(b in tree()) {
		let base = TreePath::of(&[2, 1]);
		let mut client = Client::default();
		client.apply(&changes(None, &b, &base).changes);
		prop_assert_eq!(client.tree(&base), Some(b));
	}

	#[test]
	fn leaf_text_change_is_one_create_text(text_1 in "[ab]{0,3}", text_2 in "[cd]{1,3}") {
		let a = Node::Tag(Tag::html("div").with_child(Tag::html("p").with_text(text_1)));
		let b = Node::Tag(Tag::html("div").with_child(Tag::html("p").with_text(text_2.clone())));
		let changes = changes(Some(&a), &b, &TreePath::root()).into_changes();
		prop_assert_eq!(changes, vec![live_dom::DomChange::CreateText {
			parent: Some(TreePath::of(&[1])),
			path: TreePath::of(&[1, 1]),
			text: text_2,
		}]);
	}

	#[test]
	fn new_child_with_attributes(attributes in vec(("[a-e]", "[xy]{0,2}"), 0..5), styles in vec(("[a-e]", "[xy]{1,2}"), 0..5)) {
		let mut child = Tag::html("span");
		for (name, value) in attributes {
			child.set_attr(name, value, false);
		}
		for (name, value) in styles {
			child.set_style(name, value);
		}
		let expected = 1 + child.attributes.len() + child.styles.len();

		let a = Node::Tag(Tag::html("div"));
		let b = Node::Tag(Tag::html("div").with_child(child));
		let changes = changes(Some(&a), &b, &TreePath::root());
		prop_assert_eq!(changes.len(), expected);
		prop_assert!(changes.changes.iter().all(|change| *change.path() == TreePath::of(&[1])));
	}
}
