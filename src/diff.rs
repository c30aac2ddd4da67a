//! Positional tree diffing.
//!
//! The differ walks two [`Node`] trees side by side and reports the structural changes that turn the first into the second,
//! addressed by [`TreePath`].
//!
//! Children are matched **by position**, not by key:
//! Inserting or removing an item in the middle of a child list re-diffs every later sibling against the previous occupant of its slot,
//! which may replace nodes that only moved. Command counts downstream depend on this, so don't add key-based matching here.

use crate::{
	node::{AttrValue, Node, Tag, Text, XmlNs},
	path::TreePath,
};
use hashbrown::HashSet;
use serde::Serialize;
use tracing::{instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Receives the change operations produced by [`diff`], in order.
pub trait DomChanges {
	fn remove_node(&mut self, parent: Option<&TreePath>, path: &TreePath);
	fn create_tag(&mut self, path: &TreePath, ns: XmlNs, name: &str);
	fn set_attr(&mut self, path: &TreePath, ns: XmlNs, name: &str, value: &str, is_property: bool);
	fn remove_attr(&mut self, path: &TreePath, ns: XmlNs, name: &str, is_property: bool);
	fn set_style(&mut self, path: &TreePath, name: &str, value: &str);
	fn remove_style(&mut self, path: &TreePath, name: &str);
	/// Creating text at an occupied path replaces the occupant.
	fn create_text(&mut self, parent: Option<&TreePath>, path: &TreePath, text: &str);
}

/// One DOM mutation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DomChange {
	Remove { parent: Option<TreePath>, path: TreePath },
	Create { path: TreePath, ns: XmlNs, tag: String },
	SetAttr { path: TreePath, ns: XmlNs, name: String, value: String, is_property: bool },
	RemoveAttr { path: TreePath, ns: XmlNs, name: String, is_property: bool },
	SetStyle { path: TreePath, name: String, value: String },
	RemoveStyle { path: TreePath, name: String },
	CreateText { parent: Option<TreePath>, path: TreePath, text: String },
}

impl DomChange {
	#[must_use]
	pub fn path(&self) -> &TreePath {
		match self {
			DomChange::Remove { path, .. }
			| DomChange::Create { path, .. }
			| DomChange::SetAttr { path, .. }
			| DomChange::RemoveAttr { path, .. }
			| DomChange::SetStyle { path, .. }
			| DomChange::RemoveStyle { path, .. }
			| DomChange::CreateText { path, .. } => path,
		}
	}
}

/// Collects [`DomChange`]s and remembers which slots were removed along the way.
///
/// The removed set lets event reconciliation skip unsubscribing from elements the client is already discarding.
#[derive(Debug, Default, Clone)]
pub struct DomChangeList {
	pub changes: Vec<DomChange>,
	removed: HashSet<TreePath>,
}

impl DomChangeList {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.changes.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.changes.len()
	}

	pub fn removed_paths(&self) -> impl '_ + Iterator<Item = &TreePath> {
		self.removed.iter()
	}

	/// Whether `path` is a removed slot or lies below one.
	#[must_use]
	pub fn is_removed(&self, path: &TreePath) -> bool {
		!self.removed.is_empty() && (self.removed.contains(path) || self.removed.iter().any(|removed| removed.is_ancestor_of(path)))
	}

	#[must_use]
	pub fn into_changes(self) -> Vec<DomChange> {
		self.changes
	}
}

impl DomChanges for DomChangeList {
	fn remove_node(&mut self, parent: Option<&TreePath>, path: &TreePath) {
		self.removed.insert(path.clone());
		self.changes.push(DomChange::Remove { parent: parent.cloned(), path: path.clone() });
	}

	fn create_tag(&mut self, path: &TreePath, ns: XmlNs, name: &str) {
		self.changes.push(DomChange::Create {
			path: path.clone(),
			ns,
			tag: name.to_owned(),
		});
	}

	fn set_attr(&mut self, path: &TreePath, ns: XmlNs, name: &str, value: &str, is_property: bool) {
		self.changes.push(DomChange::SetAttr {
			path: path.clone(),
			ns,
			name: name.to_owned(),
			value: value.to_owned(),
			is_property,
		});
	}

	fn remove_attr(&mut self, path: &TreePath, ns: XmlNs, name: &str, is_property: bool) {
		self.changes.push(DomChange::RemoveAttr {
			path: path.clone(),
			ns,
			name: name.to_owned(),
			is_property,
		});
	}

	fn set_style(&mut self, path: &TreePath, name: &str, value: &str) {
		self.changes.push(DomChange::SetStyle {
			path: path.clone(),
			name: name.to_owned(),
			value: value.to_owned(),
		});
	}

	fn remove_style(&mut self, path: &TreePath, name: &str) {
		self.changes.push(DomChange::RemoveStyle { path: path.clone(), name: name.to_owned() });
	}

	fn create_text(&mut self, parent: Option<&TreePath>, path: &TreePath, text: &str) {
		self.changes.push(DomChange::CreateText {
			parent: parent.cloned(),
			path: path.clone(),
			text: text.to_owned(),
		});
	}
}

/// Reports the changes that turn `old` (if present) into `new`, both rooted at `path`, to `changes`.
///
/// Inputs are assumed to be well-formed, as produced by a [`RenderContext`](`crate::RenderContext`).
#[instrument(skip_all, fields(%path))]
pub fn diff(old: Option<&Node>, new: &Node, path: &TreePath, changes: &mut impl DomChanges) {
	diff_node(old, new, path, changes);
}

fn diff_node(old: Option<&Node>, new: &Node, path: &TreePath, changes: &mut impl DomChanges) {
	match (old, new) {
		(Some(Node::Tag(t_1)), Node::Tag(t_2)) if t_1.ns == t_2.ns && t_1.name == t_2.name => {
			let span = trace_span!("Diffing element", tag = %t_1.name, %path);
			let _enter = span.enter();
			update_tag(t_1, t_2, path, changes);
		}

		(Some(Node::Text(Text { text: x_1 })), Node::Text(Text { text: x_2 })) => {
			let span = trace_span!("Diffing text node", %path);
			let _enter = span.enter();
			if x_1 != x_2 {
				if cfg!(feature = "dangerous-logging") {
					trace!("Text changed: {:?} -> {:?}", x_1, x_2);
				}
				changes.create_text(path.parent().as_ref(), path, x_2);
			}
		}

		// Mismatching nodes: Destroy and rebuild.
		(old, new) => {
			let span = trace_span!("Replace mismatching", %path);
			let _enter = span.enter();

			if STATIC_MAX_LEVEL >= Level::WARN {
				if let (Some(Node::Tag(t_1)), Node::Tag(t_2)) = (old, new) {
					if t_1.ns == t_2.ns && t_1.name.eq_ignore_ascii_case(&t_2.name) {
						warn!(
							"Recreating element due to different tag name casing: {:?} -> {:?}\n\
							The differ compares tag names exactly.",
							t_1.name, t_2.name
						);
					}
				}
			}

			if old.is_some() {
				changes.remove_node(path.parent().as_ref(), path);
			}
			create_node(new, path, changes);
		}
	}
}

#[allow(clippy::similar_names)]
fn update_tag(t_1: &Tag, t_2: &Tag, path: &TreePath, changes: &mut impl DomChanges) {
	debug_assert_eq!(t_1.name, t_2.name);
	debug_assert_eq!(t_1.ns, t_2.ns);

	for (name, AttrValue { is_property, .. }) in t_1.attributes.iter() {
		if t_2.attributes.get(name).is_none() {
			changes.remove_attr(path, t_1.ns, name, *is_property);
		}
	}
	for (name, value_2) in t_2.attributes.iter() {
		if t_1.attributes.get(name) != Some(value_2) {
			changes.set_attr(path, t_2.ns, name, &value_2.value, value_2.is_property);
		}
	}

	for (name, _) in t_1.styles.iter() {
		if t_2.styles.get(name).is_none() {
			changes.remove_style(path, name);
		}
	}
	for (name, value_2) in t_2.styles.iter() {
		if t_1.styles.get(name) != Some(value_2) {
			changes.set_style(path, name, value_2);
		}
	}

	let common = t_1.children.len().min(t_2.children.len());
	for (i, (c_1, c_2)) in t_1.children.iter().zip(&t_2.children).enumerate() {
		diff_node(Some(c_1), c_2, &path.child_at_index(i), changes);
	}

	for i in common..t_1.children.len() {
		let span = trace_span!("Removing surplus child", index = i + 1);
		let _enter = span.enter();
		changes.remove_node(Some(path), &path.child_at_index(i));
	}

	for (i, added) in t_2.children.iter().enumerate().skip(common) {
		create_node(added, &path.child_at_index(i), changes);
	}
}

fn create_node(node: &Node, path: &TreePath, changes: &mut impl DomChanges) {
	match node {
		Node::Tag(tag) => {
			let span = trace_span!("Creating element", tag = %tag.name, %path);
			let _enter = span.enter();
			changes.create_tag(path, tag.ns, &tag.name);
			for (name, AttrValue { value, is_property }) in tag.attributes.iter() {
				changes.set_attr(path, tag.ns, name, value, *is_property);
			}
			for (name, value) in tag.styles.iter() {
				changes.set_style(path, name, value);
			}
			for (i, child) in tag.children.iter().enumerate() {
				create_node(child, &path.child_at_index(i), changes);
			}
		}

		Node::Text(Text { text }) => {
			let span = trace_span!("Creating text node", %path);
			let _enter = span.enter();
			changes.create_text(path.parent().as_ref(), path, text);
		}
	}
}
