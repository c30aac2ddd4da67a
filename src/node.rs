//! The per-render tree representation.
//!
//! Nodes don't know their own [`TreePath`](`crate::TreePath`)s.
//! Paths are derived from positions while rendering and diffing, so that a subtree can be compared against a different render pass's subtree at the same slot.

use core::fmt::{self, Write};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum XmlNs {
	Html,
	Svg,
	MathMl,
	Xlink,
	Xml,
}

impl XmlNs {
	#[must_use]
	pub fn uri(self) -> &'static str {
		match self {
			XmlNs::Html => "http://www.w3.org/1999/xhtml",
			XmlNs::Svg => "http://www.w3.org/2000/svg",
			XmlNs::MathMl => "http://www.w3.org/1998/Math/MathML",
			XmlNs::Xlink => "http://www.w3.org/1999/xlink",
			XmlNs::Xml => "http://www.w3.org/XML/1998/namespace",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	Tag(Tag),
	Text(Text),
}

impl Node {
	#[must_use]
	pub fn as_tag(&self) -> Option<&Tag> {
		match self {
			Node::Tag(tag) => Some(tag),
			Node::Text(_) => None,
		}
	}

	/// The node at the slot `indices` below this one, following 1-based sibling indices.
	#[must_use]
	pub fn descendant(&self, indices: &[core::num::NonZeroU32]) -> Option<&Node> {
		let mut node = self;
		for index in indices {
			node = node.as_tag()?.children.get(index.get() as usize - 1)?;
		}
		Some(node)
	}

	pub fn descendant_mut(&mut self, indices: &[core::num::NonZeroU32]) -> Option<&mut Node> {
		let mut node = self;
		for index in indices {
			node = match node {
				Node::Tag(tag) => tag.children.get_mut(index.get() as usize - 1)?,
				Node::Text(_) => return None,
			};
		}
		Some(node)
	}

	pub fn write_html(&self, out: &mut impl Write) -> fmt::Result {
		match self {
			Node::Tag(tag) => tag.write_html(out),
			Node::Text(text) => write_escaped(out, &text.text, false),
		}
	}
}

impl From<Tag> for Node {
	fn from(tag: Tag) -> Self {
		Node::Tag(tag)
	}
}

impl From<Text> for Node {
	fn from(text: Text) -> Self {
		Node::Text(text)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
	pub text: String,
}

impl Text {
	#[must_use]
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into() }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrValue {
	pub value: String,
	/// Whether the client should assign this as a DOM property rather than an attribute.
	pub is_property: bool,
}

/// An element. Children are ordered. Attributes and styles are keyed by name and compare as sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	pub ns: XmlNs,
	pub name: String,
	pub self_closing: bool,
	pub attributes: NameMap<AttrValue>,
	pub styles: NameMap<String>,
	pub children: Vec<Node>,
}

impl Tag {
	#[must_use]
	pub fn new(ns: XmlNs, name: impl Into<String>) -> Self {
		Self {
			ns,
			name: name.into(),
			self_closing: false,
			attributes: NameMap::new(),
			styles: NameMap::new(),
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn html(name: impl Into<String>) -> Self {
		Self::new(XmlNs::Html, name)
	}

	#[must_use]
	pub fn self_closing(mut self) -> Self {
		self.self_closing = true;
		self
	}

	#[must_use]
	pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>, is_property: bool) -> Self {
		self.set_attr(name, value, is_property);
		self
	}

	#[must_use]
	pub fn with_style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.set_style(name, value);
		self
	}

	#[must_use]
	pub fn with_child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn with_text(self, text: impl Into<String>) -> Self {
		self.with_child(Text::new(text))
	}

	pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>, is_property: bool) {
		self.attributes.insert(name.into(), AttrValue { value: value.into(), is_property });
	}

	pub fn set_style(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.styles.insert(name.into(), value.into());
	}

	pub fn write_html(&self, out: &mut impl Write) -> fmt::Result {
		write!(out, "<{}", self.name)?;
		if !self.styles.is_empty() {
			out.write_str(" style=\"")?;
			for (name, value) in self.styles.iter() {
				write_escaped(out, name, true)?;
				out.write_char(':')?;
				write_escaped(out, value, true)?;
				out.write_char(';')?;
			}
			out.write_char('"')?;
		}
		for (name, AttrValue { value, .. }) in self.attributes.iter() {
			write!(out, " {}=\"", name)?;
			write_escaped(out, value, true)?;
			out.write_char('"')?;
		}
		if self.self_closing {
			return out.write_str(" />");
		}
		out.write_char('>')?;
		let raw_text = self.ns == XmlNs::Html && matches!(self.name.as_str(), "script" | "style");
		for child in &self.children {
			match child {
				Node::Text(Text { text }) if raw_text => out.write_str(text)?,
				child => child.write_html(out)?,
			}
		}
		write!(out, "</{}>", self.name)
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.write_html(f)
	}
}

fn write_escaped(out: &mut impl Write, text: &str, in_attribute: bool) -> fmt::Result {
	let mut rest = text;
	while let Some(i) = rest.find(|c: char| matches!(c, '&' | '<' | '>') || (in_attribute && c == '"')) {
		out.write_str(&rest[..i])?;
		out.write_str(match rest.as_bytes()[i] {
			b'&' => "&amp;",
			b'<' => "&lt;",
			b'>' => "&gt;",
			_ => "&quot;",
		})?;
		rest = &rest[i + 1..];
	}
	out.write_str(rest)
}

/// A small insertion-ordered map with at most one value per name.
///
/// Serialization follows insertion order, but equality does not.
#[derive(Debug, Clone, Eq)]
pub struct NameMap<V>(Vec<(String, V)>);

impl<V> NameMap<V> {
	#[must_use]
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Replaces any previous value of the same name in place.
	pub fn insert(&mut self, name: String, value: V) -> Option<V> {
		match self.0.iter_mut().find(|(n, _)| *n == name) {
			Some((_, existing)) => Some(core::mem::replace(existing, value)),
			None => {
				self.0.push((name, value));
				None
			}
		}
	}

	pub fn remove(&mut self, name: &str) -> Option<V> {
		let i = self.0.iter().position(|(n, _)| n == name)?;
		Some(self.0.remove(i).1)
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&V> {
		self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = (&str, &V)> {
		self.0.iter().map(|(n, v)| (n.as_str(), v))
	}
}

impl<V> Default for NameMap<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V: PartialEq> PartialEq for NameMap<V> {
	fn eq(&self, other: &Self) -> bool {
		self.len() == other.len() && self.iter().all(|(name, value)| other.get(name) == Some(value))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn name_maps_compare_as_sets() {
		let a = Tag::html("div").with_attr("a", "1", false).with_attr("b", "2", false);
		let b = Tag::html("div").with_attr("b", "2", false).with_attr("a", "1", false);
		assert_eq!(a, b);
		assert_ne!(a, Tag::html("div").with_attr("a", "1", true).with_attr("b", "2", false));
	}

	#[test]
	fn serializes_styles_attributes_and_children() {
		let tag = Tag::html("div")
			.with_style("color", "red")
			.with_attr("title", "a \"quoted\" <value>", false)
			.with_child(Tag::html("br").self_closing())
			.with_text("1 < 2 & 3");
		assert_eq!(tag.to_string(), "<div style=\"color:red;\" title=\"a &quot;quoted&quot; &lt;value&gt;\"><br />1 &lt; 2 &amp; 3</div>");
	}

	#[test]
	fn script_text_is_raw() {
		let tag = Tag::html("script").with_text("if (a < b && c) {}");
		assert_eq!(tag.to_string(), "<script>if (a < b && c) {}</script>");
	}

	#[test]
	fn descends_by_sibling_index() {
		let tree = Node::Tag(Tag::html("ul").with_child(Tag::html("li").with_text("first")).with_child(Tag::html("li").with_text("second")));
		let path = crate::TreePath::of(&[2, 1]);
		let indices: Vec<_> = path.indices().collect();
		assert_eq!(tree.descendant(&indices), Some(&Node::Text(Text::new("second"))));
		assert_eq!(tree.descendant(&indices[..1]).and_then(Node::as_tag).map(|tag| tag.name.as_str()), Some("li"));
		assert_eq!(tree.descendant(&[core::num::NonZeroU32::MIN; 3]), None);
	}
}
