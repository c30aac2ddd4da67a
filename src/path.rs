//! Structural node addresses.

use core::{fmt, num::NonZeroU32, str::FromStr};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The position of a node in a rendered tree, as 1-based sibling indices from the root.
///
/// Paths identify *slots*, not nodes: Two trees that have a node at the same [`TreePath`]
/// are considered to have "the same slot" there, regardless of what occupies it.
/// That is what allows the differ to detect replacements.
///
/// The root path is empty. Paths order element-wise from left to right,
/// with a prefix sorting before all of its extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath(Vec<NonZeroU32>);

impl TreePath {
	#[must_use]
	pub fn root() -> Self {
		Self(Vec::new())
	}

	/// # Panics
	///
	/// Iff any of `indices` is zero.
	#[must_use]
	pub fn of(indices: &[u32]) -> Self {
		Self(indices.iter().map(|&i| NonZeroU32::new(i).expect("Sibling indices are 1-based")).collect())
	}

	/// Extends this path by the 1-based sibling index `n`.
	#[must_use]
	pub fn child_at(&self, n: NonZeroU32) -> Self {
		let mut indices = Vec::with_capacity(self.0.len() + 1);
		indices.extend_from_slice(&self.0);
		indices.push(n);
		Self(indices)
	}

	/// Like [`TreePath::child_at`], for zero-based `index`es as produced by slice iteration.
	#[must_use]
	pub fn child_at_index(&self, index: usize) -> Self {
		let n = u32::try_from(index + 1).ok().and_then(NonZeroU32::new).unwrap_or(NonZeroU32::MAX);
		self.child_at(n)
	}

	#[must_use]
	pub fn parent(&self) -> Option<Self> {
		match self.0.split_last() {
			Some((_, parent)) => Some(Self(parent.to_vec())),
			None => None,
		}
	}

	/// Strict: A path is not its own ancestor.
	#[must_use]
	pub fn is_ancestor_of(&self, other: &Self) -> bool {
		self.0.len() < other.0.len() && other.0.starts_with(&self.0)
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn depth(&self) -> usize {
		self.0.len()
	}

	/// The last sibling index, or [`None`] for the root.
	#[must_use]
	pub fn last(&self) -> Option<NonZeroU32> {
		self.0.last().copied()
	}

	pub fn indices(&self) -> impl '_ + ExactSizeIterator<Item = NonZeroU32> {
		self.0.iter().copied()
	}

	#[must_use]
	pub fn as_slice(&self) -> &[NonZeroU32] {
		&self.0
	}

	/// The remaining indices below `ancestor`, if this path is `ancestor` or lies below it.
	#[must_use]
	pub fn strip_prefix(&self, ancestor: &Self) -> Option<&[NonZeroU32]> {
		self.0.strip_prefix(ancestor.0.as_slice())
	}
}

/// `1_2_3`. The root path is displayed as the empty string.
impl fmt::Display for TreePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut indices = self.0.iter();
		if let Some(first) = indices.next() {
			write!(f, "{}", first)?;
			for index in indices {
				write!(f, "_{}", index)?;
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tree path {0:?}: expected `_`-separated positive sibling indices")]
pub struct ParseTreePathError(String);

impl FromStr for TreePath {
	type Err = ParseTreePathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::root());
		}
		s.split('_')
			.map(|index| index.parse::<NonZeroU32>())
			.collect::<Result<Vec<_>, _>>()
			.map(Self)
			.map_err(|_| ParseTreePathError(s.to_owned()))
	}
}

/// Paths travel in their displayed form.
impl Serialize for TreePath {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for TreePath {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_is_empty_and_has_no_parent() {
		let root = TreePath::root();
		assert!(root.is_root());
		assert_eq!(root.parent(), None);
		assert_eq!(root.to_string(), "");
	}

	#[test]
	fn child_at_extends() {
		let path = TreePath::root().child_at_index(0).child_at_index(2);
		assert_eq!(path, TreePath::of(&[1, 3]));
		assert_eq!(path.parent(), Some(TreePath::of(&[1])));
		assert_eq!(path.to_string(), "1_3");
	}

	#[test]
	fn ancestry_is_strict() {
		let a = TreePath::of(&[1, 2]);
		assert!(TreePath::root().is_ancestor_of(&a));
		assert!(TreePath::of(&[1]).is_ancestor_of(&a));
		assert!(!a.is_ancestor_of(&a));
		assert!(!TreePath::of(&[2]).is_ancestor_of(&a));
		assert!(!TreePath::of(&[1, 2, 1]).is_ancestor_of(&a));
	}

	#[test]
	fn prefixes_sort_first() {
		let mut paths = vec![TreePath::of(&[2]), TreePath::of(&[1, 1]), TreePath::of(&[1]), TreePath::root(), TreePath::of(&[1, 10]), TreePath::of(&[1, 2])];
		paths.sort();
		assert_eq!(
			paths,
			vec![TreePath::root(), TreePath::of(&[1]), TreePath::of(&[1, 1]), TreePath::of(&[1, 2]), TreePath::of(&[1, 10]), TreePath::of(&[2])]
		);
	}

	#[test]
	fn parses_displayed_form() {
		for path in [TreePath::root(), TreePath::of(&[1]), TreePath::of(&[1, 2, 1, 2, 2, 1])] {
			assert_eq!(path.to_string().parse::<TreePath>(), Ok(path));
		}
		assert!("1__2".parse::<TreePath>().is_err());
		assert!("0_1".parse::<TreePath>().is_err());
	}
}
