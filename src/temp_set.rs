use crate::event::Subscription;
use hashbrown::HashSet;

/// A scratch set for subscription reconciliation, kept around to reuse its allocation.
#[derive(Debug, Default)]
pub struct TempSubscriptionSet(HashSet<Subscription>);
impl TempSubscriptionSet {
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// The set is cleared before each borrow, so no values leak between uses.
	pub fn temp(&mut self) -> &mut HashSet<Subscription> {
		self.0.clear();
		&mut self.0
	}

	/// Retrieves the cache set's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}
