use crate::{event_context::EventContext, path::TreePath};
use core::{
	fmt::{self, Debug},
	sync::atomic::{AtomicU64, Ordering},
};
use serde::Serialize;
use std::sync::Arc;

/// Where a client-side listener is attached: An event type on the element at a path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTarget {
	pub path: TreePath,
	pub event_type: String,
}

impl EventTarget {
	#[must_use]
	pub fn new(event_type: impl Into<String>, path: TreePath) -> Self {
		Self { path, event_type: event_type.into() }
	}
}

/// Client-side rate limiting metadata, forwarded with the subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventModifier {
	#[default]
	None,
	Throttle {
		time_frame_ms: u64,
	},
	Debounce {
		wait_ms: u64,
		immediate: bool,
	},
}

/// What the client is told to listen for.
///
/// Two [`Event`]s with equal subscriptions are the same client-side listener, regardless of their handlers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
	pub target: EventTarget,
	pub prevent_default: bool,
	pub modifier: EventModifier,
}

pub type EventHandler = Arc<dyn Fn(EventContext) + Send + Sync>;

#[derive(Clone)]
pub struct Event {
	pub subscription: Subscription,
	pub handler: EventHandler,
}

impl Event {
	#[must_use]
	pub fn target(&self) -> &EventTarget {
		&self.subscription.target
	}
}

impl Debug for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event").field("subscription", &self.subscription).finish_non_exhaustive()
	}
}

/// An opaque handle to an element, declared by view code and resolved to the path where it was declared during the latest render.
///
/// Equal keys on the same base reference are the same reference, which lets list items share one [`ElementRef`] definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
	id: u64,
	key: Option<String>,
}

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

impl ElementRef {
	#[must_use]
	#[allow(clippy::new_without_default)]
	pub fn new() -> Self {
		Self {
			id: NEXT_REF_ID.fetch_add(1, Ordering::Relaxed),
			key: None,
		}
	}

	#[must_use]
	pub fn with_key(&self, key: impl Into<String>) -> Self {
		Self { id: self.id, key: Some(key.into()) }
	}

	#[must_use]
	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}
}
