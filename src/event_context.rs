use crate::{
	error::{PropertyError, TransportError, UpdateError},
	event::ElementRef,
	page::QualifiedSessionId,
	path::TreePath,
	properties::PropertiesHandle,
	schedule::Timer,
	session::{LivePage, OutMessage},
};
use core::{future::Future, time::Duration};
use serde_json::Value;
use std::sync::Arc;

/// What an event handler gets to work with. Handlers run outside of the session lock.
#[derive(Debug, Clone)]
pub struct EventContext {
	page: Arc<LivePage>,
	path: TreePath,
	event_object: Value,
}

impl EventContext {
	pub(crate) fn new(page: Arc<LivePage>, path: TreePath, event_object: Value) -> Self {
		Self { page, path, event_object }
	}

	/// The path of the element the event fired on.
	#[must_use]
	pub fn element_path(&self) -> &TreePath {
		&self.path
	}

	/// The client's serialized event.
	#[must_use]
	pub fn event_object(&self) -> &Value {
		&self.event_object
	}

	#[must_use]
	pub fn event_value(&self, key: &str) -> Option<&Value> {
		self.event_object.get(key)
	}

	#[must_use]
	pub fn session_id(&self) -> &QualifiedSessionId {
		self.page.qsid()
	}

	/// # Errors
	///
	/// [`PropertyError::StaleRef`] iff `element_ref` wasn't declared in the latest render of its component,
	/// [`PropertyError::Reentrant`] iff called from inside a view or state update.
	pub fn props(&self, element_ref: &ElementRef) -> Result<PropertiesHandle, PropertyError> {
		let path = self.page.resolve_ref(element_ref)?;
		Ok(PropertiesHandle::new(Arc::clone(&self.page), path))
	}

	/// Properties of the element the event fired on.
	#[must_use]
	pub fn element_props(&self) -> PropertiesHandle {
		PropertiesHandle::new(Arc::clone(&self.page), self.path.clone())
	}

	pub fn eval_js(&self, code: impl Into<String>) -> impl Future<Output = Result<Value, PropertyError>> + Send + 'static {
		self.page.eval_js(code)
	}

	/// Navigates the client away from the page.
	///
	/// # Errors
	///
	/// Iff the command can't be sent, or this is called from inside a view or state update.
	pub fn set_href(&self, href: impl Into<String>) -> Result<(), TransportError> {
		self.page.send_ordered(OutMessage::SetHref { href: href.into() })
	}

	/// Runs `callback` once after `delay`, unless cancelled or the session shuts down first.
	///
	/// # Errors
	///
	/// Iff the page has no runtime, or the session is shut down.
	pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> Result<Timer, UpdateError> {
		self.page.schedules.schedule(delay, callback)
	}

	/// Runs `callback` after `delay`, then every `period`, until cancelled or the session shuts down.
	///
	/// # Errors
	///
	/// See [`EventContext::schedule`]. Additionally [`UpdateError::ZeroPeriod`] iff `period` is zero.
	pub fn schedule_at_fixed_rate(&self, delay: Duration, period: Duration, callback: impl Fn() + Send + Sync + 'static) -> Result<Timer, UpdateError> {
		self.page.schedules.schedule_at_fixed_rate(delay, period, callback)
	}
}
