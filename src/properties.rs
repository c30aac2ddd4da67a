//! Client round-trips correlated by descriptor ids.

use crate::{
	diff::DomChange,
	error::{PropertyError, TransportError},
	node::XmlNs,
	path::TreePath,
	session::{LivePage, OutMessage},
};
use core::{
	future::Future,
	sync::atomic::{AtomicU64, Ordering},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

type Pending = oneshot::Sender<Result<Value, PropertyError>>;

/// The pending-result table of one session.
///
/// Ids increase monotonically and are used once.
/// After [`Descriptors::abandon_all`], the table is closed and registration fails.
#[derive(Debug)]
pub(crate) struct Descriptors {
	next: AtomicU64,
	pending: Mutex<Option<HashMap<u64, Pending>>>,
}

impl Descriptors {
	pub(crate) fn new() -> Self {
		Self {
			next: AtomicU64::new(1),
			pending: Mutex::new(Some(HashMap::new())),
		}
	}

	pub(crate) fn register(&self) -> Result<(u64, oneshot::Receiver<Result<Value, PropertyError>>), PropertyError> {
		let mut pending = self.pending.lock();
		let table = pending.as_mut().ok_or(PropertyError::Abandoned)?;
		let descriptor = self.next.fetch_add(1, Ordering::Relaxed);
		let (sender, receiver) = oneshot::channel();
		table.insert(descriptor, sender);
		Ok((descriptor, receiver))
	}

	pub(crate) fn resolve(&self, descriptor: u64, result: Result<Value, PropertyError>) {
		let sender = self.pending.lock().as_mut().and_then(|table| table.remove(&descriptor));
		match sender {
			Some(sender) => {
				if sender.send(result).is_err() {
					trace!(descriptor, "Response arrived after its requester gave up");
				}
			}
			None => trace!(descriptor, "Ignoring response for an unknown descriptor"),
		}
	}

	pub(crate) fn cancel(&self, descriptor: u64) {
		if let Some(table) = self.pending.lock().as_mut() {
			table.remove(&descriptor);
		}
	}

	/// Closes the table. Dropping the pending senders resolves their requests as [`PropertyError::Abandoned`].
	pub(crate) fn abandon_all(&self) -> usize {
		self.pending.lock().take().map_or(0, |table| table.len())
	}

	#[cfg(test)]
	fn pending_count(&self) -> usize {
		self.pending.lock().as_ref().map_or(0, HashMap::len)
	}
}

/// Reads and writes live DOM properties of one element.
///
/// Requests are sent immediately. Their futures resolve once the client responds;
/// apply your own timeout, since a client may never do so.
#[derive(Debug, Clone)]
pub struct PropertiesHandle {
	page: Arc<LivePage>,
	path: TreePath,
}

impl PropertiesHandle {
	pub(crate) fn new(page: Arc<LivePage>, path: TreePath) -> Self {
		Self { page, path }
	}

	#[must_use]
	pub fn path(&self) -> &TreePath {
		&self.path
	}

	pub fn get(&self, name: &str) -> impl Future<Output = Result<Value, PropertyError>> + Send + 'static {
		let path = self.path.clone();
		let name = name.to_owned();
		self.page.request(move |descriptor| OutMessage::ExtractProperty { descriptor, path, name })
	}

	/// Like [`PropertiesHandle::get`], with non-string values in their JSON form.
	pub fn get_string(&self, name: &str) -> impl Future<Output = Result<String, PropertyError>> + Send + 'static {
		let value = self.get(name);
		async move {
			Ok(match value.await? {
				Value::String(string) => string,
				other => other.to_string(),
			})
		}
	}

	/// Assigns the property `name` on the client. The committed snapshot doesn't track properties set this way.
	///
	/// # Errors
	///
	/// Iff the command can't be sent, or this is called from inside a view or state update.
	pub fn set(&self, name: &str, value: impl Into<String>) -> Result<(), TransportError> {
		self.page.send_ordered(OutMessage::ModifyDom {
			changes: vec![DomChange::SetAttr {
				path: self.path.clone(),
				ns: XmlNs::Html,
				name: name.to_owned(),
				value: value.into(),
				is_property: true,
			}],
		})
	}
}
