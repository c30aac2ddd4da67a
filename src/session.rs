//! The live, connected counterpart of a rendered page.

use crate::{
	component::{ComponentNode, Registries},
	diff::{diff, DomChange, DomChangeList},
	error::{PropertyError, TransportError, UpdateError},
	event::{ElementRef, EventTarget, Subscription},
	event_context::EventContext,
	node::{Node, Tag},
	page::{QualifiedSessionId, RenderedPage},
	path::TreePath,
	properties::Descriptors,
	render::RenderingGuard,
	schedule::Schedules,
	temp_set::TempSubscriptionSet,
};
use core::{
	fmt::{self, Debug},
	future::Future,
	sync::atomic::{AtomicBool, Ordering},
};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock, Weak};
use tokio::{runtime::Handle, sync::mpsc::UnboundedSender};
use tracing::{instrument, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};

/// A command for the connected client.
///
/// Per committed re-render, commands are sent as: [`OutMessage::ModifyDom`] (if any), [`OutMessage::ForgetEvent`]s,
/// [`OutMessage::ListenEvents`] (if any), [`OutMessage::PushHistory`] (if the logical path changed).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutMessage {
	ListenEvents { subscriptions: Vec<Subscription> },
	ForgetEvent { target: EventTarget },
	ModifyDom { changes: Vec<DomChange> },
	ExtractProperty { descriptor: u64, path: TreePath, name: String },
	EvalJs { descriptor: u64, code: String },
	SetHref { href: String },
	PushHistory { path: String },
}

/// A message from the connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InMessage {
	DomEvent {
		path: TreePath,
		event_type: String,
		#[serde(default)]
		event_object: Value,
	},
	ExtractPropertyResponse { descriptor: u64, result: Result<Value, String> },
	EvalJsResponse { descriptor: u64, result: Result<Value, String> },
}

/// The outbound half of a client connection.
pub trait RemoteOut: Send + Sync {
	/// # Errors
	///
	/// Iff the message could not be handed to the connection.
	fn send(&self, message: OutMessage) -> Result<(), TransportError>;
}

impl RemoteOut for UnboundedSender<OutMessage> {
	fn send(&self, message: OutMessage) -> Result<(), TransportError> {
		UnboundedSender::send(self, message).map_err(|_| TransportError::Closed)
	}
}

/// Observes one session's lifetime. Registered per session when it goes live.
pub trait PageLifecycle: Send + Sync {
	fn on_open(&self, _page: &LivePage) {}
	fn on_close(&self, _page: &LivePage) {}
}

/// Connects components to the session they end up in, which doesn't exist yet while they first render.
#[derive(Clone)]
pub(crate) struct PageLink(Arc<PageLinkInner>);

struct PageLinkInner {
	page: OnceLock<Weak<LivePage>>,
	runtime: Option<Handle>,
	head_scripts: Option<Vec<Tag>>,
}

impl PageLink {
	pub(crate) fn new(runtime: Option<Handle>, head_scripts: Option<Vec<Tag>>) -> Self {
		Self(Arc::new(PageLinkInner {
			page: OnceLock::new(),
			runtime,
			head_scripts,
		}))
	}

	pub(crate) fn live(&self) -> Option<Arc<LivePage>> {
		self.0.page.get()?.upgrade()
	}

	fn attach(&self, page: &Arc<LivePage>) -> bool {
		self.0.page.set(Arc::downgrade(page)).is_ok()
	}

	pub(crate) fn runtime(&self) -> Option<&Handle> {
		self.0.runtime.as_ref()
	}

	/// Appended to `<head>` on every render pass of the page.
	pub(crate) fn head_scripts(&self) -> Option<&[Tag]> {
		self.0.head_scripts.as_deref()
	}
}

/// The committed snapshot of a live page. Only accessed under the session lock.
pub(crate) struct PageState {
	tree: Node,
	registries: Registries,
	path: String,
	#[allow(dead_code)] // Owns the component tree.
	root_component: Arc<dyn ComponentNode>,
	subscription_diff_set: TempSubscriptionSet,
}

impl PageState {
	pub(crate) fn path(&self) -> &str {
		&self.path
	}

	fn replace(&mut self, path: &TreePath, node: Node) {
		let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
			self.tree = node;
			return;
		};
		match self.tree.descendant_mut(parent.as_slice()) {
			Some(Node::Tag(tag)) => {
				let index = last.get() as usize - 1;
				match tag.children.get_mut(index) {
					Some(slot) => *slot = node,
					None => tag.children.push(node),
				}
			}
			_ => warn!("Committed subtree at {} has no parent element in the snapshot", path),
		}
	}

	/// Splits the subscription delta of a re-render into targets to forget and subscriptions to (re-)listen.
	///
	/// Removed elements drop their listeners client-side, so their subscriptions aren't forgotten explicitly.
	/// Unchanged subscriptions on removed (and thereby recreated) elements are listened again.
	fn reconcile(&mut self, old: &Registries, new: &Registries, changes: &DomChangeList) -> (Vec<EventTarget>, Vec<Subscription>) {
		let persisting = self.subscription_diff_set.temp();
		persisting.extend(new.events.values().map(|event| event.subscription.clone()));

		let mut forget = Vec::new();
		let mut listen = Vec::new();
		for event in old.events.values() {
			let removed = changes.is_removed(&event.target().path);
			if persisting.remove(&event.subscription) {
				if removed {
					listen.push(event.subscription.clone());
				}
			} else if !removed {
				forget.push(event.target().clone());
			}
		}
		listen.extend(persisting.drain());

		if STATIC_MAX_LEVEL >= Level::WARN {
			let capacity = self.subscription_diff_set.capacity();
			if capacity >= 10_000 {
				warn!(
					"Subscription reconciliation set capacity is {}. This is likely fine if you render a lot of event handlers at once, but could be a sign of a memory leak.",
					capacity
				);
			}
		}

		forget.sort();
		listen.sort();
		(forget, listen)
	}
}

/// One connected page: The authoritative committed snapshot, the exclusive lock around it and the outbound connection.
pub struct LivePage {
	qsid: QualifiedSessionId,
	state: Mutex<PageState>,
	out: Arc<dyn RemoteOut>,
	base_path: String,
	pub(crate) descriptors: Descriptors,
	pub(crate) schedules: Schedules,
	lifecycle: Option<Arc<dyn PageLifecycle>>,
	shut_down: AtomicBool,
}

impl Debug for LivePage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LivePage")
			.field("qsid", &self.qsid)
			.field("shut_down", &self.is_shut_down())
			.finish_non_exhaustive()
	}
}

impl LivePage {
	/// Takes over a rendered page and subscribes the client to its initial events.
	///
	/// # Errors
	///
	/// Iff the initial subscriptions can't be sent. The page is shut down again in that case.
	#[instrument(skip_all, fields(qsid = %page.qsid))]
	pub fn start(page: RenderedPage, out: Arc<dyn RemoteOut>, lifecycle: Option<Arc<dyn PageLifecycle>>) -> Result<Arc<Self>, TransportError> {
		let RenderedPage {
			qsid,
			tree,
			root_component,
			registries,
			path,
			link,
			base_path,
		} = page;

		let live = Arc::new(Self {
			qsid,
			state: Mutex::new(PageState {
				tree: Node::Tag(tree),
				registries,
				path,
				root_component,
				subscription_diff_set: TempSubscriptionSet::new(),
			}),
			out,
			base_path,
			descriptors: Descriptors::new(),
			schedules: Schedules::new(link.runtime().cloned()),
			lifecycle,
			shut_down: AtomicBool::new(false),
		});
		if !link.attach(&live) {
			warn!("Rendered page was already attached to a session");
		}

		if let Some(lifecycle) = &live.lifecycle {
			lifecycle.on_open(&live);
		}

		let result = {
			let snapshot = live.state.lock();
			let mut subscriptions: Vec<_> = snapshot.registries.events.values().map(|event| event.subscription.clone()).collect();
			subscriptions.sort();
			trace!(count = subscriptions.len(), "Sending initial subscriptions");
			if subscriptions.is_empty() {
				Ok(())
			} else {
				live.out.send(OutMessage::ListenEvents { subscriptions })
			}
		};
		match result {
			Ok(()) => Ok(live),
			Err(error) => {
				live.shutdown();
				Err(error)
			}
		}
	}

	#[must_use]
	pub fn qsid(&self) -> &QualifiedSessionId {
		&self.qsid
	}

	#[must_use]
	pub fn is_shut_down(&self) -> bool {
		self.shut_down.load(Ordering::Acquire)
	}

	/// The session lock, unless this thread is inside a view or state update and may be holding it already.
	fn observe(&self) -> Option<MutexGuard<'_, PageState>> {
		if RenderingGuard::is_rendering() {
			warn!("The session was accessed from inside a view or state update. Do this from an event handler instead.");
			return None;
		}
		Some(self.state.lock())
	}

	/// The logical client-side path, as of the latest commit.
	///
	/// # Errors
	///
	/// [`UpdateError::Reentrant`] iff called from inside a view or state update.
	pub fn path(&self) -> Result<String, UpdateError> {
		Ok(self.observe().ok_or(UpdateError::Reentrant)?.path.clone())
	}

	/// A copy of the committed document tree.
	///
	/// # Errors
	///
	/// See [`LivePage::path`].
	pub fn snapshot_tree(&self) -> Result<Node, UpdateError> {
		Ok(self.observe().ok_or(UpdateError::Reentrant)?.tree.clone())
	}

	/// Sorted targets of all currently subscribed events.
	///
	/// # Errors
	///
	/// See [`LivePage::path`].
	pub fn event_targets(&self) -> Result<Vec<EventTarget>, UpdateError> {
		let mut targets: Vec<_> = self.observe().ok_or(UpdateError::Reentrant)?.registries.events.keys().cloned().collect();
		targets.sort();
		Ok(targets)
	}

	pub(crate) fn lock(&self) -> Result<MutexGuard<'_, PageState>, UpdateError> {
		let snapshot = self.state.lock();
		if self.is_shut_down() {
			return Err(UpdateError::ShutDown);
		}
		Ok(snapshot)
	}

	pub(crate) fn resolve_ref(&self, element_ref: &ElementRef) -> Result<TreePath, PropertyError> {
		let snapshot = self.observe().ok_or(PropertyError::Reentrant)?;
		snapshot.registries.refs.get(element_ref).cloned().ok_or(PropertyError::StaleRef)
	}

	/// Diffs `root` against the committed subtree at `root_path`, swaps it into the snapshot and transmits the delta.
	///
	/// `old` and `new` are the registrations of the re-rendered component subtree before and after.
	#[instrument(skip_all, fields(%root_path))]
	pub(crate) fn commit(
		&self,
		snapshot: &mut PageState,
		root_path: &TreePath,
		root: Tag,
		old: &Registries,
		new: Registries,
		navigation: Option<String>,
	) -> Result<(), TransportError> {
		let root = Node::Tag(root);
		let mut changes = DomChangeList::new();
		diff(snapshot.tree.descendant(root_path.as_slice()), &root, root_path, &mut changes);
		let (forget, listen) = snapshot.reconcile(old, &new, &changes);

		snapshot.replace(root_path, root);
		for target in old.events.keys() {
			snapshot.registries.events.remove(target);
		}
		for element_ref in old.refs.keys() {
			snapshot.registries.refs.remove(element_ref);
		}
		snapshot.registries.events.extend(new.events);
		snapshot.registries.refs.extend(new.refs);

		let navigation = navigation.filter(|path| *path != snapshot.path);
		if let Some(path) = &navigation {
			snapshot.path.clone_from(path);
		}

		trace!(changes = changes.len(), forget = forget.len(), listen = listen.len(), "Transmitting commit");
		if !changes.is_empty() {
			self.out.send(OutMessage::ModifyDom { changes: changes.into_changes() })?;
		}
		for target in forget {
			self.out.send(OutMessage::ForgetEvent { target })?;
		}
		if !listen.is_empty() {
			self.out.send(OutMessage::ListenEvents { subscriptions: listen })?;
		}
		if let Some(path) = navigation {
			self.out.send(OutMessage::PushHistory {
				path: join_path(&self.base_path, &path),
			})?;
		}
		Ok(())
	}

	/// Dispatches a client message.
	///
	/// Events without a current subscription and responses for unknown descriptors are expected races with re-renders, and are dropped.
	#[instrument(skip_all, fields(qsid = %self.qsid))]
	pub fn handle_message(self: &Arc<Self>, message: InMessage) {
		match message {
			InMessage::DomEvent { path, event_type, event_object } => self.dispatch_event(EventTarget::new(event_type, path), event_object),
			InMessage::ExtractPropertyResponse { descriptor, result } | InMessage::EvalJsResponse { descriptor, result } => {
				self.descriptors.resolve(descriptor, result.map_err(PropertyError::Client));
			}
		}
	}

	fn dispatch_event(self: &Arc<Self>, target: EventTarget, event_object: Value) {
		let handler = {
			let Some(snapshot) = self.observe() else {
				return;
			};
			if self.is_shut_down() {
				trace!("Ignoring event for a shut down session");
				return;
			}
			snapshot.registries.events.get(&target).map(|event| Arc::clone(&event.handler))
		};

		match handler {
			// Called outside the lock, so that the handler can update state.
			Some(handler) => handler(EventContext::new(Arc::clone(self), target.path, event_object)),
			None => trace!(path = %target.path, event_type = %target.event_type, "Ignoring event without a current subscription"),
		}
	}

	/// Sends `message` for a fresh descriptor and resolves with the client's correlated response.
	pub(crate) fn request(&self, message: impl FnOnce(u64) -> OutMessage) -> impl Future<Output = Result<Value, PropertyError>> + Send + 'static {
		let pending = self.descriptors.register().and_then(|(descriptor, receiver)| match self.out.send(message(descriptor)) {
			Ok(()) => Ok(receiver),
			Err(error) => {
				self.descriptors.cancel(descriptor);
				Err(PropertyError::from(error))
			}
		});
		async move { pending?.await.unwrap_or(Err(PropertyError::Abandoned)) }
	}

	/// Evaluates `code` on the client.
	pub fn eval_js(&self, code: impl Into<String>) -> impl Future<Output = Result<Value, PropertyError>> + Send + 'static {
		let code = code.into();
		self.request(move |descriptor| OutMessage::EvalJs { descriptor, code })
	}

	/// Sends `message` in order with committed re-renders.
	pub(crate) fn send_ordered(&self, message: OutMessage) -> Result<(), TransportError> {
		let _snapshot = self.observe().ok_or(TransportError::Reentrant)?;
		self.out.send(message)
	}

	/// Cancels all timers, abandons pending descriptors and notifies the lifecycle listener. Idempotent.
	///
	/// Waits for an in-flight commit to finish first.
	/// From inside a state update, that update's commit is refused instead.
	#[instrument(skip_all, fields(qsid = %self.qsid))]
	pub fn shutdown(&self) {
		if self.shut_down.swap(true, Ordering::AcqRel) {
			return;
		}
		{
			let _snapshot = (!RenderingGuard::is_rendering()).then(|| self.state.lock());
			let timers = self.schedules.cancel_all();
			let abandoned = self.descriptors.abandon_all();
			trace!(timers, abandoned, "Session shut down");
		}
		if let Some(lifecycle) = &self.lifecycle {
			lifecycle.on_close(self);
		}
	}
}

/// `base` and `path` joined by exactly one slash.
pub(crate) fn join_path(base: &str, path: &str) -> String {
	let base = base.trim_end_matches('/');
	let path = path.trim_start_matches('/');
	format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn joins_paths() {
		assert_eq!(join_path("/", "counter/5"), "/counter/5");
		assert_eq!(join_path("/app/", "/items"), "/app/items");
		assert_eq!(join_path("", ""), "/");
	}
}
