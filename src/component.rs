//! Stateful components and the handles that update them.

use crate::{
	error::{RenderError, UpdateError},
	event::{ElementRef, Event, EventTarget},
	path::TreePath,
	render::{RenderContext, RenderingGuard, ScopeOutput},
	session::PageLink,
};
use core::{
	fmt::{self, Debug},
	future::Future,
	mem,
	sync::atomic::{AtomicBool, Ordering},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{instrument, trace, warn};

/// Renders a component's state into the current [`RenderContext`].
///
/// Views must be pure with respect to the page: They are run again on every re-render of their component,
/// and a failing or panicking view leaves the previously committed page untouched.
pub type ComponentView<S> = Arc<dyn Fn(&S, &StateUpdate<S>, &mut RenderContext) -> Result<(), RenderError> + Send + Sync>;

/// Wraps `view` as [`ComponentView`], fixing its signature for closure inference.
pub fn component_view<S>(view: impl Fn(&S, &StateUpdate<S>, &mut RenderContext) -> Result<(), RenderError> + Send + Sync + 'static) -> ComponentView<S> {
	Arc::new(view)
}

/// Maps a new state and the current logical path to the logical path after the update.
pub type StateToPath<S> = Arc<dyn Fn(&S, &str) -> String + Send + Sync>;

/// Events and references, as declared during one render pass.
#[derive(Debug, Default, Clone)]
pub(crate) struct Registries {
	pub events: HashMap<EventTarget, Event>,
	pub refs: HashMap<ElementRef, TreePath>,
}

/// Type-erased view of a component in the component tree.
pub(crate) trait ComponentNode: Send + Sync {
	/// Adds this component's own and all descendants' registrations to `into`.
	fn collect(&self, into: &mut Registries);

	/// Marks this subtree as discarded. Updates through its handles are dropped from then on.
	fn detach(&self);
}

pub(crate) struct Component<S> {
	this: Weak<Self>,
	view: ComponentView<S>,
	state_to_path: Option<StateToPath<S>>,
	link: PageLink,
	attached: AtomicBool,
	inner: Mutex<ComponentInner<S>>,
}

struct ComponentInner<S> {
	state: Arc<S>,
	rendered: ScopeOutput,
}

impl<S: Send + Sync + 'static> Component<S> {
	pub(crate) fn new(state: Arc<S>, view: ComponentView<S>, state_to_path: Option<StateToPath<S>>, link: PageLink) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			this: this.clone(),
			view,
			state_to_path,
			link,
			attached: AtomicBool::new(true),
			inner: Mutex::new(ComponentInner {
				state,
				rendered: ScopeOutput::default(),
			}),
		})
	}

	pub(crate) fn state_update(&self) -> StateUpdate<S> {
		StateUpdate { component: self.this.clone() }
	}

	pub(crate) fn install(&self, rendered: ScopeOutput) {
		self.inner.lock().rendered = rendered;
	}

	pub(crate) fn state(&self) -> Arc<S> {
		Arc::clone(&self.inner.lock().state)
	}

	fn flattened(&self) -> Registries {
		let mut registries = Registries::default();
		self.collect(&mut registries);
		registries
	}

	/// Re-renders this component with the state computed by `next`, then commits and transmits the result.
	///
	/// The session lock is held from before `next` runs until the resulting commands are handed to the transport.
	#[instrument(skip_all)]
	fn update(&self, next: impl FnOnce(&S) -> Option<S>) -> Result<(), UpdateError> {
		if RenderingGuard::is_rendering() {
			warn!("State update issued from inside a view. Schedule it from an event handler instead.");
			return Err(UpdateError::Reentrant);
		}

		let page = self.link.live().ok_or(UpdateError::NotLive)?;
		let mut snapshot = page.lock()?;

		if !self.attached.load(Ordering::Acquire) {
			trace!("Dropping state update of a detached component");
			return Ok(());
		}

		let (old_state, root_path) = {
			let inner = self.inner.lock();
			(Arc::clone(&inner.state), inner.rendered.root_path.clone())
		};
		let Some(root_path) = root_path else {
			warn!("Dropping state update of a component that never rendered");
			return Ok(());
		};

		let (new_state, root, rendered) = {
			let _guard = RenderingGuard::enter();
			let Some(new_state) = next(&old_state) else {
				trace!("Update produced no new state");
				return Ok(());
			};
			let new_state = Arc::new(new_state);
			let update = self.state_update();
			let (root, rendered) = RenderContext::rerender(self.link.clone(), root_path.clone(), |context| (self.view)(&*new_state, &update, context))?;
			(new_state, root, rendered)
		};

		if page.is_shut_down() {
			trace!("Session shut down during the update");
			return Err(UpdateError::ShutDown);
		}

		let old = self.flattened();
		let new = rendered.flattened();
		let navigation = self.state_to_path.as_ref().map(|state_to_path| state_to_path(&new_state, snapshot.path()));

		let discarded = {
			let mut inner = self.inner.lock();
			inner.state = new_state;
			mem::replace(&mut inner.rendered, rendered).children
		};
		for child in discarded {
			child.detach();
		}

		page.commit(&mut snapshot, &root_path, root, &old, new, navigation)?;
		Ok(())
	}
}

impl<S: Send + Sync + 'static> ComponentNode for Component<S> {
	fn collect(&self, into: &mut Registries) {
		let children = {
			let inner = self.inner.lock();
			let registries = &inner.rendered.registries;
			into.events.extend(registries.events.iter().map(|(target, event)| (target.clone(), event.clone())));
			into.refs.extend(registries.refs.iter().map(|(element_ref, path)| (element_ref.clone(), path.clone())));
			inner.rendered.children.clone()
		};
		for child in children {
			child.collect(into);
		}
	}

	fn detach(&self) {
		self.attached.store(false, Ordering::Release);
		let children = self.inner.lock().rendered.children.clone();
		for child in children {
			child.detach();
		}
	}
}

/// A handle that changes a component's state, each call re-rendering the component once.
///
/// Handles don't keep their component alive.
/// Updates through the handle of a component that was discarded by its parent's re-render are dropped silently.
pub struct StateUpdate<S> {
	component: Weak<Component<S>>,
}

impl<S> Clone for StateUpdate<S> {
	fn clone(&self) -> Self {
		Self { component: self.component.clone() }
	}
}

impl<S> Debug for StateUpdate<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StateUpdate").field("live", &(self.component.strong_count() > 0)).finish()
	}
}

impl<S: Send + Sync + 'static> StateUpdate<S> {
	fn with_component(&self, f: impl FnOnce(&Component<S>) -> Result<(), UpdateError>) -> Result<(), UpdateError> {
		match self.component.upgrade() {
			Some(component) => f(&component),
			None => {
				trace!("Dropping state update of a dropped component");
				Ok(())
			}
		}
	}

	/// Replaces the state.
	///
	/// # Errors
	///
	/// Iff the re-render fails or its result can't be transmitted.
	/// The previously committed state stays in place in the former case.
	pub fn set(&self, state: S) -> Result<(), UpdateError> {
		self.with_component(|component| component.update(|_| Some(state)))
	}

	/// Computes the new state from the committed one, under the session lock.
	///
	/// # Errors
	///
	/// See [`StateUpdate::set`].
	pub fn apply(&self, f: impl FnOnce(&S) -> S) -> Result<(), UpdateError> {
		self.with_component(|component| component.update(|state| Some(f(state))))
	}

	/// Like [`StateUpdate::apply`], but [`None`] skips the re-render.
	///
	/// # Errors
	///
	/// See [`StateUpdate::set`].
	pub fn apply_if_present(&self, f: impl FnOnce(&S) -> Option<S>) -> Result<(), UpdateError> {
		self.with_component(|component| component.update(f))
	}

	/// Sets the state once `state` resolves, on the page's runtime.
	///
	/// The session lock is not held while waiting.
	/// Failures of the eventual update are logged, as there is no caller left to report them to.
	///
	/// # Errors
	///
	/// Iff no tokio runtime was available when the page was rendered.
	pub fn set_when_complete(&self, state: impl Future<Output = S> + Send + 'static) -> Result<(), UpdateError> {
		let Some(component) = self.component.upgrade() else {
			trace!("Dropping deferred state update of a dropped component");
			return Ok(());
		};
		let runtime = component.link.runtime().ok_or(UpdateError::NoRuntime)?;
		let update = self.clone();
		runtime.spawn(async move {
			let state = state.await;
			// Committing blocks on the session lock.
			match tokio::task::spawn_blocking(move || update.set(state)).await {
				Ok(Ok(())) => (),
				Ok(Err(error)) => warn!("Deferred state update failed: {}", error),
				Err(error) => warn!("Deferred state update did not complete: {}", error),
			}
		});
		Ok(())
	}

	/// The currently committed state, unless the component was dropped.
	#[must_use]
	pub fn state(&self) -> Option<Arc<S>> {
		self.component.upgrade().map(|component| component.state())
	}
}
