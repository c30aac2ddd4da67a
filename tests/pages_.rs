//! Shared test support: Small pages and ways to poke at them.

#![allow(dead_code)]

use crate::client_::{init_tracing, Recorder};
use live_dom::{
	component_view, ComponentDefinition, ComponentView, EventContext, InMessage, LiveConfig, LivePage, Node, PageRendering, PageStorage,
	QualifiedSessionId, RenderContext, RenderError, RenderedPage, StateUpdate, TreePath,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

pub type Slot<T> = Arc<Mutex<Option<T>>>;

/// Handles a view leaks out of its latest render pass and click.
#[derive(Clone)]
pub struct Handles<S> {
	pub update: Slot<StateUpdate<S>>,
	pub event: Slot<EventContext>,
}

impl<S> Default for Handles<S> {
	fn default() -> Self {
		Self {
			update: Slot::default(),
			event: Slot::default(),
		}
	}
}

impl<S: Send + Sync + 'static> Handles<S> {
	pub fn update(&self) -> StateUpdate<S> {
		self.update.lock().clone().expect("The view never rendered")
	}

	pub fn event(&self) -> EventContext {
		self.event.lock().clone().expect("No click was handled")
	}
}

pub fn qsid() -> QualifiedSessionId {
	QualifiedSessionId::new("device", "session")
}

/// `<html><body>…</body></html>`. With the synthesized head in front, the body's children start at `2_1`.
pub fn shell(context: &mut RenderContext, content: impl FnOnce(&mut RenderContext) -> Result<(), RenderError>) -> Result<(), RenderError> {
	context.element("html", |context| context.element("body", content))
}

/// A button at `2_1` showing the count. Clicking it increments the count.
pub fn counter(handles: &Handles<u32>) -> ComponentView<u32> {
	let handles = handles.clone();
	component_view(move |count: &u32, update, context| {
		*handles.update.lock() = Some(update.clone());
		shell(context, |context| {
			context.element("button", |context| {
				let update = update.clone();
				let event = Arc::clone(&handles.event);
				context.on("click", move |context| {
					*event.lock() = Some(context);
					update.apply(|count| count + 1).unwrap();
				});
				context.add_text_node(count.to_string());
				Ok(())
			})
		})
	})
}

pub fn rendering<S: Send + Sync + 'static>(definition: ComponentDefinition<(), S>, config: LiveConfig) -> PageRendering<(), S> {
	init_tracing();
	PageRendering::new(definition, config, Arc::new(PageStorage::new()))
}

pub fn render<S: Clone + Send + Sync + 'static>(state: S, view: ComponentView<S>) -> RenderedPage {
	let rendering = rendering(ComponentDefinition::with_initial_state(state.clone(), view), LiveConfig::default());
	let (_, page) = rendering.render_with_state(qsid(), state, "/").unwrap();
	page
}

/// Takes `page` live and discards its initial subscriptions.
pub fn start(page: RenderedPage) -> (Arc<LivePage>, Recorder) {
	let recorder = Recorder::default();
	let page = LivePage::start(page, Arc::new(recorder.clone()), None).unwrap();
	recorder.take();
	(page, recorder)
}

pub fn event(page: &Arc<LivePage>, path: &[u32], event_type: &str, event_object: Value) {
	page.handle_message(InMessage::DomEvent {
		path: TreePath::of(path),
		event_type: event_type.to_owned(),
		event_object,
	});
}

pub fn click(page: &Arc<LivePage>, path: &[u32]) {
	event(page, path, "click", Value::Null);
}

/// The text of the committed text node at `path`.
pub fn text_at(page: &LivePage, path: &[u32]) -> Option<String> {
	match page.snapshot_tree().unwrap().descendant(TreePath::of(path).as_slice()) {
		Some(Node::Text(text)) => Some(text.text.clone()),
		_ => None,
	}
}
