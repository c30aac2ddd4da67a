//! The stack-scoped tree builder handed to views.

use crate::{
	component::{Component, ComponentNode, ComponentView, Registries, StateToPath, StateUpdate},
	error::RenderError,
	event::{ElementRef, Event, EventModifier, EventTarget, Subscription},
	event_context::EventContext,
	node::{Node, Tag, Text, XmlNs},
	path::TreePath,
	session::PageLink,
};
use core::cell::Cell;
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Builds one render pass's [`Tag`] tree, assigning [`TreePath`]s by position and attributing events and references to the innermost open component.
///
/// The first structural error is recorded and logged; every later call of the pass is ignored,
/// and the error is what the pass reports in the end.
pub struct RenderContext {
	root_path: TreePath,
	link: PageLink,
	stack: Vec<(TreePath, Tag)>,
	root: Option<Tag>,
	components: Vec<Scope>,
	root_component: Option<Arc<dyn ComponentNode>>,
	head_injected: bool,
	error: Option<RenderError>,
	status_code: u16,
	headers: Vec<(String, String)>,
	doc_type: Option<String>,
}

struct Scope {
	/// Stack depth at which the component's root element opens.
	depth: usize,
	output: ScopeOutput,
}

/// What a component scope collected during a render pass.
#[derive(Default)]
pub(crate) struct ScopeOutput {
	pub root_path: Option<TreePath>,
	pub registries: Registries,
	pub children: Vec<Arc<dyn ComponentNode>>,
}

impl ScopeOutput {
	/// The events and references of this scope and, recursively, of its child components.
	pub(crate) fn flattened(&self) -> Registries {
		let mut registries = self.registries.clone();
		for child in &self.children {
			child.collect(&mut registries);
		}
		registries
	}
}

/// A finished render pass of a whole document.
pub(crate) struct RenderedTree {
	pub root: Tag,
	pub root_component: Option<Arc<dyn ComponentNode>>,
	pub status_code: u16,
	pub headers: Vec<(String, String)>,
	pub doc_type: Option<String>,
}

thread_local! {
	static RENDERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as rendering for as long as it is held.
pub(crate) struct RenderingGuard(());

impl RenderingGuard {
	pub(crate) fn enter() -> Self {
		RENDERING.with(|rendering| rendering.set(rendering.get() + 1));
		Self(())
	}

	pub(crate) fn is_rendering() -> bool {
		RENDERING.with(Cell::get) > 0
	}
}

impl Drop for RenderingGuard {
	fn drop(&mut self) {
		RENDERING.with(|rendering| rendering.set(rendering.get() - 1));
	}
}

impl RenderContext {
	pub(crate) fn new(link: PageLink, root_path: TreePath) -> Self {
		Self {
			root_path,
			link,
			stack: Vec::new(),
			root: None,
			components: Vec::new(),
			root_component: None,
			head_injected: false,
			error: None,
			status_code: 200,
			headers: Vec::new(),
			doc_type: None,
		}
	}

	/// Runs an existing component's `view` in a fresh scope rooted at `root_path`.
	///
	/// Nothing is installed anywhere: The caller commits the returned output if it decides to.
	pub(crate) fn rerender(
		link: PageLink,
		root_path: TreePath,
		view: impl FnOnce(&mut Self) -> Result<(), RenderError>,
	) -> Result<(Tag, ScopeOutput), RenderError> {
		let _guard = RenderingGuard::enter();
		let mut context = Self::new(link, root_path);
		context.open_component();
		if let Err(error) = view(&mut context) {
			context.fail(error);
		}
		let scope = context.close_component();
		let rendered = context.finish(Ok(()))?;
		Ok((rendered.root, scope.unwrap_or_default()))
	}

	/// Reports the first error of the pass, or else the tree it built.
	pub(crate) fn finish(mut self, result: Result<(), RenderError>) -> Result<RenderedTree, RenderError> {
		if let Some(error) = self.error.take() {
			return Err(error);
		}
		result?;
		if let Some((_, open)) = self.stack.last() {
			return Err(RenderError::Unclosed(open.name.clone()));
		}
		Ok(RenderedTree {
			root: self.root.ok_or(RenderError::NoRootElement)?,
			root_component: self.root_component,
			status_code: self.status_code,
			headers: self.headers,
			doc_type: self.doc_type,
		})
	}

	fn fail(&mut self, error: RenderError) {
		if self.error.is_none() {
			error!("Render pass failed: {}", error);
			self.error = Some(error);
		}
	}

	fn check(&self) -> Result<(), RenderError> {
		match self.error {
			Some(_) => Err(RenderError::Aborted),
			None => Ok(()),
		}
	}

	/// The path of the innermost open element.
	#[must_use]
	pub fn current_path(&self) -> Option<&TreePath> {
		self.stack.last().map(|(path, _)| path)
	}

	pub fn open_node(&mut self, ns: XmlNs, name: impl Into<String>) {
		if self.error.is_some() {
			return;
		}
		let name = name.into();

		if ns == XmlNs::Html && name == "body" && !self.head_injected {
			if let Some((_, parent)) = self.stack.last_mut() {
				if let Some(scripts) = self.link.head_scripts() {
					trace!("Synthesizing <head> for bootstrap scripts");
					let mut head = Tag::html("head");
					head.children.extend(scripts.iter().cloned().map(Node::Tag));
					parent.children.push(Node::Tag(head));
					self.head_injected = true;
				}
			}
		}

		let path = match self.stack.last() {
			Some((parent_path, parent)) => parent_path.child_at_index(parent.children.len()),
			None if self.root.is_none() => self.root_path.clone(),
			None => {
				let path = self.root_path.clone();
				return self.fail(RenderError::SecondRootElement { name, path });
			}
		};

		// A component whose root is another component shares that root element.
		let depth = self.stack.len();
		let rooted = self.components.iter().rev().take_while(|scope| scope.depth == depth).count();
		let first = self.components.len() - rooted;
		if self.components[first..].iter().any(|scope| scope.output.root_path.is_some()) {
			return self.fail(RenderError::SecondRootElement { name, path });
		}
		for scope in &mut self.components[first..] {
			scope.output.root_path = Some(path.clone());
		}

		self.stack.push((path, Tag::new(ns, name)));
	}

	pub fn close_node(&mut self, name: &str) {
		if self.error.is_some() {
			return;
		}

		let Some((_, open)) = self.stack.last_mut() else {
			return self.fail(RenderError::NoOpenElement("close_node"));
		};
		if open.name != name {
			return self.fail(RenderError::UnbalancedClose(name.to_owned()));
		}
		if open.ns == XmlNs::Html && open.name == "head" && !self.head_injected {
			if let Some(scripts) = self.link.head_scripts() {
				open.children.extend(scripts.iter().cloned().map(Node::Tag));
				self.head_injected = true;
			}
		}

		if let Some((_, closed)) = self.stack.pop() {
			match self.stack.last_mut() {
				Some((_, parent)) => parent.children.push(Node::Tag(closed)),
				None => self.root = Some(closed),
			}
		}
	}

	/// Opens an HTML element, runs `content` inside it and closes it again.
	pub fn element(&mut self, name: &str, content: impl FnOnce(&mut Self) -> Result<(), RenderError>) -> Result<(), RenderError> {
		self.open_node(XmlNs::Html, name);
		content(self)?;
		self.close_node(name);
		self.check()
	}

	pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>, is_property: bool) {
		if self.error.is_some() {
			return;
		}
		match self.stack.last_mut() {
			Some((_, open)) => open.set_attr(name, value, is_property),
			None => self.fail(RenderError::NoOpenElement("set_attr")),
		}
	}

	pub fn set_style(&mut self, name: impl Into<String>, value: impl Into<String>) {
		if self.error.is_some() {
			return;
		}
		match self.stack.last_mut() {
			Some((_, open)) => open.set_style(name, value),
			None => self.fail(RenderError::NoOpenElement("set_style")),
		}
	}

	/// Appends a text child to the innermost open element. Text occupies a sibling index like an element does.
	pub fn add_text_node(&mut self, text: impl Into<String>) {
		if self.error.is_some() {
			return;
		}
		let depth = self.stack.len();
		let Some((path, open)) = self.stack.last_mut() else {
			return self.fail(RenderError::NoOpenElement("add_text_node"));
		};
		if matches!(self.components.last(), Some(scope) if scope.depth == depth) {
			let path = path.child_at_index(open.children.len());
			return self.fail(RenderError::StrayText { path });
		}
		open.children.push(Node::Text(Text::new(text)));
	}

	/// Registers `handler` for `event_type` on the element at `element_path`, or on the innermost open element.
	///
	/// The event belongs to the innermost open component.
	pub fn add_event(
		&mut self,
		element_path: Option<TreePath>,
		event_type: impl Into<String>,
		handler: impl Fn(EventContext) + Send + Sync + 'static,
		prevent_default: bool,
		modifier: EventModifier,
	) {
		if self.error.is_some() {
			return;
		}
		let Some(path) = element_path.or_else(|| self.current_path().cloned()) else {
			return self.fail(RenderError::NoOpenElement("add_event"));
		};
		let Some(scope) = self.components.last_mut() else {
			return self.fail(RenderError::NoOpenComponent("add_event"));
		};

		let target = EventTarget::new(event_type, path);
		let event = Event {
			subscription: Subscription {
				target: target.clone(),
				prevent_default,
				modifier,
			},
			handler: Arc::new(handler),
		};
		if scope.output.registries.events.insert(target, event).is_some() {
			warn!("An event was registered twice on the same target during one render pass. Only the later handler is kept.");
		}
	}

	/// [`RenderContext::add_event`] on the innermost open element, without default prevention or modifier.
	pub fn on(&mut self, event_type: impl Into<String>, handler: impl Fn(EventContext) + Send + Sync + 'static) {
		self.add_event(None, event_type, handler, false, EventModifier::None);
	}

	/// Resolves `element_ref` to the innermost open element until the owning component renders again.
	pub fn add_ref(&mut self, element_ref: &ElementRef) {
		if self.error.is_some() {
			return;
		}
		let Some(path) = self.current_path().cloned() else {
			return self.fail(RenderError::NoOpenElement("add_ref"));
		};
		let Some(scope) = self.components.last_mut() else {
			return self.fail(RenderError::NoOpenComponent("add_ref"));
		};
		scope.output.registries.refs.insert(element_ref.clone(), path);
	}

	pub fn set_status_code(&mut self, status_code: u16) {
		self.status_code = status_code;
	}

	pub fn set_headers(&mut self, headers: impl IntoIterator<Item = (String, String)>) {
		self.headers.extend(headers);
	}

	pub fn set_doc_type(&mut self, doc_type: impl Into<String>) {
		self.doc_type = Some(doc_type.into());
	}

	pub(crate) fn open_component(&mut self) {
		self.components.push(Scope {
			depth: self.stack.len(),
			output: ScopeOutput::default(),
		});
	}

	pub(crate) fn close_component(&mut self) -> Option<ScopeOutput> {
		let scope = self.components.pop()?;
		if self.error.is_none() {
			if self.stack.len() > scope.depth {
				let name = self.stack.last().map(|(_, open)| open.name.clone()).unwrap_or_default();
				self.fail(RenderError::Unclosed(name));
			} else if scope.output.root_path.is_none() {
				self.fail(RenderError::NoRootElement);
			}
		}
		Some(scope.output)
	}

	/// Renders a new child component with `state` in place.
	///
	/// # Errors
	///
	/// Iff the child's view fails or misuses the context.
	/// The returned error is [`RenderError::Aborted`] in that case; the pass reports the original one.
	pub fn component<S: Send + Sync + 'static>(&mut self, state: S, view: ComponentView<S>) -> Result<StateUpdate<S>, RenderError> {
		self.render_component(state, view, None).map(|component| component.state_update())
	}

	/// Like [`RenderContext::component`], additionally pushing `state_to_path`'s result as client-side history whenever it changes.
	///
	/// # Errors
	///
	/// See [`RenderContext::component`].
	pub fn component_with_navigation<S: Send + Sync + 'static>(
		&mut self,
		state: S,
		view: ComponentView<S>,
		state_to_path: StateToPath<S>,
	) -> Result<StateUpdate<S>, RenderError> {
		self.render_component(state, view, Some(state_to_path)).map(|component| component.state_update())
	}

	pub(crate) fn render_component<S: Send + Sync + 'static>(
		&mut self,
		state: S,
		view: ComponentView<S>,
		state_to_path: Option<StateToPath<S>>,
	) -> Result<Arc<Component<S>>, RenderError> {
		self.check()?;
		let _guard = RenderingGuard::enter();

		let state = Arc::new(state);
		let component = Component::new(Arc::clone(&state), Arc::clone(&view), state_to_path, self.link.clone());
		let update = component.state_update();
		let depth = self.stack.len();

		self.open_component();
		let result = view(&*state, &update, self);
		if let Err(error) = result {
			self.stack.truncate(depth);
			self.components.pop();
			self.fail(error);
			return Err(RenderError::Aborted);
		}
		let output = self.close_component();
		self.check()?;

		if let Some(output) = output {
			component.install(output);
		}
		let node: Arc<dyn ComponentNode> = component.clone();
		match self.components.last_mut() {
			Some(parent) => parent.output.children.push(node),
			None => self.root_component = Some(node),
		}
		Ok(component)
	}
}
