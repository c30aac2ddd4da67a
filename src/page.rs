//! The initial render boundary: From a resolved state to a document and a page awaiting its live connection.

use crate::{
	component::{ComponentNode, ComponentView, Registries, StateToPath},
	config::LiveConfig,
	error::{BoxError, PageError, RenderError, StateError},
	event::EventTarget,
	node::Tag,
	path::TreePath,
	render::RenderContext,
	session::PageLink,
	storage::PageStorage,
};
use core::fmt::{self, Debug, Display};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, instrument, trace};
use uuid::Uuid;

/// Identifies a page across requests: The client device plus one page load on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedSessionId {
	pub device_id: String,
	pub session_id: String,
}

impl QualifiedSessionId {
	#[must_use]
	pub fn new(device_id: impl Into<String>, session_id: impl Into<String>) -> Self {
		Self {
			device_id: device_id.into(),
			session_id: session_id.into(),
		}
	}

	/// A fresh session id for `device_id`, or for a new random device.
	#[must_use]
	pub fn generate(device_id: Option<&str>) -> Self {
		let random = || Uuid::new_v4().simple().to_string();
		Self {
			device_id: device_id.map_or_else(random, str::to_owned),
			session_id: random(),
		}
	}
}

impl Display for QualifiedSessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.device_id, self.session_id)
	}
}

/// Resolves a component's initial state from the request-side `origin`. May be asynchronous.
pub type StateResolver<T, S> = Arc<dyn Fn(&T) -> BoxFuture<'static, Result<S, BoxError>> + Send + Sync>;

/// How to build a component: Where its initial state comes from, its view and, optionally, how its state maps to a logical path.
pub struct ComponentDefinition<T, S> {
	resolve: StateResolver<T, S>,
	view: ComponentView<S>,
	state_to_path: Option<StateToPath<S>>,
}

impl<T, S> Clone for ComponentDefinition<T, S> {
	fn clone(&self) -> Self {
		Self {
			resolve: Arc::clone(&self.resolve),
			view: Arc::clone(&self.view),
			state_to_path: self.state_to_path.clone(),
		}
	}
}

impl<T, S> Debug for ComponentDefinition<T, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentDefinition")
			.field("navigates", &self.state_to_path.is_some())
			.finish_non_exhaustive()
	}
}

impl<T, S: Send + Sync + 'static> ComponentDefinition<T, S> {
	pub fn new(resolve: impl Fn(&T) -> BoxFuture<'static, Result<S, BoxError>> + Send + Sync + 'static, view: ComponentView<S>) -> Self {
		Self {
			resolve: Arc::new(resolve),
			view,
			state_to_path: None,
		}
	}

	/// A definition whose every page starts out with a clone of `state`.
	pub fn with_initial_state(state: S, view: ComponentView<S>) -> Self
	where
		S: Clone,
	{
		Self::new(move |_| future::ready(Ok(state.clone())).boxed(), view)
	}

	#[must_use]
	pub fn with_state_to_path(mut self, state_to_path: StateToPath<S>) -> Self {
		self.state_to_path = Some(state_to_path);
		self
	}

	/// # Errors
	///
	/// Iff the resolver fails.
	pub async fn resolve_state(&self, origin: &T) -> Result<S, StateError> {
		(self.resolve)(origin).await.map_err(StateError)
	}
}

/// The bootstrap configuration the client script reads on load.
#[derive(Debug, Clone, Copy)]
pub struct PageConfigScript<'a> {
	pub session_id: &'a str,
	pub base_path: &'a str,
	pub connection_lost_widget: &'a str,
	pub heartbeat_interval_ms: u64,
}

impl Display for PageConfigScript<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"window['kfg']={{sid:{},r:{},clw:{},heartbeatInterval:{}}}",
			js_string(self.session_id)?,
			js_string(self.base_path)?,
			js_string(self.connection_lost_widget)?,
			self.heartbeat_interval_ms
		)
	}
}

/// A JavaScript string literal that can't end its surrounding `<script>`.
fn js_string(s: &str) -> Result<String, fmt::Error> {
	serde_json::to_string(s).map(|json| json.replace("</", "<\\/")).map_err(|_| fmt::Error)
}

/// The HTTP response for an initial render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
	pub status_code: u16,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

/// A rendered page that awaits its live connection. See [`PageStorage::upgrade`].
pub struct RenderedPage {
	pub(crate) qsid: QualifiedSessionId,
	pub(crate) tree: Tag,
	pub(crate) root_component: Arc<dyn ComponentNode>,
	pub(crate) registries: Registries,
	pub(crate) path: String,
	pub(crate) link: PageLink,
	pub(crate) base_path: String,
}

impl RenderedPage {
	#[must_use]
	pub fn qsid(&self) -> &QualifiedSessionId {
		&self.qsid
	}

	#[must_use]
	pub fn tree(&self) -> &Tag {
		&self.tree
	}

	/// Sorted targets of the events rendered into the page.
	#[must_use]
	pub fn event_targets(&self) -> Vec<EventTarget> {
		let mut targets: Vec<_> = self.registries.events.keys().cloned().collect();
		targets.sort();
		targets
	}
}

impl Debug for RenderedPage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderedPage")
			.field("qsid", &self.qsid)
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}

const DEVICE_ID_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 365 * 10;

/// Renders pages of one root component and keeps them in [`PageStorage`] until their clients connect.
pub struct PageRendering<T, S> {
	root: ComponentDefinition<T, S>,
	config: Arc<LiveConfig>,
	storage: Arc<PageStorage>,
}

impl<T: Sync, S: Send + Sync + 'static> PageRendering<T, S> {
	#[must_use]
	pub fn new(root: ComponentDefinition<T, S>, config: LiveConfig, storage: Arc<PageStorage>) -> Self {
		Self {
			root,
			config: Arc::new(config),
			storage,
		}
	}

	#[must_use]
	pub fn storage(&self) -> &Arc<PageStorage> {
		&self.storage
	}

	/// Resolves the root state for `origin`, renders the document and stores the page for its upgrade.
	///
	/// # Errors
	///
	/// Iff state resolution or rendering fails. No page is stored in that case.
	#[instrument(skip_all, fields(%qsid, %path))]
	pub async fn render(&self, qsid: QualifiedSessionId, origin: &T, path: &str) -> Result<RenderedDocument, PageError> {
		let state = match self.root.resolve_state(origin).await {
			Ok(state) => state,
			Err(state_error) => {
				error!("Initial state resolution failed: {}", state_error);
				return Err(state_error.into());
			}
		};
		let (document, page) = self.render_with_state(qsid, state, path)?;
		self.storage.insert_rendered(page);
		Ok(document)
	}

	/// Renders the document for an already resolved `state`, without storing the page.
	///
	/// # Errors
	///
	/// Iff the root view fails or misuses its [`RenderContext`].
	pub fn render_with_state(&self, qsid: QualifiedSessionId, state: S, path: &str) -> Result<(RenderedDocument, RenderedPage), RenderError> {
		let config = &*self.config;
		let bootstrap = PageConfigScript {
			session_id: &qsid.session_id,
			base_path: &config.base_path,
			connection_lost_widget: &config.connection_lost_widget,
			heartbeat_interval_ms: config.heartbeat_interval_ms,
		};
		let head_scripts = vec![
			Tag::html("script").with_text(bootstrap.to_string()),
			Tag::html("script")
				.with_attr("src", config.client_script_src.as_str(), false)
				.with_attr("defer", "defer", false),
		];
		let link = PageLink::new(Handle::try_current().ok(), Some(head_scripts));

		let mut context = RenderContext::new(link.clone(), TreePath::root());
		let result = context
			.render_component(state, Arc::clone(&self.root.view), self.root.state_to_path.clone())
			.map(drop);
		let rendered = context.finish(result)?;
		let root_component = rendered.root_component.ok_or(RenderError::NoRootElement)?;

		let mut registries = Registries::default();
		root_component.collect(&mut registries);
		trace!(events = registries.events.len(), refs = registries.refs.len(), "Rendered page");

		let mut headers = rendered.headers;
		headers.push(("content-type".to_owned(), "text/html; charset=utf-8".to_owned()));
		headers.push(("cache-control".to_owned(), "no-store, no-cache, must-revalidate".to_owned()));
		headers.push((
			"set-cookie".to_owned(),
			format!(
				"{}={}; Path=/; Max-Age={}; SameSite=Lax",
				config.device_id_cookie, qsid.device_id, DEVICE_ID_MAX_AGE_SECONDS
			),
		));

		let doc_type = rendered.doc_type.unwrap_or_else(|| config.doc_type.clone());
		let document = RenderedDocument {
			status_code: rendered.status_code,
			headers,
			body: format!("{}{}", doc_type, rendered.root),
		};

		let page = RenderedPage {
			qsid,
			tree: rendered.root,
			root_component,
			registries,
			path: path.to_owned(),
			link,
			base_path: config.base_path.clone(),
		};
		Ok((document, page))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_script_escapes_strings() {
		let script = PageConfigScript {
			session_id: "s1",
			base_path: "/",
			connection_lost_widget: "<div class='x'>lost</div>",
			heartbeat_interval_ms: 5000,
		};
		assert_eq!(
			script.to_string(),
			r#"window['kfg']={sid:"s1",r:"/",clw:"<div class='x'>lost<\/div>",heartbeatInterval:5000}"#
		);
	}

	#[test]
	fn generated_ids_are_distinct() {
		let a = QualifiedSessionId::generate(Some("device"));
		let b = QualifiedSessionId::generate(Some("device"));
		assert_eq!(a.device_id, "device");
		assert_ne!(a.session_id, b.session_id);
		assert_ne!(QualifiedSessionId::generate(None).device_id, "device");
	}
}
