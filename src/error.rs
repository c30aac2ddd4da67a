use crate::path::TreePath;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural misuse of a [`RenderContext`](`crate::RenderContext`), or a failing view.
#[derive(Debug, Error)]
pub enum RenderError {
	#[error("The view did not open a root element")]
	NoRootElement,
	#[error("A second root element <{name}> was opened at {path:?}, but a render pass produces exactly one root")]
	SecondRootElement { name: String, path: TreePath },
	#[error("`{0}` requires an open element")]
	NoOpenElement(&'static str),
	#[error("Tried to close <{0}>, which is not the innermost open element")]
	UnbalancedClose(String),
	#[error("<{0}> was left open at the end of its scope")]
	Unclosed(String),
	#[error("Text at {path:?} lies outside of its component's root element")]
	StrayText { path: TreePath },
	#[error("`{0}` requires an open component")]
	NoOpenComponent(&'static str),
	#[error("View failed")]
	View(#[source] BoxError),
	#[error("Rendering was aborted by an earlier failure")]
	Aborted,
}

impl RenderError {
	/// Wraps an application error raised by view code.
	pub fn view(error: impl Into<BoxError>) -> Self {
		Self::View(error.into())
	}
}

#[derive(Debug, Error)]
#[error("State resolution failed")]
pub struct StateError(#[source] pub BoxError);

/// A page could not be constructed. No session exists in this case.
#[derive(Debug, Error)]
pub enum PageError {
	#[error(transparent)]
	State(#[from] StateError),
	#[error(transparent)]
	Render(#[from] RenderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	#[error("The connection is closed")]
	Closed,
	#[error("Delivery failed: {0}")]
	Other(String),
	#[error("Commands cannot be sent from inside a view or state update on the same thread")]
	Reentrant,
}

/// Why a state update did not produce a committed re-render.
#[derive(Debug, Error)]
pub enum UpdateError {
	#[error("Re-render failed; the previous snapshot stays authoritative")]
	Render(#[from] RenderError),
	/// The commit succeeded, but the resulting commands could not be delivered.
	#[error("Commands could not be delivered")]
	Transport(#[from] TransportError),
	#[error("The session is shut down")]
	ShutDown,
	#[error("The component is not attached to a live session")]
	NotLive,
	#[error("Asynchronous updates require a tokio runtime")]
	NoRuntime,
	#[error("Recurring timers need a non-zero period")]
	ZeroPeriod,
	#[error("The session cannot be accessed from inside a view or state update on the same thread")]
	Reentrant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
	#[error("The client reported: {0}")]
	Client(String),
	#[error("The session shut down before the client responded")]
	Abandoned,
	#[error("The element reference no longer resolves")]
	StaleRef,
	#[error("References cannot be resolved from inside a view or state update on the same thread")]
	Reentrant,
	#[error(transparent)]
	Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("No rendered page awaits an upgrade for this session id")]
	UnknownPage,
	#[error("A live session with this id already exists")]
	AlreadyLive,
	#[error(transparent)]
	Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
#[error("Invalid configuration")]
pub struct ConfigError(#[from] pub toml::de::Error);
