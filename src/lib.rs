//! Server-side DOM reconciliation for live pages.
//!
//! Views render component state into a [`RenderContext`], producing a [`Tag`] tree addressed by [`TreePath`].
//! Once a client connects, every state update re-renders only the affected component,
//! [`diff`]s the result against the committed snapshot and sends the client an ordered batch of [`OutMessage`]s.

#![doc(html_root_url = "https://docs.rs/live-dom/0.0.1")]
#![warn(clippy::pedantic)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod component;
mod config;
mod diff;
mod error;
mod event;
mod event_context;
mod node;
mod page;
mod path;
mod properties;
mod render;
mod schedule;
mod session;
mod storage;
mod temp_set;

pub use component::{component_view, ComponentView, StateToPath, StateUpdate};
pub use config::LiveConfig;
pub use diff::{diff, DomChange, DomChangeList, DomChanges};
pub use error::{BoxError, ConfigError, PageError, PropertyError, RenderError, SessionError, StateError, TransportError, UpdateError};
pub use event::{ElementRef, Event, EventHandler, EventModifier, EventTarget, Subscription};
pub use event_context::EventContext;
pub use node::{AttrValue, NameMap, Node, Tag, Text, XmlNs};
pub use page::{ComponentDefinition, PageConfigScript, PageRendering, QualifiedSessionId, RenderedDocument, RenderedPage, StateResolver};
pub use path::{ParseTreePathError, TreePath};
pub use properties::PropertiesHandle;
pub use render::RenderContext;
pub use schedule::Timer;
pub use session::{InMessage, LivePage, OutMessage, PageLifecycle, RemoteOut};
pub use storage::PageStorage;
