use crate::{
	error::SessionError,
	page::{QualifiedSessionId, RenderedPage},
	session::{LivePage, PageLifecycle, RemoteOut},
};
use core::time::Duration;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{sync::Arc, time::Instant};
use tracing::{instrument, trace, warn};

/// Pages by session id: Rendered ones awaiting their connection, and live ones.
///
/// This is the only structure shared between sessions. It never takes a session's lock.
#[derive(Debug, Default)]
pub struct PageStorage {
	rendered: DashMap<QualifiedSessionId, (Instant, RenderedPage)>,
	live: DashMap<QualifiedSessionId, Arc<LivePage>>,
}

impl PageStorage {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces any rendered page with the same id that wasn't upgraded yet.
	pub fn insert_rendered(&self, page: RenderedPage) {
		if self.rendered.insert(page.qsid().clone(), (Instant::now(), page)).is_some() {
			warn!("Replaced a rendered page that was never upgraded");
		}
	}

	/// Takes the rendered page for `qsid` live over `out`.
	///
	/// # Errors
	///
	/// Iff there is no such rendered page, a live page with the same id exists or the initial subscriptions can't be sent.
	#[instrument(skip_all, fields(%qsid))]
	pub fn upgrade(
		&self,
		qsid: &QualifiedSessionId,
		out: Arc<dyn RemoteOut>,
		lifecycle: Option<Arc<dyn PageLifecycle>>,
	) -> Result<Arc<LivePage>, SessionError> {
		if self.live.contains_key(qsid) {
			return Err(SessionError::AlreadyLive);
		}
		let (_, (_, rendered)) = self.rendered.remove(qsid).ok_or(SessionError::UnknownPage)?;
		let page = LivePage::start(rendered, out, lifecycle)?;

		match self.live.entry(qsid.clone()) {
			Entry::Occupied(_) => {
				page.shutdown();
				Err(SessionError::AlreadyLive)
			}
			Entry::Vacant(vacant) => {
				vacant.insert(Arc::clone(&page));
				trace!("Page is live");
				Ok(page)
			}
		}
	}

	/// Drops the rendered page for `qsid` without taking it live, for example when its client navigated away.
	///
	/// Returns whether there was one.
	pub fn discard_rendered(&self, qsid: &QualifiedSessionId) -> bool {
		self.rendered.remove(qsid).is_some()
	}

	/// Drops all rendered pages that have been waiting for their connection for longer than `max_age`.
	///
	/// Returns how many were dropped.
	#[instrument(skip(self))]
	pub fn evict_rendered(&self, max_age: Duration) -> usize {
		let mut evicted = 0;
		self.rendered.retain(|_, (rendered_at, _)| {
			let keep = rendered_at.elapsed() <= max_age;
			evicted += usize::from(!keep);
			keep
		});
		if evicted > 0 {
			trace!(evicted, "Evicted rendered pages that were never upgraded");
		}
		evicted
	}

	#[must_use]
	pub fn get(&self, qsid: &QualifiedSessionId) -> Option<Arc<LivePage>> {
		self.live.get(qsid).map(|page| Arc::clone(&*page))
	}

	/// Removes the live page for `qsid` and shuts it down.
	///
	/// Returns whether there was one.
	pub fn shutdown(&self, qsid: &QualifiedSessionId) -> bool {
		match self.live.remove(qsid) {
			Some((_, page)) => {
				page.shutdown();
				true
			}
			None => false,
		}
	}

	#[must_use]
	pub fn rendered_count(&self) -> usize {
		self.rendered.len()
	}

	#[must_use]
	pub fn live_count(&self) -> usize {
		self.live.len()
	}
}
