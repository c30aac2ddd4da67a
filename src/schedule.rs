//! Session-owned timers.

use crate::error::UpdateError;
use core::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};
use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::{
	runtime::Handle,
	task::AbortHandle,
	time::{self, Instant, MissedTickBehavior},
};
use tracing::trace;

#[derive(Debug)]
struct Table {
	next: AtomicU64,
	/// [`None`] once the session shut down.
	tasks: Mutex<Option<HashMap<u64, AbortHandle>>>,
}

impl Table {
	fn remove(&self, id: u64) {
		if let Some(tasks) = self.tasks.lock().as_mut() {
			tasks.remove(&id);
		}
	}
}

/// The timers of one session. Callbacks run on blocking threads of the page's runtime, since they usually re-render.
#[derive(Debug)]
pub(crate) struct Schedules {
	runtime: Option<Handle>,
	table: Arc<Table>,
}

impl Schedules {
	pub(crate) fn new(runtime: Option<Handle>) -> Self {
		Self {
			runtime,
			table: Arc::new(Table {
				next: AtomicU64::new(1),
				tasks: Mutex::new(Some(HashMap::new())),
			}),
		}
	}

	fn spawn(&self, task: impl FnOnce(u64, Weak<Table>) -> BoxFuture<'static, ()>) -> Result<Timer, UpdateError> {
		let runtime = self.runtime.as_ref().ok_or(UpdateError::NoRuntime)?;
		let mut tasks = self.table.tasks.lock();
		let tasks = tasks.as_mut().ok_or(UpdateError::ShutDown)?;
		let id = self.table.next.fetch_add(1, Ordering::Relaxed);
		let abort = runtime.spawn(task(id, Arc::downgrade(&self.table))).abort_handle();
		tasks.insert(id, abort.clone());
		Ok(Timer {
			id,
			abort,
			table: Arc::downgrade(&self.table),
		})
	}

	pub(crate) fn schedule(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> Result<Timer, UpdateError> {
		self.spawn(|id, table| {
			Box::pin(async move {
				time::sleep(delay).await;
				if tokio::task::spawn_blocking(callback).await.is_err() {
					trace!(id, "Scheduled callback did not complete");
				}
				if let Some(table) = table.upgrade() {
					table.remove(id);
				}
			})
		})
	}

	/// Runs `callback` after `delay`, then every `period`. Late ticks are delayed rather than bunched up.
	pub(crate) fn schedule_at_fixed_rate(
		&self,
		delay: Duration,
		period: Duration,
		callback: impl Fn() + Send + Sync + 'static,
	) -> Result<Timer, UpdateError> {
		if period.is_zero() {
			return Err(UpdateError::ZeroPeriod);
		}
		let callback = Arc::new(callback);
		self.spawn(|id, _| {
			Box::pin(async move {
				let mut interval = time::interval_at(Instant::now() + delay, period);
				interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
				loop {
					interval.tick().await;
					let callback = Arc::clone(&callback);
					if tokio::task::spawn_blocking(move || callback()).await.is_err() {
						trace!(id, "Recurring callback did not complete");
					}
				}
			})
		})
	}

	/// Cancels all timers and refuses new ones.
	pub(crate) fn cancel_all(&self) -> usize {
		let tasks = self.table.tasks.lock().take().unwrap_or_default();
		for abort in tasks.values() {
			abort.abort();
		}
		tasks.len()
	}
}

/// A scheduled callback. Dropping it does not cancel it.
#[derive(Debug, Clone)]
pub struct Timer {
	id: u64,
	abort: AbortHandle,
	table: Weak<Table>,
}

impl Timer {
	/// Prevents any further runs. A run that already started completes.
	pub fn cancel(&self) {
		self.abort.abort();
		if let Some(table) = self.table.upgrade() {
			table.remove(self.id);
		}
	}

	#[must_use]
	pub fn is_finished(&self) -> bool {
		self.abort.is_finished()
	}
}
