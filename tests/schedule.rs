use core::time::Duration;
use futures::FutureExt;
use live_dom::UpdateError;
use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};
use tokio::{
	sync::mpsc,
	time::{sleep, timeout},
};

mod pages_;
use pages_::{click, counter, render, start, text_at, Handles};

const PATIENCE: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_callbacks_can_update() {
	let handles = Handles::default();
	let (page, _) = start(render(0, counter(&handles)));
	click(&page, &[2, 1]);

	let (done, mut finished) = mpsc::unbounded_channel();
	let update = handles.update();
	handles
		.event()
		.schedule(Duration::from_millis(10), move || {
			update.apply(|n| n + 10).unwrap();
			done.send(()).unwrap();
		})
		.unwrap();

	timeout(PATIENCE, finished.recv()).await.unwrap();
	assert_eq!(text_at(&page, &[2, 1, 1]).as_deref(), Some("11"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_timers_do_not_run() {
	let handles = Handles::default();
	let (page, _) = start(render(0, counter(&handles)));
	click(&page, &[2, 1]);

	let runs = Arc::new(AtomicUsize::new(0));
	let timer = {
		let runs = Arc::clone(&runs);
		handles
			.event()
			.schedule(Duration::from_millis(50), move || {
				runs.fetch_add(1, Ordering::SeqCst);
			})
			.unwrap()
	};
	timer.cancel();

	sleep(Duration::from_millis(150)).await;
	assert_eq!(runs.load(Ordering::SeqCst), 0);
	assert!(timer.is_finished());
	assert_eq!(text_at(&page, &[2, 1, 1]).as_deref(), Some("1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_recurring_timers() {
	let handles = Handles::default();
	let (page, _) = start(render(0, counter(&handles)));
	click(&page, &[2, 1]);
	let event = handles.event();

	let ticks = Arc::new(AtomicUsize::new(0));
	let (tick, mut ticked) = mpsc::unbounded_channel();
	{
		let ticks = Arc::clone(&ticks);
		event
			.schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(10), move || {
				ticks.fetch_add(1, Ordering::SeqCst);
				let _ = tick.send(());
			})
			.unwrap();
	}
	for _ in 0..3 {
		timeout(PATIENCE, ticked.recv()).await.unwrap();
	}

	page.shutdown();
	let at_shutdown = ticks.load(Ordering::SeqCst);
	sleep(Duration::from_millis(100)).await;
	// A tick that was already running may still finish.
	assert!(ticks.load(Ordering::SeqCst) <= at_shutdown + 1);
	assert!(matches!(event.schedule(Duration::ZERO, || ()), Err(UpdateError::ShutDown)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deferred_state_is_committed_when_ready() {
	let handles = Handles::default();
	let (page, recorder) = start(render(0, counter(&handles)));
	let update = handles.update();

	let (resolve, resolved) = tokio::sync::oneshot::channel::<u32>();
	update.set_when_complete(resolved.map(|state| state.unwrap_or_default())).unwrap();
	assert_eq!(text_at(&page, &[2, 1, 1]).as_deref(), Some("0"));
	resolve.send(41).unwrap();

	timeout(PATIENCE, async {
		while update.state().as_deref() != Some(&41) {
			sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();
	assert_eq!(text_at(&page, &[2, 1, 1]).as_deref(), Some("41"));
	assert_eq!(recorder.take().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recurring_timers_need_a_period() {
	let handles = Handles::default();
	let (page, _) = start(render(0, counter(&handles)));
	click(&page, &[2, 1]);

	assert!(matches!(
		handles.event().schedule_at_fixed_rate(Duration::ZERO, Duration::ZERO, || ()),
		Err(UpdateError::ZeroPeriod)
	));
	let timer = handles.event().schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(10), || ()).unwrap();
	timer.cancel();
}

#[test]
fn timers_need_a_runtime() {
	let handles = Handles::default();
	let (page, _) = start(render(0, counter(&handles)));
	click(&page, &[2, 1]);

	assert!(matches!(handles.event().schedule(Duration::ZERO, || ()), Err(UpdateError::NoRuntime)));
	assert!(matches!(
		handles.update().set_when_complete(async { 5 }),
		Err(UpdateError::NoRuntime)
	));
}
