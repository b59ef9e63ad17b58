//! Cooperative task contexts.
//!
//! Every I/O-facing operation of the server runs on a task context
//! multiplexed onto the runtime. Suspension is explicit: only the
//! primitives in this module and the store's async read/commit paths give
//! up the thread; pure computation always runs to completion. A
//! notification delivered while a task is not waiting is retained and
//! satisfies the next `wait`. Interruption is observed at suspension
//! points and surfaces as `Error::Interrupted`.

use std::{
	future::Future,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use tokio::{
	sync::Notify,
	task::JoinHandle,
	time::{Instant, timeout},
};

use crate::{Result, err};

/// Identity and wakeup state of one cooperative task.
pub struct Ctx {
	id: u64,
	name: Arc<str>,
	notes: Notify,
	interrupt: AtomicBool,
	interrupt_note: Notify,
}

static CTX_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
	static CURRENT: Arc<Ctx>;
}

impl Ctx {
	fn new(name: &str) -> Arc<Self> {
		Arc::new(Self {
			id: CTX_ID.fetch_add(1, Ordering::Relaxed),
			name: name.into(),
			notes: Notify::new(),
			interrupt: AtomicBool::new(false),
			interrupt_note: Notify::new(),
		})
	}

	#[inline]
	#[must_use]
	pub fn id(&self) -> u64 { self.id }

	#[inline]
	#[must_use]
	pub fn name(&self) -> &str { &self.name }

	/// Post a notification. If the task is in `wait` it returns; otherwise
	/// the note is retained for the next `wait`.
	#[inline]
	pub fn notify(&self) { self.notes.notify_one(); }

	/// Ask the task to stop. Observed at its next suspension point or
	/// explicit `interruption_point` check.
	pub fn interrupt(&self) {
		self.interrupt.store(true, Ordering::Release);
		// notify_one retains a permit so a task which has not reached its
		// suspension point yet still observes the wakeup.
		self.interrupt_note.notify_one();
	}

	#[inline]
	#[must_use]
	pub fn interruption_requested(&self) -> bool { self.interrupt.load(Ordering::Acquire) }
}

/// Spawn a named task context onto the runtime.
pub fn spawn<F>(name: &str, future: F) -> (Arc<Ctx>, JoinHandle<F::Output>)
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let ctx = Ctx::new(name);
	let handle = tokio::spawn(CURRENT.scope(ctx.clone(), future));
	(ctx, handle)
}

/// The currently running task context, if any. Absence means the root
/// thread is executing.
#[must_use]
pub fn try_current() -> Option<Arc<Ctx>> { CURRENT.try_with(Arc::clone).ok() }

/// Label of the current task for logging; the root thread reports a
/// synthetic placeholder.
#[must_use]
pub fn name() -> Arc<str> {
	try_current().map_or_else(|| "main".into(), |ctx| ctx.name.clone())
}

#[must_use]
pub fn interruption_requested() -> bool {
	try_current().is_some_and(|ctx| ctx.interruption_requested())
}

/// Check for a pending interruption without suspending.
#[inline]
pub fn interruption_point() -> Result {
	if interruption_requested() {
		return Err(err!(Interrupted("task interrupted")));
	}

	Ok(())
}

/// Suspend until notified. Returns immediately when a note is pending.
/// Interruption unwinds with `Error::Interrupted`.
pub async fn wait() -> Result {
	interruption_point()?;
	let ctx = try_current().ok_or_else(|| err!("wait() requires a task context"))?;

	tokio::select! {
		() = ctx.notes.notified() => interruption_point(),
		() = ctx.interrupt_note.notified() => interruption_point(),
	}
}

/// Suspend until notified or until `dur` elapses. Returns the remaining
/// duration when notified, or None when the deadline elapsed.
pub async fn wait_for(dur: Duration) -> Result<Option<Duration>> {
	let start = Instant::now();
	match timeout(dur, wait()).await {
		| Ok(result) => result.map(|()| Some(dur.saturating_sub(start.elapsed()))),
		| Err(_) => {
			interruption_point()?;
			Ok(None)
		},
	}
}

/// `wait_for` variant which fails with `Error::Timeout` when the deadline
/// elapses without a notification.
pub async fn wait_for_or_timeout(dur: Duration) -> Result<Duration> {
	wait_for(dur)
		.await?
		.ok_or_else(|| err!(Timeout("deadline elapsed without notification")))
}

/// Suspend for a duration, ignoring notifications; only the deadline or an
/// interruption returns control.
pub async fn sleep(dur: Duration) -> Result { sleep_until(Instant::now() + dur).await }

pub async fn sleep_until(deadline: Instant) -> Result {
	interruption_point()?;
	let Some(ctx) = try_current() else {
		tokio::time::sleep_until(deadline).await;
		return Ok(());
	};

	tokio::select! {
		() = tokio::time::sleep_until(deadline) => Ok(()),
		() = ctx.interrupt_note.notified() => interruption_point(),
	}
}

/// Allow other tasks to run before returning. An interruption point.
pub async fn yield_now() -> Result {
	interruption_point()?;
	tokio::task::yield_now().await;
	interruption_point()
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn pending_note_satisfies_next_wait() {
		let (ctx, handle) = spawn("noted", async {
			wait().await.expect("note pending; wait returns");
		});

		// Note posted before the task first waits must not be lost.
		ctx.notify();
		handle.await.expect("task completes");
	}

	#[tokio::test]
	async fn wait_for_reports_remaining_time() {
		let (ctx, handle) = spawn("timed", async {
			wait_for(Duration::from_secs(5))
				.await
				.expect("not interrupted")
		});

		ctx.notify();
		let remaining = handle.await.expect("task completes");
		assert!(remaining.is_some(), "notified wait reports time to spare");
	}

	#[tokio::test]
	async fn wait_for_elapses() {
		let (_ctx, handle) = spawn("deadline", async {
			wait_for(Duration::from_millis(10))
				.await
				.expect("not interrupted")
		});

		let remaining = handle.await.expect("task completes");
		assert!(remaining.is_none(), "deadline elapsed without a note");
	}

	#[tokio::test]
	async fn interruption_observed_at_wait() {
		let (ctx, handle) = spawn("doomed", async { wait().await });

		ctx.interrupt();
		let result = handle.await.expect("task completes");
		assert!(result.is_err(), "interrupted wait fails");
	}

	#[tokio::test]
	async fn sleep_ignores_notes() {
		let (ctx, handle) = spawn("sleeper", async {
			let before = tokio::time::Instant::now();
			sleep(Duration::from_millis(25)).await.expect("uninterrupted");
			before.elapsed()
		});

		ctx.notify();
		let slept = handle.await.expect("task completes");
		assert!(slept >= Duration::from_millis(25), "note must not shorten sleep");
	}

	#[test]
	fn root_thread_has_no_context() {
		assert!(try_current().is_none());
		assert_eq!(&*name(), "main");
	}
}
