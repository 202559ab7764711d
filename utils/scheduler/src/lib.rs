//! Timer service (spec §4.2).
//!
//! Grounded on `original_source/component/oai-mme/src/common/itti/timer.c`:
//! a timer is created with a duration, a type (one-shot/periodic), an owning
//! destination, and an opaque argument; expiry is delivered as an ordinary
//! message to the owner, carrying the argument back verbatim. The service
//! never dereferences the argument.
//!
//! This crate does not know about the bus's `Message` envelope (that would
//! make `scheduler` depend on `itti`, inverting the natural layering in
//! spec §2 where the timer service sits below the bus). Instead expiry is
//! delivered through any `ExpirySink`; `mme/itti` supplies one that wraps
//! expiry into a `TIMER_HAS_EXPIRED` message on the owning task's queue.

use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Opaque timer handle. Never reused while the timer it names is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
	OneShot,
	Periodic,
}

/// Receives timer expirations. Implemented by the message bus so that an
/// expiry becomes an ordinary `TIMER_HAS_EXPIRED` message; `Arg` is the
/// opaque argument supplied at creation time and is never interpreted here.
pub trait ExpirySink<Arg>: Clone + Send + 'static
where
	Arg: Clone + Send + 'static,
{
	fn deliver(
		&self,
		handle: TimerHandle,
		arg: Arg,
	);
}

struct TimerEntry {
	cancel: CancellationToken,
	_join: JoinHandle<()>,
}

/// A process-wide set of scheduled callbacks keyed by opaque handle.
pub struct TimerService<S> {
	next_id: AtomicU64,
	entries: SccHashMap<TimerHandle, TimerEntry, FxBuildHasher>,
	sink: S,
}

impl<S> TimerService<S> {
	pub fn new(sink: S) -> Self {
		Self {
			next_id: AtomicU64::new(1),
			entries: SccHashMap::with_hasher(FxBuildHasher::default()),
			sink,
		}
	}
}

impl<S> TimerService<S> {
	/// Creates a timer. `duration` is whole seconds + microseconds, matching
	/// the original's `(sec, usec)` pair. Returns a handle valid until the
	/// timer fires (one-shot) or is removed.
	pub async fn create<Arg>(
		&self,
		duration: (u64, u32),
		kind: TimerKind,
		arg: Arg,
	) -> TimerHandle
	where
		Arg: Clone + Send + 'static,
		S: ExpirySink<Arg>,
	{
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let handle = TimerHandle(id);
		let cancel = CancellationToken::new();
		let period = Duration::new(duration.0, duration.1 * 1000);
		let task_cancel = cancel.clone();
		let sink = self.sink.clone();

		let join = tokio::spawn(async move {
			match kind {
				TimerKind::OneShot => {
					tokio::select! {
						_ = tokio::time::sleep(period) => {
							sink.deliver(handle, arg);
						}
						_ = task_cancel.cancelled() => {}
					}
				}
				TimerKind::Periodic => {
					let mut ticker = tokio::time::interval(period);
					ticker.tick().await; // first tick fires immediately; discard
					loop {
						tokio::select! {
							_ = ticker.tick() => {
								sink.deliver(handle, arg.clone());
							}
							_ = task_cancel.cancelled() => break,
						}
					}
				}
			}
		});

		let _ = self
			.entries
			.insert_async(handle, TimerEntry { cancel, _join: join })
			.await;
		handle
	}

	/// Removes a timer. Removing a never-fired one-shot timer guarantees its
	/// expiry message will never be delivered. Removing an already-fired
	/// one-shot timer (or an unknown handle) is a no-op, returning `false`
	/// ("not found") rather than an error — the original treats this as
	/// routine, not exceptional.
	pub async fn remove(
		&self,
		handle: TimerHandle,
	) -> bool {
		if let Some((_, entry)) = self.entries.remove_async(&handle).await {
			entry.cancel.cancel();
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	use super::*;

	#[derive(Clone)]
	struct CountingSink(Arc<AtomicUsize>);

	impl ExpirySink<u32> for CountingSink {
		fn deliver(
			&self,
			_handle: TimerHandle,
			_arg: u32,
		) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn one_shot_fires_once() {
		let counter = Arc::new(AtomicUsize::new(0));
		let service = TimerService::new(CountingSink(counter.clone()));
		let _handle = service.create((1, 0), TimerKind::OneShot, 42u32).await;
		tokio::time::advance(Duration::from_secs(2)).await;
		tokio::task::yield_now().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn removing_before_fire_suppresses_expiry() {
		let counter = Arc::new(AtomicUsize::new(0));
		let service = TimerService::new(CountingSink(counter.clone()));
		let handle = service.create((5, 0), TimerKind::OneShot, 1u32).await;
		assert!(service.remove(handle).await);
		tokio::time::advance(Duration::from_secs(10)).await;
		tokio::task::yield_now().await;
		assert_eq!(counter.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn removing_after_fire_is_a_noop() {
		let counter = Arc::new(AtomicUsize::new(0));
		let service = TimerService::new(CountingSink(counter.clone()));
		let handle = service.create((1, 0), TimerKind::OneShot, 1u32).await;
		tokio::time::advance(Duration::from_secs(2)).await;
		tokio::task::yield_now().await;
		assert!(!service.remove(handle).await);
	}
}
