//! The inter-task message bus (spec §4.1), "ITTI" in the original.
//!
//! Grounded on `original_source/component/oai-mme/src/common/messages_def.h`
//! (the per-subsystem message catalogs) and on the teacher's
//! `ContextQueue`/single-writer-task shape (`omnipath/ngap/src/context_queue.rs`):
//! each task is a single logical consumer draining its own queue in FIFO
//! order within a priority class.
//!
//! The original's `itti_free_msg_content` — a hand-written destructor that
//! switches on message id to free exactly the heap fields each payload
//! variant owns — has no counterpart here: a Rust enum payload owns its
//! `String`/`Vec<u8>`/`Box<_>` fields directly, and they are freed by the
//! ordinary `Drop` glue the compiler generates when a `Message<M>` is
//! dropped. No manual content-free step exists to forget.
//!
//! This module is deliberately generic over the payload type `M`: the
//! concrete catalog of application messages (`mme_app`/`emm`/`esm`/...)
//! belongs to `mme-engine`, which instantiates `Bus<Message>`.

use std::collections::HashMap;

use scheduler::{ExpirySink, TimerHandle};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// The fixed set of tasks that own a queue on the bus. One thread (in
/// practice one Tokio task) drains each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
	Timer,
	Emm,
	Esm,
	MmeApp,
	S1ap,
	Gtp,
	S6a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
	High,
	Normal,
}

/// Envelope carried on the bus. `instance` distinguishes multiple logical
/// instances of the same destination task (unused by a single-MME process
/// today, carried for parity with the original's per-instance addressing).
#[derive(Debug)]
pub struct Message<M> {
	pub source: TaskId,
	pub destination: TaskId,
	pub instance: u32,
	pub priority: Priority,
	pub body: Body<M>,
}

#[derive(Debug)]
pub enum Body<M> {
	Data(M),
	/// Cooperative shutdown signal. A task that receives this drains no
	/// further messages and tears itself down.
	Terminate,
}

#[derive(Debug, Error)]
pub enum SendError {
	#[error("destination task {0:?} has no registered queue")]
	UnknownDestination(TaskId),
	#[error("destination task {0:?} has exited")]
	DestinationExited(TaskId),
}

struct TaskHandle<M> {
	high: mpsc::UnboundedSender<Message<M>>,
	normal: mpsc::UnboundedSender<Message<M>>,
}

/// Producer-side handle. Cheap to clone; every subsystem that needs to send
/// holds one.
pub struct Bus<M> {
	handles: HashMap<TaskId, TaskHandle<M>>,
}

impl<M> Clone for Bus<M> {
	fn clone(&self) -> Self {
		Self {
			handles: self
				.handles
				.iter()
				.map(|(k, v)| {
					(*k, TaskHandle {
						high: v.high.clone(),
						normal: v.normal.clone(),
					})
				})
				.collect(),
		}
	}
}

/// Consumer-side handle. Owned exclusively by the task that drains it.
pub struct TaskReceiver<M> {
	pub id: TaskId,
	high: mpsc::UnboundedReceiver<Message<M>>,
	normal: mpsc::UnboundedReceiver<Message<M>>,
}

impl<M> Bus<M> {
	/// Builds a bus with one queue per task in `tasks`, returning the shared
	/// producer handle plus one exclusive receiver per task.
	pub fn new(tasks: &[TaskId]) -> (Self, Vec<TaskReceiver<M>>) {
		let mut handles = HashMap::with_capacity(tasks.len());
		let mut receivers = Vec::with_capacity(tasks.len());
		for &id in tasks {
			let (high_tx, high_rx) = mpsc::unbounded_channel();
			let (normal_tx, normal_rx) = mpsc::unbounded_channel();
			handles.insert(id, TaskHandle { high: high_tx, normal: normal_tx });
			receivers.push(TaskReceiver { id, high: high_rx, normal: normal_rx });
		}
		(Self { handles }, receivers)
	}

	/// Enqueues `body` for `destination`. Returns once enqueued; delivery is
	/// guaranteed unless the destination has exited (its receiver dropped).
	/// There is no broadcast primitive — every send names exactly one
	/// destination, matching the original's explicit-reply-only contract.
	pub fn send(
		&self,
		source: TaskId,
		destination: TaskId,
		instance: u32,
		priority: Priority,
		body: M,
	) -> Result<(), SendError> {
		let handle = self
			.handles
			.get(&destination)
			.ok_or(SendError::UnknownDestination(destination))?;
		let message = Message { source, destination, instance, priority, body: Body::Data(body) };
		let sender = match priority {
			Priority::High => &handle.high,
			Priority::Normal => &handle.normal,
		};
		let result = sender
			.send(message)
			.map_err(|_| SendError::DestinationExited(destination));
		if let Err(ref err) = result {
			warn!(?source, ?destination, %err, "dropped message, destination exited");
		} else {
			trace!(?source, ?destination, ?priority, "enqueued message");
		}
		result
	}

	/// Delivers a `TERMINATE_MESSAGE` to `destination` on the high-priority
	/// lane so it is handled ahead of any backlog.
	pub fn terminate(
		&self,
		source: TaskId,
		destination: TaskId,
	) -> Result<(), SendError> {
		let handle = self
			.handles
			.get(&destination)
			.ok_or(SendError::UnknownDestination(destination))?;
		let message: Message<M> =
			Message { source, destination, instance: 0, priority: Priority::High, body: Body::Terminate };
		handle
			.high
			.send(message)
			.map_err(|_| SendError::DestinationExited(destination))
	}
}

impl<M> TaskReceiver<M> {
	/// Receives the next message in FIFO order within a priority class; the
	/// high-priority lane is always drained ahead of the normal lane
	/// (`tokio::select!`'s `biased` mode), matching "FIFO within a priority
	/// class" from spec §4.1. Returns `None` once both lanes are closed.
	pub async fn recv(&mut self) -> Option<Message<M>> {
		loop {
			tokio::select! {
				biased;
				msg = self.high.recv() => {
					if msg.is_some() {
						return msg;
					}
				}
				msg = self.normal.recv() => {
					return msg;
				}
			}
			if self.high.is_closed() && self.normal.is_closed() {
				return None;
			}
		}
	}
}

/// A fired timer's payload, delivered to whichever task created it. `arg` is
/// returned verbatim, exactly as the timer service received it.
#[derive(Debug, Clone)]
pub struct TimerExpiry<Arg> {
	pub handle: TimerHandle,
	pub arg: Arg,
}

/// Bridges `scheduler::TimerService` into the bus: an expiry becomes a
/// `TIMER_HAS_EXPIRED`-equivalent message enqueued for the task that created
/// the timer. One `BusTimerSink` is constructed per owning task.
pub struct BusTimerSink<M> {
	bus: Bus<M>,
	owner: TaskId,
}

impl<M> BusTimerSink<M> {
	pub fn new(
		bus: Bus<M>,
		owner: TaskId,
	) -> Self {
		Self { bus, owner }
	}
}

impl<M> Clone for BusTimerSink<M> {
	fn clone(&self) -> Self {
		Self { bus: self.bus.clone(), owner: self.owner }
	}
}

impl<M, Arg> ExpirySink<Arg> for BusTimerSink<M>
where
	M: From<TimerExpiry<Arg>> + Send + 'static,
	Arg: Clone + Send + 'static,
{
	fn deliver(
		&self,
		handle: TimerHandle,
		arg: Arg,
	) {
		let body = M::from(TimerExpiry { handle, arg });
		if self
			.bus
			.send(TaskId::Timer, self.owner, 0, Priority::High, body)
			.is_err()
		{
			warn!(owner = ?self.owner, "timer expiry dropped, owner task exited");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn fifo_within_priority_class() {
		let (bus, mut receivers) = Bus::<u32>::new(&[TaskId::Emm, TaskId::Esm]);
		let mut rx = receivers.remove(0);
		bus.send(TaskId::Esm, TaskId::Emm, 0, Priority::Normal, 1).unwrap();
		bus.send(TaskId::Esm, TaskId::Emm, 0, Priority::Normal, 2).unwrap();
		let first = rx.recv().await.unwrap();
		let second = rx.recv().await.unwrap();
		assert!(matches!(first.body, Body::Data(1)));
		assert!(matches!(second.body, Body::Data(2)));
	}

	#[tokio::test]
	async fn high_priority_drains_first() {
		let (bus, mut receivers) = Bus::<u32>::new(&[TaskId::Emm]);
		let mut rx = receivers.remove(0);
		bus.send(TaskId::MmeApp, TaskId::Emm, 0, Priority::Normal, 10).unwrap();
		bus.send(TaskId::MmeApp, TaskId::Emm, 0, Priority::High, 20).unwrap();
		let first = rx.recv().await.unwrap();
		assert!(matches!(first.body, Body::Data(20)));
	}

	#[tokio::test]
	async fn terminate_is_delivered() {
		let (bus, mut receivers) = Bus::<u32>::new(&[TaskId::Emm]);
		let mut rx = receivers.remove(0);
		bus.terminate(TaskId::MmeApp, TaskId::Emm).unwrap();
		let message = rx.recv().await.unwrap();
		assert!(matches!(message.body, Body::Terminate));
	}

	#[tokio::test]
	async fn send_to_unknown_task_errors() {
		let (bus, _receivers) = Bus::<u32>::new(&[TaskId::Emm]);
		let err = bus.send(TaskId::Emm, TaskId::S6a, 0, Priority::Normal, 1).unwrap_err();
		assert!(matches!(err, SendError::UnknownDestination(TaskId::S6a)));
	}

	#[derive(Debug)]
	enum TestMessage {
		Expiry(TimerExpiry<u32>),
	}

	impl From<TimerExpiry<u32>> for TestMessage {
		fn from(expiry: TimerExpiry<u32>) -> Self {
			TestMessage::Expiry(expiry)
		}
	}

	#[tokio::test(start_paused = true)]
	async fn timer_sink_delivers_expiry_to_owner() {
		use scheduler::{TimerKind, TimerService};

		let (bus, mut receivers) = Bus::<TestMessage>::new(&[TaskId::Emm]);
		let mut rx = receivers.remove(0);
		let sink = BusTimerSink::new(bus, TaskId::Emm);
		let service = TimerService::new(sink);
		let _handle = service.create((1, 0), TimerKind::OneShot, 99u32).await;
		tokio::time::advance(std::time::Duration::from_secs(2)).await;
		let message = rx.recv().await.unwrap();
		match message.body {
			Body::Data(TestMessage::Expiry(expiry)) => {
				assert_eq!(expiry.arg, 99);
			}
			_ => panic!("expected expiry message"),
		}
	}
}
