//! The GTPv2-C transaction layer (spec §4.3): owns local TEIDs, correlates
//! request/response by sequence number, retransmits, and surfaces timeouts
//! as "peer-not-responding" failures to the ULP callback.
//!
//! Grounded on `original_source/component/oai-mme/src/s11/s11_mme_task.c`'s
//! per-request timer wrapper/retry handling and the teacher's
//! `ContextQueue`/`ContextManager`
//! serialization primitive (`gtp::context_manager`): each tunnel endpoint is
//! one context, mutated only through its own queue, so two tunnels never
//! contend and operations on the same tunnel are always ordered.

use std::{
	collections::{HashMap, VecDeque},
	net::SocketAddr,
	sync::Arc,
	time::Duration,
};

use counter::CounterU32;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
	context_manager::{ContextManager, Identifiable},
	message::{GtpMessage, GtpMessageBody},
	transport::GtpTransport,
};

/// How a retransmission timeout grows between attempts (spec §4.3:
/// "retransmitted ... N3 times" with "exponential or linear backoff").
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
	Linear,
	Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct RetransmissionPolicy {
	pub initial_timeout: Duration,
	pub backoff: Backoff,
	/// N3: number of retransmissions attempted after the original send
	/// before the request is considered failed.
	pub max_retries: u32,
}

impl Default for RetransmissionPolicy {
	fn default() -> Self {
		Self { initial_timeout: Duration::from_secs(3), backoff: Backoff::Exponential, max_retries: 3 }
	}
}

impl RetransmissionPolicy {
	fn timeout_for_attempt(
		&self,
		attempt: u32,
	) -> Duration {
		match self.backoff {
			Backoff::Linear => self.initial_timeout * (attempt + 1),
			Backoff::Exponential => self.initial_timeout * 2u32.saturating_pow(attempt),
		}
	}
}

/// Every ULP-visible event the transaction layer can raise (spec §4.3).
pub trait UlpCallback: Send + Sync + 'static {
	/// `TRIGGERED_RSP_IND`: a response arrived correlated to a request this
	/// layer sent earlier.
	fn triggered_response(
		&self,
		local_teid: u32,
		response: GtpMessage,
	);

	/// `INITIAL_REQ_IND`: an incoming request on a not-yet-known tunnel.
	/// Returns the local TEID the layer allocated for the new tunnel.
	fn initial_request(
		&self,
		peer: SocketAddr,
		request: GtpMessage,
		local_teid: u32,
	);

	/// `TRIGGERED_REQ_IND`: an incoming request on an already-known tunnel.
	fn triggered_request(
		&self,
		local_teid: u32,
		request: GtpMessage,
	);

	/// `RSP_FAILURE_IND`: a previously sent request exhausted its
	/// retransmission budget without a response.
	fn response_failure(
		&self,
		local_teid: u32,
		sequence_number: u32,
	);
}

/// Lets `TransactionLayer<_, U>` be instantiated with `U = Arc<dyn
/// UlpCallback>`, so the owning engine can hand the layer a type-erased
/// callback rather than threading a concrete ULP type through it.
impl UlpCallback for Arc<dyn UlpCallback> {
	fn triggered_response(
		&self,
		local_teid: u32,
		response: GtpMessage,
	) {
		(**self).triggered_response(local_teid, response);
	}

	fn initial_request(
		&self,
		peer: SocketAddr,
		request: GtpMessage,
		local_teid: u32,
	) {
		(**self).initial_request(peer, request, local_teid);
	}

	fn triggered_request(
		&self,
		local_teid: u32,
		request: GtpMessage,
	) {
		(**self).triggered_request(local_teid, request);
	}

	fn response_failure(
		&self,
		local_teid: u32,
		sequence_number: u32,
	) {
		(**self).response_failure(local_teid, sequence_number);
	}
}

struct PendingRequest {
	cancel: CancellationToken,
}

/// A durable tunnel endpoint, entered into the process-wide map keyed by
/// local TEID (spec §4.3: "Each local TEID created by the MME identifies a
/// durable tunnel endpoint").
struct TunnelState {
	local_teid: u32,
	peer_addr: SocketAddr,
	pending: HashMap<u32, PendingRequest>,
	/// Small ring of recently answered incoming sequence numbers, paired
	/// with the response sent, so a re-received request returns the cached
	/// response rather than re-running the handler (spec §4.3, §8 "Create
	/// Session Request followed by an immediate duplicate").
	recent_responses: VecDeque<(u32, GtpMessage)>,
}

const RECENT_RESPONSES_CAPACITY: usize = 8;

impl Identifiable for TunnelState {
	type Key = u32;

	fn key(&self) -> u32 {
		self.local_teid
	}
}

impl TunnelState {
	fn cache_response(
		&mut self,
		sequence_number: u32,
		response: GtpMessage,
	) {
		if self.recent_responses.len() == RECENT_RESPONSES_CAPACITY {
			self.recent_responses.pop_front();
		}
		self.recent_responses.push_back((sequence_number, response));
	}

	fn cached_response(
		&self,
		sequence_number: u32,
	) -> Option<&GtpMessage> {
		self.recent_responses.iter().find(|(seq, _)| *seq == sequence_number).map(|(_, msg)| msg)
	}
}

pub struct TransactionLayer<T, U> {
	transport: Arc<T>,
	ulp: Arc<U>,
	tunnels: Arc<ContextManager<TunnelState>>,
	teid_counter: CounterU32,
	seq_counter: CounterU32,
	policy: RetransmissionPolicy,
}

impl<T, U> TransactionLayer<T, U>
where
	T: GtpTransport,
	U: UlpCallback,
{
	pub fn new(
		transport: Arc<T>,
		ulp: Arc<U>,
		policy: RetransmissionPolicy,
	) -> Self {
		Self {
			transport,
			ulp,
			tunnels: Arc::new(ContextManager::new()),
			teid_counter: CounterU32::new(),
			seq_counter: CounterU32::new(),
			policy,
		}
	}

	/// `send_initial_request`: allocates a fresh local TEID, sends the
	/// request with that TEID's tunnel bound to `peer`, and begins
	/// retransmitting it per `policy` until a response arrives or the
	/// retry budget is exhausted (raising `RSP_FAILURE_IND`).
	pub async fn send_initial_request(
		&self,
		peer: SocketAddr,
		body: GtpMessageBody,
	) -> u32 {
		let local_teid = self.teid_counter.increment();
		let tunnel = TunnelState {
			local_teid,
			peer_addr: peer,
			pending: HashMap::new(),
			recent_responses: VecDeque::new(),
		};
		let queue = self.tunnels.insert(tunnel).await;
		let sequence_number = self.seq_counter.increment();
		let message = GtpMessage { teid: 0, sequence_number, body };
		self.start_request(local_teid, peer, message).await;
		local_teid
	}

	/// `send_triggered_response`: replies to `in_reply_to` on the tunnel
	/// identified by `local_teid`, caching the response so a duplicate of
	/// the same incoming request short-circuits to a resend.
	pub async fn send_triggered_response(
		&self,
		local_teid: u32,
		in_reply_to: &GtpMessage,
		body: GtpMessageBody,
	) {
		let Some(queue) = self.tunnels.get(&local_teid).await else {
			warn!(local_teid, "send_triggered_response on unknown tunnel");
			return;
		};
		let sequence_number = in_reply_to.sequence_number;
		let message = GtpMessage { teid: local_teid, sequence_number, body };
		let peer = queue
			.clone()
			.schedule_and_wait({
				let message = message.clone();
				move |ctx: &mut TunnelState| {
					ctx.cache_response(sequence_number, message);
					Box::pin(async move { ctx.peer_addr })
				}
			})
			.await;
		if let Err(err) = self.transport.send_to(peer, &message).await {
			warn!(local_teid, %err, "failed to send triggered response");
		}
	}

	/// Sends a request on an already-established tunnel (e.g. a network
	/// element re-using its own TEID space for a follow-on request) and
	/// begins retransmitting it the same way `send_initial_request` does.
	pub async fn send_triggered_request(
		&self,
		local_teid: u32,
		body: GtpMessageBody,
	) -> Option<u32> {
		let peer = self.tunnels.get(&local_teid).await?.clone().schedule_and_wait(|ctx: &mut TunnelState| {
			let peer = ctx.peer_addr;
			Box::pin(async move { peer })
		}).await;
		let sequence_number = self.seq_counter.increment();
		let message = GtpMessage { teid: local_teid, sequence_number, body };
		self.start_request(local_teid, peer, message).await;
		Some(sequence_number)
	}

	async fn start_request(
		&self,
		local_teid: u32,
		peer: SocketAddr,
		message: GtpMessage,
	) {
		let Some(queue) = self.tunnels.get(&local_teid).await else {
			return;
		};
		let cancel = CancellationToken::new();
		let sequence_number = message.sequence_number;
		queue
			.clone()
			.schedule_and_wait({
				let cancel = cancel.clone();
				move |ctx: &mut TunnelState| {
					ctx.pending.insert(sequence_number, PendingRequest { cancel });
					Box::pin(async move {})
				}
			})
			.await;

		if let Err(err) = self.transport.send_to(peer, &message).await {
			warn!(local_teid, %err, "failed to send initial/triggered request");
		}

		let transport = self.transport.clone();
		let ulp = self.ulp.clone();
		let tunnels = self.tunnels.clone();
		let policy = self.policy;
		let sequence_number = message.sequence_number;
		tokio::spawn(async move {
			for attempt in 0..policy.max_retries {
				let timeout = policy.timeout_for_attempt(attempt);
				tokio::select! {
					_ = tokio::time::sleep(timeout) => {
						debug!(local_teid, sequence_number, attempt, "retransmitting GTPv2-C request");
						if let Err(err) = transport.send_to(peer, &message).await {
							warn!(local_teid, %err, "retransmission send failed");
						}
					}
					_ = cancel.cancelled() => return,
				}
			}
			// Final wait after the last retransmission before giving up.
			tokio::select! {
				_ = tokio::time::sleep(policy.timeout_for_attempt(policy.max_retries)) => {}
				_ = cancel.cancelled() => return,
			}
			if let Some(queue) = tunnels.get(&local_teid).await {
				let still_pending = queue
					.clone()
					.schedule_and_wait(move |ctx: &mut TunnelState| {
						let removed = ctx.pending.remove(&sequence_number).is_some();
						Box::pin(async move { removed })
					})
					.await;
				if still_pending {
					ulp.response_failure(local_teid, sequence_number);
				}
			}
		});
	}

	/// Registers a brand-new tunnel for an incoming initial request (one
	/// that carried TEID 0, i.e. the peer has no prior tunnel to address).
	pub async fn accept_new_tunnel(
		&self,
		peer: SocketAddr,
	) -> u32 {
		let local_teid = self.teid_counter.increment();
		self.tunnels
			.insert(TunnelState {
				local_teid,
				peer_addr: peer,
				pending: HashMap::new(),
				recent_responses: VecDeque::new(),
			})
			.await;
		local_teid
	}

	/// Feeds one received datagram through the correlation/duplicate-
	/// detection logic, dispatching to the appropriate `UlpCallback` method.
	/// Call this from the task loop draining `GtpTransport::recv_from`.
	pub async fn handle_incoming(
		&self,
		message: GtpMessage,
		peer: SocketAddr,
	) {
		if message.body.is_request() {
			self.handle_incoming_request(message, peer).await;
		} else {
			self.handle_incoming_response(message).await;
		}
	}

	async fn handle_incoming_request(
		&self,
		message: GtpMessage,
		peer: SocketAddr,
	) {
		// TEID 0 on an incoming request means "no tunnel yet" (spec §5:
		// "TEID 0 for initial create-session-request"); anything else must
		// name an already-known tunnel.
		if message.teid == 0 {
			let local_teid = self.accept_new_tunnel(peer).await;
			self.ulp.initial_request(peer, message, local_teid);
			return;
		}

		let Some(queue) = self.tunnels.get(&message.teid).await else {
			warn!(teid = message.teid, "incoming request on unknown tunnel");
			return;
		};
		let sequence_number = message.sequence_number;
		let cached = queue
			.clone()
			.schedule_and_wait(move |ctx: &mut TunnelState| {
				let cached = ctx.cached_response(sequence_number).cloned();
				Box::pin(async move { cached })
			})
			.await;
		match cached {
			Some(response) => {
				debug!(teid = message.teid, sequence_number, "duplicate request, resending cached response");
				if let Err(err) = self.transport.send_to(peer, &response).await {
					warn!(%err, "failed to resend cached response");
				}
			}
			None => self.ulp.triggered_request(message.teid, message),
		}
	}

	async fn handle_incoming_response(
		&self,
		message: GtpMessage,
	) {
		let Some(queue) = self.tunnels.get(&message.teid).await else {
			warn!(teid = message.teid, "incoming response on unknown tunnel");
			return;
		};
		let sequence_number = message.sequence_number;
		let pending = queue
			.clone()
			.schedule_and_wait(move |ctx: &mut TunnelState| {
				let pending = ctx.pending.remove(&sequence_number);
				Box::pin(async move { pending })
			})
			.await;
		match pending {
			Some(pending) => {
				pending.cancel.cancel();
				self.ulp.triggered_response(message.teid, message);
			}
			// Already-completed transaction: spec §4.3, "re-received
			// responses for an already-completed transaction are silently
			// dropped".
			None => debug!(teid = message.teid, sequence_number, "dropping response for completed/unknown transaction"),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	use async_trait::async_trait;
	use tokio::sync::Mutex;

	use super::*;
	use crate::error::TransportError;

	#[derive(Default)]
	struct RecordingTransport {
		sent: Mutex<Vec<GtpMessage>>,
	}

	#[async_trait]
	impl GtpTransport for RecordingTransport {
		async fn send_to(
			&self,
			_peer: SocketAddr,
			message: &GtpMessage,
		) -> Result<(), TransportError> {
			self.sent.lock().await.push(message.clone());
			Ok(())
		}

		async fn recv_from(&self) -> Result<(GtpMessage, SocketAddr), TransportError> {
			std::future::pending().await
		}

		fn local_addr(&self) -> SocketAddr {
			"127.0.0.1:2123".parse().unwrap()
		}
	}

	#[derive(Default)]
	struct RecordingUlp {
		failures: AtomicUsize,
		responses: AtomicUsize,
	}

	impl UlpCallback for RecordingUlp {
		fn triggered_response(
			&self,
			_local_teid: u32,
			_response: GtpMessage,
		) {
			self.responses.fetch_add(1, Ordering::SeqCst);
		}

		fn initial_request(
			&self,
			_peer: SocketAddr,
			_request: GtpMessage,
			_local_teid: u32,
		) {
		}

		fn triggered_request(
			&self,
			_local_teid: u32,
			_request: GtpMessage,
		) {
		}

		fn response_failure(
			&self,
			_local_teid: u32,
			_sequence_number: u32,
		) {
			self.failures.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn response_cancels_retransmission_and_notifies_ulp() {
		let transport = Arc::new(RecordingTransport::default());
		let ulp = Arc::new(RecordingUlp::default());
		let policy = RetransmissionPolicy {
			initial_timeout: Duration::from_millis(100),
			backoff: Backoff::Linear,
			max_retries: 3,
		};
		let layer = TransactionLayer::new(transport.clone(), ulp.clone(), policy);
		let peer: SocketAddr = "127.0.0.2:2123".parse().unwrap();
		let local_teid = layer
			.send_initial_request(peer, GtpMessageBody::EchoRequest(Default::default()))
			.await;

		let seq = transport.sent.lock().await[0].sequence_number;
		layer
			.handle_incoming(
				GtpMessage { teid: local_teid, sequence_number: seq, body: GtpMessageBody::EchoResponse(Default::default()) },
				peer,
			)
			.await;
		tokio::time::advance(Duration::from_secs(5)).await;
		tokio::task::yield_now().await;

		assert_eq!(ulp.responses.load(Ordering::SeqCst), 1);
		assert_eq!(ulp.failures.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_retries_raise_response_failure() {
		let transport = Arc::new(RecordingTransport::default());
		let ulp = Arc::new(RecordingUlp::default());
		let policy = RetransmissionPolicy {
			initial_timeout: Duration::from_millis(10),
			backoff: Backoff::Linear,
			max_retries: 2,
		};
		let layer = TransactionLayer::new(transport.clone(), ulp.clone(), policy);
		let peer: SocketAddr = "127.0.0.2:2123".parse().unwrap();
		let _local_teid = layer
			.send_initial_request(peer, GtpMessageBody::EchoRequest(Default::default()))
			.await;

		tokio::time::advance(Duration::from_secs(10)).await;
		tokio::task::yield_now().await;
		tokio::time::advance(Duration::from_secs(10)).await;
		tokio::task::yield_now().await;

		assert_eq!(ulp.failures.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn duplicate_incoming_request_resends_cached_response_without_new_ulp_call() {
		let transport = Arc::new(RecordingTransport::default());
		let ulp = Arc::new(RecordingUlp::default());
		let layer = TransactionLayer::new(transport.clone(), ulp.clone(), RetransmissionPolicy::default());
		let peer: SocketAddr = "127.0.0.2:2123".parse().unwrap();

		let local_teid = layer.accept_new_tunnel(peer).await;
		let request = GtpMessage { teid: local_teid, sequence_number: 7, body: GtpMessageBody::DeleteSessionRequest(Default::default()) };
		layer.send_triggered_response(local_teid, &request, GtpMessageBody::DeleteSessionResponse(Default::default())).await;

		let sent_before = transport.sent.lock().await.len();
		layer.handle_incoming(request.clone(), peer).await;
		let sent_after = transport.sent.lock().await.len();

		assert_eq!(sent_after, sent_before + 1, "duplicate should resend the cached response");
	}
}
