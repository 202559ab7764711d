//! Bridges the GTPv2-C transaction layer's synchronous `UlpCallback`
//! surface (spec §4.3) to the asynchronous UE-context-store lookups and
//! bus sends mme_app needs to perform in response: every method here
//! spawns the actual work rather than awaiting it, since `UlpCallback`'s
//! methods are plain synchronous functions called from inside the
//! transaction layer's own async tasks (`gtp::transaction::TransactionLayer`
//! never awaits a `UlpCallback` call).
//!
//! Grounded on `original_source/mme_app_itti_messaging.c`'s GTP primitive
//! handlers (`mme_app_handle_s11_create_session_response`, etc.), adapted
//! to the engine's bus-message routing instead of a direct handler call.

use std::{net::SocketAddr, sync::Arc};

use itti::{Bus, Priority, TaskId};
use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
	messages::{AppMessage, EsmBusMessage, GtpSessionEvent, MmeAppBusMessage, NetworkTriggeredEsmRequest},
	store::UeContextStore,
};

pub type GtpLayer = gtp::TransactionLayer<Arc<dyn gtp::GtpTransport>, Arc<dyn gtp::UlpCallback>>;

/// Which interface a `GtpUlp` instance is bound to: the two transaction
/// layers (S11 towards the SGW, S10 towards peer MMEs) share this one
/// callback shape but differ in how much of the protocol mme_app actually
/// implements (spec §4.7's S10 procedures are a reduced/logged scope, see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
	S11,
	S10,
}

/// `UlpCallback` implementation shared by the S11 and S10 transaction
/// layers. Constructed before its transaction layer exists (the layer
/// needs this as a constructor argument), then bound to it with
/// [`GtpUlp::bind`] once the layer is built, so Echo/negative-ack replies
/// this adapter issues on its own don't need to round-trip through
/// mme_app's session orchestration.
pub struct GtpUlp {
	interface: Interface,
	bus: Bus<AppMessage>,
	store: Arc<UeContextStore>,
	pending_incoming: Arc<SccHashMap<u32, gtp::GtpMessage, FxBuildHasher>>,
	layer: OnceCell<Arc<GtpLayer>>,
}

impl GtpUlp {
	pub fn new(
		interface: Interface,
		bus: Bus<AppMessage>,
		store: Arc<UeContextStore>,
		pending_incoming: Arc<SccHashMap<u32, gtp::GtpMessage, FxBuildHasher>>,
	) -> Self {
		Self { interface, bus, store, pending_incoming, layer: OnceCell::new() }
	}

	/// Supplies the transaction layer this adapter was built for. Must be
	/// called exactly once, before any traffic is fed through it.
	pub fn bind(
		&self,
		layer: Arc<GtpLayer>,
	) {
		let _ = self.layer.set(layer);
	}

	fn send_to_esm(
		&self,
		ue_id: crate::model::ids::MmeUeS1apId,
		request: NetworkTriggeredEsmRequest,
	) {
		if let Err(err) = self.bus.send(
			TaskId::Gtp,
			TaskId::Esm,
			0,
			Priority::Normal,
			AppMessage::Esm(EsmBusMessage::NetworkTriggered { ue_id, request }),
		) {
			warn!(%err, "failed to forward network-triggered ESM request");
		}
	}

	fn send_session_response(
		&self,
		ue_id: crate::model::ids::MmeUeS1apId,
		response: GtpSessionEvent,
	) {
		if let Err(err) = self.bus.send(
			TaskId::Gtp,
			TaskId::MmeApp,
			0,
			Priority::Normal,
			AppMessage::MmeApp(MmeAppBusMessage::GtpSessionResponse { ue_id, response }),
		) {
			warn!(%err, "failed to forward GTP session response");
		}
	}

	async fn lookup_ue_id(
		&self,
		local_teid: u32,
	) -> Option<crate::model::ids::MmeUeS1apId> {
		let queue = match self.interface {
			Interface::S11 => self.store.by_mme_teid_s11(local_teid).await,
			Interface::S10 => self.store.by_mme_teid_s10(local_teid).await,
		}?;
		Some(queue.schedule_and_wait(|ue| Box::pin(async move { ue.mme_ue_s1ap_id })).await)
	}
}

fn to_session_event(body: gtp::GtpMessageBody) -> Option<GtpSessionEvent> {
	match body {
		gtp::GtpMessageBody::CreateSessionResponse(r) => Some(GtpSessionEvent::CreateSessionResponse(r)),
		gtp::GtpMessageBody::ModifyBearerResponse(r) => Some(GtpSessionEvent::ModifyBearerResponse(r)),
		gtp::GtpMessageBody::DeleteSessionResponse(r) => Some(GtpSessionEvent::DeleteSessionResponse(r)),
		gtp::GtpMessageBody::ReleaseAccessBearersResponse(r) => Some(GtpSessionEvent::ReleaseAccessBearersResponse(r)),
		gtp::GtpMessageBody::ForwardRelocationResponse(r) => Some(GtpSessionEvent::ForwardRelocationResponse(r)),
		other => {
			debug!(?other, "GTP response body has no mme_app session-orchestration counterpart");
			None
		}
	}
}

fn to_network_triggered(body: gtp::GtpMessageBody) -> Option<NetworkTriggeredEsmRequest> {
	match body {
		gtp::GtpMessageBody::CreateBearerRequest(r) => Some(NetworkTriggeredEsmRequest::CreateBearer(r)),
		gtp::GtpMessageBody::UpdateBearerRequest(r) => Some(NetworkTriggeredEsmRequest::UpdateBearer(r)),
		gtp::GtpMessageBody::DeleteBearerRequest(r) => Some(NetworkTriggeredEsmRequest::DeleteBearer(r)),
		gtp::GtpMessageBody::DeleteBearerCommand(r) => Some(NetworkTriggeredEsmRequest::DeleteBearerCommand(r)),
		_ => None,
	}
}

impl gtp::UlpCallback for GtpUlp {
	fn triggered_response(
		&self,
		local_teid: u32,
		response: gtp::GtpMessage,
	) {
		let interface = self.interface;
		let store = self.store.clone();
		let bus = self.bus.clone();
		let pending_incoming = self.pending_incoming.clone();
		let _ = &pending_incoming;
		tokio::spawn(async move {
			let this = GtpUlp { interface, bus, store, pending_incoming, layer: OnceCell::new() };
			let Some(event) = to_session_event(response.body) else { return };
			let Some(ue_id) = this.lookup_ue_id(local_teid).await else {
				warn!(local_teid, "GTP response for an unresolvable tunnel");
				return;
			};
			this.send_session_response(ue_id, event);
		});
	}

	fn initial_request(
		&self,
		peer: SocketAddr,
		request: gtp::GtpMessage,
		local_teid: u32,
	) {
		if let gtp::GtpMessageBody::EchoRequest(echo) = &request.body {
			let recovery = echo.recovery;
			let Some(layer) = self.layer.get().cloned() else { return };
			tokio::spawn(async move {
				layer.send_triggered_response(local_teid, &request, gtp::GtpMessageBody::EchoResponse(gtp::EchoResponse { recovery })).await;
			});
			return;
		}

		match self.interface {
			Interface::S11 => {
				warn!(%peer, local_teid, ?request.body, "unexpected initial request on S11, no established tunnel expects one");
			}
			Interface::S10 => {
				debug!(%peer, local_teid, "inter-MME S10 procedure received, responding with a generic failure (reduced scope)");
				let Some(layer) = self.layer.get().cloned() else { return };
				tokio::spawn(async move {
					let body = match &request.body {
						gtp::GtpMessageBody::ContextRequest(_) => {
							Some(gtp::GtpMessageBody::ContextResponse(gtp::ContextResponse {
								cause: gtp::Cause::SystemFailure,
								mm_context: Vec::new(),
								pdn_connections: Vec::new(),
							}))
						}
						gtp::GtpMessageBody::ForwardRelocationRequest(_) => {
							Some(gtp::GtpMessageBody::ForwardRelocationResponse(gtp::ForwardRelocationResponse { cause: gtp::Cause::SystemFailure }))
						}
						_ => None,
					};
					if let Some(body) = body {
						layer.send_triggered_response(local_teid, &request, body).await;
					}
				});
			}
		}
	}

	fn triggered_request(
		&self,
		local_teid: u32,
		request: gtp::GtpMessage,
	) {
		if self.interface != Interface::S11 {
			debug!(local_teid, "S10 triggered request received, reduced scope, ignoring");
			return;
		}
		if matches!(request.body, gtp::GtpMessageBody::DownlinkDataNotification(_)) {
			debug!(local_teid, "Downlink Data Notification received, paging is out of scope, acknowledging");
			let Some(layer) = self.layer.get().cloned() else { return };
			tokio::spawn(async move {
				layer
					.send_triggered_response(
						local_teid,
						&request,
						gtp::GtpMessageBody::DownlinkDataNotificationAcknowledge(gtp::DownlinkDataNotificationAcknowledge {
							cause: gtp::Cause::RequestAccepted,
						}),
					)
					.await;
			});
			return;
		}

		let Some(network_request) = to_network_triggered(request.body.clone()) else {
			debug!(local_teid, ?request.body, "triggered request has no ESM counterpart");
			return;
		};
		let interface = self.interface;
		let store = self.store.clone();
		let bus = self.bus.clone();
		let pending_incoming = self.pending_incoming.clone();
		tokio::spawn(async move {
			let this = GtpUlp { interface, bus, store, pending_incoming: pending_incoming.clone(), layer: OnceCell::new() };
			let Some(ue_id) = this.lookup_ue_id(local_teid).await else {
				warn!(local_teid, "network-triggered request for an unresolvable tunnel");
				return;
			};
			let _ = pending_incoming.insert_async(local_teid, request).await;
			this.send_to_esm(ue_id, network_request);
		});
	}

	fn response_failure(
		&self,
		local_teid: u32,
		sequence_number: u32,
	) {
		if self.interface != Interface::S11 {
			// spec §8 scenario 5: a silent peer MME leaves the handover
			// procedure abandoned. The UE context was never mutated in
			// anticipation of success (see `on_handover_required`), so there
			// is nothing to roll back: the UE simply stays in its current
			// EMM/ECM state and a later Attach/TAU proceeds normally.
			warn!(local_teid, sequence_number, "S10 peer not responding to inter-MME handover request, UE context unaffected");
			return;
		}
		let interface = self.interface;
		let store = self.store.clone();
		let bus = self.bus.clone();
		let pending_incoming = self.pending_incoming.clone();
		tokio::spawn(async move {
			let this = GtpUlp { interface, bus, store, pending_incoming, layer: OnceCell::new() };
			let Some(ue_id) = this.lookup_ue_id(local_teid).await else {
				warn!(local_teid, sequence_number, "peer-not-responding for an unresolvable tunnel");
				return;
			};
			this.send_session_response(ue_id, GtpSessionEvent::PeerNotResponding);
		});
	}
}
