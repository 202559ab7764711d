//! mme_app orchestration (spec §4.7): UE-context lifecycle driven by S1AP
//! indications, the S11 session round-trip on ESM's behalf (lazy local TEID
//! allocation, eDNS/WRR peer selection, request/response correlation), and
//! the S1AP adaptor's outgoing side.
//!
//! Grounded on the per-message handlers declared in
//! `original_source/component/oai-mme/src/mme_app/mme_app_defs.h` and
//! dispatched in `mme_app_itti_messaging.c`/`mme_app_transport.c`, and on
//! `emm::mod`'s `XxxServices` + top-level `handle` shape, which this module
//! mirrors. `gtp_ulp` is the GTP-layer half of the S11/S10 adaptor; this
//! module is the UE-context/bus half.

pub mod edns;
pub mod gtp_ulp;

use std::sync::Arc;

use counter::CounterU32;
use gtp::ContextQueue;
use itti::{Bus, Priority, TaskId};
use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;
use tracing::{debug, info, warn};

use crate::{
	error::EngineError,
	mme_app::{edns::WrrCursor, gtp_ulp::GtpLayer},
	messages::{
		AppMessage, EmmBusMessage, EsmBusMessage, EsmSessionRequest, GtpSessionEvent, HssAnswerEvent, MmeAppBusMessage, S1apBusMessage, TimerArg,
	},
	model::{
		ids::{Ecgi, EnbS1apIdKey, MmeUeS1apId, Tai},
		procedure::ProcedureId,
		ue_context::{EcmState, ReleaseCause, UeContext},
	},
	nas::{EmmMessage, NasCodec, UplinkNas},
	s1ap::messages::{ReleaseCauseIndication, S1apAction, S1apIndication},
	stats::EngineStats,
	store::{IndexKeys, UeContextStore},
};

/// The collaborators mme_app's handlers need, bundled the same way
/// `EmmServices`/`EsmServices` are. Every S1AP action mme_app sends leaves
/// through the bus to the S1AP task rather than calling a transport
/// directly, the same seam `EmmServices::send_downlink_nas` uses for NAS.
#[derive(Clone)]
pub struct MmeAppServices {
	pub bus: Bus<AppMessage>,
	pub nas_codec: Arc<dyn NasCodec>,
	pub s11: Arc<GtpLayer>,
	pub config: Arc<mme_config::MmeConfig>,
	pub stats: Arc<EngineStats>,
	/// Shared with the S11 `gtp_ulp::GtpUlp`: a network-triggered Create/
	/// Update/Delete Bearer Request this adaptor has not yet answered,
	/// keyed by the tunnel it arrived on, so ESM's eventual answer can be
	/// sent as a `send_triggered_response` to the right cached request.
	pending_s11_incoming: Arc<SccHashMap<u32, gtp::GtpMessage, FxBuildHasher>>,
	/// The S10 transaction layer, used only to originate an inter-MME
	/// Forward Relocation Request on Handover Required (spec §4.7); S10
	/// never receives an initial request of its own (see `gtp_ulp`).
	s10: Arc<GtpLayer>,
	sgw_cursor: Arc<WrrCursor>,
	mme_cursor: Arc<WrrCursor>,
	ue_id_counter: Arc<CounterU32>,
	/// Correlates a `GtpSessionResponse` back to the ESM procedure that
	/// asked for it (spec §4.7's "at most one S11 procedure in flight per
	/// UE" makes a single pending slot sufficient; `GtpSessionEvent` itself
	/// carries no procedure id).
	pending_esm_procedure: Arc<SccHashMap<MmeUeS1apId, ProcedureId, FxBuildHasher>>,
	/// A UE Context Release Request currently waiting on a Release Access
	/// Bearers Response before the matching `UeContextReleaseCommand` can be
	/// sent, keyed by UE rather than by tunnel so it can be recorded even
	/// for a UE with no S11 session yet.
	pending_release: Arc<SccHashMap<MmeUeS1apId, ReleaseCauseIndication, FxBuildHasher>>,
}

impl MmeAppServices {
	pub fn new(
		bus: Bus<AppMessage>,
		nas_codec: Arc<dyn NasCodec>,
		s11: Arc<GtpLayer>,
		s10: Arc<GtpLayer>,
		config: Arc<mme_config::MmeConfig>,
		stats: Arc<EngineStats>,
		pending_s11_incoming: Arc<SccHashMap<u32, gtp::GtpMessage, FxBuildHasher>>,
	) -> Self {
		Self {
			bus,
			nas_codec,
			s11,
			s10,
			config,
			stats,
			pending_s11_incoming,
			sgw_cursor: Arc::new(WrrCursor::new()),
			mme_cursor: Arc::new(WrrCursor::new()),
			ue_id_counter: Arc::new(CounterU32::new()),
			pending_esm_procedure: Arc::new(SccHashMap::with_hasher(FxBuildHasher::default())),
			pending_release: Arc::new(SccHashMap::with_hasher(FxBuildHasher::default())),
		}
	}

	fn next_ue_id(&self) -> MmeUeS1apId {
		MmeUeS1apId(self.ue_id_counter.increment())
	}

	fn send_s1ap(
		&self,
		action: S1apAction,
	) {
		if let Err(err) = self.bus.send(TaskId::MmeApp, TaskId::S1ap, 0, Priority::Normal, AppMessage::S1ap(S1apBusMessage::Outgoing(action))) {
			warn!(%err, "failed to enqueue S1AP action from mme_app");
		}
	}

	fn route_uplink_nas(
		&self,
		ue_id: MmeUeS1apId,
		nas_pdu: &[u8],
	) {
		match self.nas_codec.decode_uplink(nas_pdu, None) {
			Ok(message) => self.dispatch_decoded_uplink(ue_id, message),
			Err(err) => warn!(%ue_id, ?err, "failed to decode uplink NAS PDU"),
		}
	}

	/// Forwards an already-decoded uplink NAS message to the owning EMM or
	/// ESM task. Split out of `route_uplink_nas` so `on_initial_ue_message`
	/// can decode the Initial UE Message's NAS PDU exactly once: it needs
	/// the decoded `AttachRequest`'s GUTI/IMSI to resolve the Attach
	/// collision table (spec §4.5 step 2) before it knows which UE context
	/// this message is even for.
	fn dispatch_decoded_uplink(
		&self,
		ue_id: MmeUeS1apId,
		message: UplinkNas,
	) {
		match message {
			UplinkNas::Emm(message) => {
				if let Err(err) =
					self.bus.send(TaskId::MmeApp, TaskId::Emm, 0, Priority::Normal, AppMessage::Emm(EmmBusMessage::UplinkMessage { ue_id, message }))
				{
					warn!(%err, "failed to forward uplink NAS to EMM");
				}
			}
			UplinkNas::Esm(message) => {
				if let Err(err) =
					self.bus.send(TaskId::MmeApp, TaskId::Esm, 0, Priority::Normal, AppMessage::Esm(EsmBusMessage::UplinkMessage { ue_id, message }))
				{
					warn!(%err, "failed to forward uplink NAS to ESM");
				}
			}
		}
	}
}

fn to_release_cause(cause: ReleaseCauseIndication) -> ReleaseCause {
	match cause {
		ReleaseCauseIndication::UserInactivity => ReleaseCause::UserInactivity,
		ReleaseCauseIndication::RadioLinkFailure => ReleaseCause::RadioLinkFailure,
		ReleaseCauseIndication::CsfbTriggered => ReleaseCause::CsfbTriggered,
		ReleaseCauseIndication::Other => ReleaseCause::NormalRelease,
	}
}

/// Top-level mme_app task entry point (spec §4.7).
pub async fn handle(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	message: MmeAppBusMessage,
) -> Result<(), EngineError> {
	match message {
		MmeAppBusMessage::S1apIndication { indication, .. } => {
			dispatch_s1ap_indication(store, services, indication).await;
		}
		MmeAppBusMessage::GtpSessionResponse { ue_id, response } => {
			dispatch_gtp_session_response(store, services, ue_id, response).await;
		}
		MmeAppBusMessage::HssAnswer { ue_id, answer } => {
			dispatch_hss_answer(ue_id, answer);
		}
		MmeAppBusMessage::EsmSessionRequest { ue_id, procedure_id, request } => {
			dispatch_esm_session_request(store, services, ue_id, procedure_id, request).await;
		}
		MmeAppBusMessage::TimerExpired(arg) => {
			dispatch_timeout(arg);
		}
	}
	Ok(())
}

async fn dispatch_s1ap_indication(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	indication: S1apIndication,
) {
	match indication {
		S1apIndication::InitialUeMessage { enb_key, tai, ecgi, nas_pdu } => {
			on_initial_ue_message(store, services, enb_key, tai, ecgi, &nas_pdu).await;
		}
		S1apIndication::UplinkNasTransport { mme_ue_s1ap_id, enb_key, nas_pdu } => {
			on_uplink_nas_transport(store, services, mme_ue_s1ap_id, enb_key, &nas_pdu).await;
		}
		S1apIndication::UeContextReleaseRequest { mme_ue_s1ap_id, cause } => {
			on_ue_context_release_request(store, services, mme_ue_s1ap_id, cause).await;
		}
		S1apIndication::UeContextReleaseComplete { mme_ue_s1ap_id } => {
			on_ue_context_release_complete(store, services, mme_ue_s1ap_id).await;
		}
		S1apIndication::PathSwitchRequest { mme_ue_s1ap_id, new_enb_key, .. } => {
			on_path_switch_request(store, services, mme_ue_s1ap_id, new_enb_key).await;
		}
		S1apIndication::ErabSetupResponse { mme_ue_s1ap_id, succeeded, failed } => {
			debug!(
				%mme_ue_s1ap_id,
				succeeded = succeeded.len(),
				failed = failed.len(),
				"E-RAB Setup Response received; dedicated bearer activation sends the NAS request directly and tracks no matching round-trip"
			);
		}
		S1apIndication::ErabModifyResponse { mme_ue_s1ap_id, succeeded, failed } => {
			debug!(%mme_ue_s1ap_id, succeeded = succeeded.len(), failed = failed.len(), "E-RAB Modify Response received, no pending round-trip tracked");
		}
		S1apIndication::ErabReleaseResponse { mme_ue_s1ap_id, released } => {
			debug!(%mme_ue_s1ap_id, released = released.len(), "E-RAB Release Response received, no pending round-trip tracked");
		}
		S1apIndication::HandoverRequired { mme_ue_s1ap_id, target_ecgi } => {
			on_handover_required(store, services, mme_ue_s1ap_id, target_ecgi).await;
		}
		S1apIndication::HandoverRequestAcknowledge { mme_ue_s1ap_id, .. } => {
			info!(%mme_ue_s1ap_id, "Handover Request Acknowledge received, reduced scope");
		}
		S1apIndication::HandoverNotify { mme_ue_s1ap_id, cell_id } => {
			info!(%mme_ue_s1ap_id, ?cell_id, "Handover Notify received, reduced scope");
		}
		S1apIndication::HandoverCancel { mme_ue_s1ap_id } => {
			info!(%mme_ue_s1ap_id, "Handover Cancel received, reduced scope");
		}
		S1apIndication::S1SetupRequest { global_enb_id, supported_tais } => {
			info!(global_enb_id, tais = supported_tais.len(), "S1 Setup Request received, served TAI negotiation is reduced scope");
		}
		S1apIndication::EnbConfigurationTransfer { target_ecgi, source_ecgi } => {
			debug!(?target_ecgi, ?source_ecgi, "eNB Configuration Transfer received, inter-eNB relay is reduced scope");
		}
	}
}

/// Handles an Initial UE Message (spec §4.5 step 2's "collision" entry
/// point): an Attach Request carrying a known GUTI or IMSI reuses that UE's
/// existing context instead of minting a duplicate one under a fresh
/// `mme_ue_s1ap_id`, the same `mme_ue_context_exists_guti`/
/// `mme_ue_context_exists_imsi` lookup order
/// `original_source/component/oai-mme/src/nas/emm/Attach.c`'s
/// `_emm_attach_ies_have_changed`/attach-request entry point uses before
/// deciding whether to abort an in-progress procedure. Any other uplink NAS
/// PDU on a brand-new S1AP connection has no identity to look up by and
/// always gets a fresh context, as before.
async fn on_initial_ue_message(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	enb_key: EnbS1apIdKey,
	tai: Tai,
	ecgi: Ecgi,
	nas_pdu: &[u8],
) {
	let decoded = match services.nas_codec.decode_uplink(nas_pdu, None) {
		Ok(message) => Some(message),
		Err(err) => {
			warn!(?err, "failed to decode Initial UE Message's NAS PDU");
			None
		}
	};

	let existing = match &decoded {
		Some(UplinkNas::Emm(EmmMessage::AttachRequest { guti: Some(guti), .. })) => store.by_guti(guti).await,
		Some(UplinkNas::Emm(EmmMessage::AttachRequest { imsi: Some(imsi), guti: None, .. })) => store.by_imsi(imsi).await,
		_ => None,
	};

	let ue_id = if let Some(queue) = existing {
		let (id, old_enb_key) = queue
			.clone()
			.schedule_and_wait(move |ue: &mut UeContext| {
				let old_enb_key = ue.enb_key;
				ue.enb_key = Some(enb_key);
				ue.current_tai = Some(tai);
				ue.ecgi = Some(ecgi);
				ue.ecm_state = EcmState::Connected;
				let id = ue.mme_ue_s1ap_id;
				Box::pin(async move { (id, old_enb_key) })
			})
			.await;
		if old_enb_key != Some(enb_key) {
			let old_keys = IndexKeys { enb_key: old_enb_key, ..IndexKeys::default() };
			let new_keys = IndexKeys { enb_key: Some(enb_key), ..IndexKeys::default() };
			store.update_collection_keys(id, &old_keys, &new_keys).await;
		}
		services.stats.record_s1ap_connection_established();
		id
	} else {
		let ue_id = services.next_ue_id();
		let mut ue = UeContext::new(ue_id, 0);
		ue.enb_key = Some(enb_key);
		ue.current_tai = Some(tai);
		ue.ecgi = Some(ecgi);
		ue.ecm_state = EcmState::Connected;
		store.insert(ue).await;

		services.stats.record_ue_context_created();
		services.stats.record_s1ap_connection_established();
		ue_id
	};

	if let Some(message) = decoded {
		services.dispatch_decoded_uplink(ue_id, message);
	}
}

async fn on_uplink_nas_transport(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	mme_ue_s1ap_id: MmeUeS1apId,
	enb_key: EnbS1apIdKey,
	nas_pdu: &[u8],
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(mme_ue_s1ap_id).await else {
		warn!(%mme_ue_s1ap_id, "Uplink NAS Transport for unknown UE context");
		return;
	};
	let old_enb_key = queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			let old = ue.enb_key;
			ue.enb_key = Some(enb_key);
			Box::pin(async move { old })
		})
		.await;
	if old_enb_key != Some(enb_key) {
		let old_keys = IndexKeys { enb_key: old_enb_key, ..IndexKeys::default() };
		let new_keys = IndexKeys { enb_key: Some(enb_key), ..IndexKeys::default() };
		store.update_collection_keys(mme_ue_s1ap_id, &old_keys, &new_keys).await;
	}
	services.route_uplink_nas(mme_ue_s1ap_id, nas_pdu);
}

async fn on_ue_context_release_request(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	mme_ue_s1ap_id: MmeUeS1apId,
	cause: ReleaseCauseIndication,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(mme_ue_s1ap_id).await else {
		warn!(%mme_ue_s1ap_id, "UE Context Release Request for unknown UE context");
		return;
	};
	let release_cause = to_release_cause(cause);
	let (local_teid, enb_key) = queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			ue.release_cause = Some(release_cause);
			ue.ecm_state = EcmState::Idle;
			let local_teid = (ue.session_pool.mme_teid_s11 != 0).then_some(ue.session_pool.mme_teid_s11);
			let enb_key = ue.enb_key;
			Box::pin(async move { (local_teid, enb_key) })
		})
		.await;

	let Some(local_teid) = local_teid else {
		if let Some(enb_key) = enb_key {
			services.send_s1ap(S1apAction::UeContextReleaseCommand { enb_key, mme_ue_s1ap_id, cause });
		}
		return;
	};

	let _ = services.pending_release.upsert_async(mme_ue_s1ap_id, cause).await;
	services.s11.send_triggered_request(local_teid, gtp::GtpMessageBody::ReleaseAccessBearersRequest(gtp::ReleaseAccessBearersRequest)).await;
}

async fn on_ue_context_release_complete(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	mme_ue_s1ap_id: MmeUeS1apId,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(mme_ue_s1ap_id).await else {
		return;
	};
	let old_enb_key = queue
		.clone()
		.schedule_and_wait(|ue: &mut UeContext| {
			let old = ue.enb_key;
			ue.enb_key = None;
			ue.ecm_state = EcmState::Idle;
			Box::pin(async move { old })
		})
		.await;
	if let Some(old_enb_key) = old_enb_key {
		let old_keys = IndexKeys { enb_key: Some(old_enb_key), ..IndexKeys::default() };
		store.update_collection_keys(mme_ue_s1ap_id, &old_keys, &IndexKeys::default()).await;
	}
	services.stats.record_s1ap_connection_released();
}

/// Opaque MM-context/PDN-connections payload this MME produces and
/// expects back verbatim in a `ContextResponse`/`ForwardRelocationRequest`
/// it itself receives (`gtp::ForwardRelocationRequest`'s doc comment); kept
/// to a `serde_json` blob the way `nas::JsonNasCodec` stands in for the
/// real bit-level encoding, since both are Non-goals (spec §1).
#[derive(serde::Serialize)]
struct HandoverMmContext {
	imsi: Option<String>,
	ksi: Option<u8>,
}

#[derive(serde::Serialize)]
struct HandoverPdnConnection {
	context_id: u8,
	apn: String,
	default_ebi: u8,
}

/// Originates an inter-MME handover (spec §4.7's "Forward Relocation
/// Request/Response"; spec §8 scenario 5). Resolution of `target_ecgi` to
/// a concrete eNB association on the target side, and of the target MME's
/// address from the UE's TAC via the eDNS `mme_entries` table, are both
/// this function's job; everything past "the peer MME accepted or timed
/// out" (actually relocating the S1 context) is reduced scope — see
/// DESIGN.md.
async fn on_handover_required(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	mme_ue_s1ap_id: MmeUeS1apId,
	target_ecgi: Ecgi,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(mme_ue_s1ap_id).await else {
		warn!(%mme_ue_s1ap_id, "Handover Required for unknown UE context");
		return;
	};
	let snapshot = queue
		.clone()
		.schedule_and_wait(|ue: &mut UeContext| {
			let tac = ue.current_tai.as_ref().map(|tai| tai.tac);
			let mm_context = HandoverMmContext { imsi: ue.imsi.as_ref().map(|imsi| imsi.as_str().to_owned()), ksi: ue.emm_data.security_context.ksi };
			let pdn_connections: Vec<HandoverPdnConnection> = ue
				.session_pool
				.pdn_contexts()
				.map(|pdn| HandoverPdnConnection { context_id: pdn.context_id, apn: pdn.apn.clone(), default_ebi: pdn.default_ebi })
				.collect();
			Box::pin(async move { (tac, mm_context, pdn_connections) })
		})
		.await;
	let (Some(tac), mm_context, pdn_connections) = snapshot else {
		warn!(%mme_ue_s1ap_id, "cannot select a target MME with no serving TAI recorded");
		return;
	};
	let Some(peer) = edns::select_mme_peer(&services.config.configuration.edns, &services.mme_cursor, tac) else {
		info!(%mme_ue_s1ap_id, ?target_ecgi, "no eDNS mme_entries for this TAC, S1-based handover attempted instead (reduced scope, see DESIGN.md)");
		return;
	};

	let mm_context_blob = serde_json::to_vec(&mm_context).unwrap_or_default();
	let pdn_connections_blob = serde_json::to_vec(&pdn_connections).unwrap_or_default();
	let local_teid = services
		.s10
		.send_initial_request(peer, gtp::GtpMessageBody::ForwardRelocationRequest(gtp::ForwardRelocationRequest {
			mm_context: mm_context_blob,
			pdn_connections: pdn_connections_blob,
		}))
		.await;

	let old_keys = queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			let old = IndexKeys::from_context(ue);
			ue.mme_teid_s10 = Some(local_teid);
			Box::pin(async move { old })
		})
		.await;
	let new_keys = IndexKeys { mme_teid_s10: Some(local_teid), ..old_keys.clone() };
	store.update_collection_keys(mme_ue_s1ap_id, &old_keys, &new_keys).await;
	info!(%mme_ue_s1ap_id, %peer, local_teid, "Forward Relocation Request sent to target MME");
}

async fn on_path_switch_request(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	mme_ue_s1ap_id: MmeUeS1apId,
	new_enb_key: EnbS1apIdKey,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(mme_ue_s1ap_id).await else {
		warn!(%mme_ue_s1ap_id, "Path Switch Request for unknown UE context");
		return;
	};
	let old_enb_key = queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			let old = ue.enb_key;
			ue.enb_key = Some(new_enb_key);
			Box::pin(async move { old })
		})
		.await;
	let old_keys = IndexKeys { enb_key: old_enb_key, ..IndexKeys::default() };
	let new_keys = IndexKeys { enb_key: Some(new_enb_key), ..IndexKeys::default() };
	store.update_collection_keys(mme_ue_s1ap_id, &old_keys, &new_keys).await;
	services.send_s1ap(S1apAction::PathSwitchRequestAcknowledge { enb_key: new_enb_key, mme_ue_s1ap_id });
}

async fn dispatch_gtp_session_response(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	ue_id: MmeUeS1apId,
	response: GtpSessionEvent,
) {
	if let GtpSessionEvent::ForwardRelocationResponse(resp) = &response {
		on_forward_relocation_response(ue_id, resp.cause);
		return;
	}

	if let Some((_, cause)) = services.pending_release.remove_async(&ue_id).await {
		if let GtpSessionEvent::ReleaseAccessBearersResponse(resp) = &response {
			if !resp.cause.is_accepted() {
				warn!(%ue_id, cause = ?resp.cause, "SGW rejected Release Access Bearers Request, releasing the S1 context regardless");
			}
		}
		let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
			return;
		};
		let enb_key = queue.clone().schedule_and_wait(|ue: &mut UeContext| Box::pin(async move { ue.enb_key })).await;
		if let Some(enb_key) = enb_key {
			services.send_s1ap(S1apAction::UeContextReleaseCommand { enb_key, mme_ue_s1ap_id: ue_id, cause });
		}
		return;
	}

	if let Some((_, procedure_id)) = services.pending_esm_procedure.remove_async(&ue_id).await {
		if let Err(err) = services.bus.send(
			TaskId::MmeApp,
			TaskId::Esm,
			0,
			Priority::Normal,
			AppMessage::Esm(EsmBusMessage::SessionOutcome { ue_id, procedure_id, event: response }),
		) {
			warn!(%err, "failed to forward GTP session outcome to ESM");
		}
		return;
	}

	warn!(%ue_id, ?response, "GTP session response with no pending ESM request or UE context release on record");
}

/// spec §8 scenario 5's counterpart for the "peer answered" branch: a
/// `RequestAccepted` cause means the target side is ready, and a real
/// deployment would now command the source eNB to relocate the S1
/// context (`S1apAction::HandoverCommand`); addressing that command needs
/// a target-eNB association this core does not track (S1-based handover
/// is reduced scope, see DESIGN.md), so only the outcome is logged. Any
/// other cause means the handover did not happen; the UE context was
/// never mutated in anticipation of success, so there is nothing to undo.
fn on_forward_relocation_response(
	ue_id: MmeUeS1apId,
	cause: gtp::Cause,
) {
	if cause.is_accepted() {
		info!(%ue_id, "target MME accepted Forward Relocation Request, S1 relocation command is reduced scope");
	} else {
		info!(%ue_id, ?cause, "target MME rejected Forward Relocation Request, UE stays on the source side");
	}
}

fn dispatch_hss_answer(
	ue_id: MmeUeS1apId,
	answer: HssAnswerEvent,
) {
	// HSS-initiated push procedures (Cancel-Location, Reset, Insert
	// Subscriber Data) have no bus consumer wired on the EMM side yet;
	// `emm::cn_triggered` only handles a Cancel-Location already modeled as
	// a nested Detach. See DESIGN.md.
	debug!(%ue_id, ?answer, "HSS answer delivered to mme_app with no EMM-side consumer wired");
}

fn dispatch_timeout(arg: TimerArg) {
	warn!(ue_id = %arg.ue_id, procedure_id = arg.procedure_id.0, "mme_app timer expired with no owning procedure (S10 handover timers are reduced scope)");
}

async fn dispatch_esm_session_request(
	store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	ue_id: MmeUeS1apId,
	procedure_id: ProcedureId,
	request: EsmSessionRequest,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "ESM session request for unknown UE context");
		return;
	};

	match request {
		EsmSessionRequest::CreateSession(mut body) => {
			let tac = queue.clone().schedule_and_wait(|ue: &mut UeContext| Box::pin(async move { ue.current_tai.as_ref().map(|tai| tai.tac) })).await;
			let Some(tac) = tac else {
				warn!(%ue_id, "cannot select an SGW peer with no serving TAI recorded");
				return;
			};
			let Some(peer) = edns::select_sgw_peer(&services.config.configuration.edns, &services.sgw_cursor, tac, &body.apn) else {
				warn!(%ue_id, apn = %body.apn, "no eDNS entry for this TAC/APN, Create Session Request dropped");
				return;
			};

			let local_teid = services.s11.accept_new_tunnel(peer).await;
			body.sender_fteid_control_plane.teid = local_teid;

			let old_keys = queue
				.clone()
				.schedule_and_wait(move |ue: &mut UeContext| {
					let old = IndexKeys::from_context(ue);
					ue.session_pool.mme_teid_s11 = local_teid;
					Box::pin(async move { old })
				})
				.await;
			let new_keys = IndexKeys { mme_teid_s11: Some(local_teid), ..old_keys.clone() };
			store.update_collection_keys(ue_id, &old_keys, &new_keys).await;

			let _ = services.pending_esm_procedure.upsert_async(ue_id, procedure_id).await;
			services.s11.send_triggered_request(local_teid, gtp::GtpMessageBody::CreateSessionRequest(body)).await;
		}
		EsmSessionRequest::ModifyBearer(body) => {
			send_on_established_session(store, services, &queue, ue_id, procedure_id, gtp::GtpMessageBody::ModifyBearerRequest(body)).await;
		}
		EsmSessionRequest::DeleteSession(body) => {
			send_on_established_session(store, services, &queue, ue_id, procedure_id, gtp::GtpMessageBody::DeleteSessionRequest(body)).await;
		}
		EsmSessionRequest::ReleaseAccessBearers => {
			send_on_established_session(
				store,
				services,
				&queue,
				ue_id,
				procedure_id,
				gtp::GtpMessageBody::ReleaseAccessBearersRequest(gtp::ReleaseAccessBearersRequest),
			)
			.await;
		}
		EsmSessionRequest::CreateBearerResponse(body) => {
			reply_to_network_triggered(services, &queue, ue_id, gtp::GtpMessageBody::CreateBearerResponse(body)).await;
		}
		EsmSessionRequest::UpdateBearerResponse(body) => {
			reply_to_network_triggered(services, &queue, ue_id, gtp::GtpMessageBody::UpdateBearerResponse(body)).await;
		}
		EsmSessionRequest::DeleteBearerResponse(body) => {
			reply_to_network_triggered(services, &queue, ue_id, gtp::GtpMessageBody::DeleteBearerResponse(body)).await;
		}
		EsmSessionRequest::BearerResourceCommand(body) => {
			let local_teid = current_s11_teid(&queue).await;
			if local_teid == 0 {
				warn!(%ue_id, "Bearer Resource Command with no established S11 session");
				return;
			}
			services.s11.send_triggered_request(local_teid, gtp::GtpMessageBody::BearerResourceCommand(body)).await;
		}
	}
}

async fn current_s11_teid(queue: &Arc<ContextQueue<UeContext>>) -> u32 {
	queue.clone().schedule_and_wait(|ue: &mut UeContext| Box::pin(async move { ue.session_pool.mme_teid_s11 })).await
}

/// Sends an ESM-originated request on a UE's already-established S11
/// tunnel (spec §4.7: only the first Create Session Request allocates a
/// local TEID; everything after that reuses it).
async fn send_on_established_session(
	_store: &Arc<UeContextStore>,
	services: &MmeAppServices,
	queue: &Arc<ContextQueue<UeContext>>,
	ue_id: MmeUeS1apId,
	procedure_id: ProcedureId,
	body: gtp::GtpMessageBody,
) {
	let local_teid = current_s11_teid(queue).await;
	if local_teid == 0 {
		warn!(%ue_id, "ESM session request with no established S11 session");
		return;
	}
	let _ = services.pending_esm_procedure.upsert_async(ue_id, procedure_id).await;
	services.s11.send_triggered_request(local_teid, body).await;
}

async fn reply_to_network_triggered(
	services: &MmeAppServices,
	queue: &Arc<ContextQueue<UeContext>>,
	ue_id: MmeUeS1apId,
	body: gtp::GtpMessageBody,
) {
	let local_teid = current_s11_teid(queue).await;
	let Some((_, request)) = services.pending_s11_incoming.remove_async(&local_teid).await else {
		warn!(%ue_id, "no pending network-triggered GTP request recorded to answer");
		return;
	};
	services.s11.send_triggered_response(local_teid, &request, body).await;
}
