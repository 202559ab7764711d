//! PDN Connectivity procedure (3GPP TS 24.301 §6.5.1, spec §5.2): sets up a
//! new PDN connection and its default bearer, either standalone (a UE
//! already attached requesting a second PDN) or embedded in an Attach/TAU
//! Request's ESM container.
//!
//! Grounded on
//! `original_source/component/oai-mme/src/nas/esm/esm_proc.h`'s
//! `esm_proc_pdn_connectivity_request` family for the
//! request/accept/reject shape, `mme_app_apn_selection.c` for APN fallback
//! (`esm::apn_selection`), and `emm::attach`'s stage-machine texture for how
//! the procedure steps from "awaiting the S11 round-trip" to "awaiting the
//! UE's bearer accept".

use tracing::warn;

use crate::{
	esm::{apn_selection, bearer_state, reply, EsmServices},
	messages::{EsmSessionRequest, GtpSessionEvent},
	model::{
		bearer_context::{BearerContext, BearerQos, EsmEbrState},
		pdn_context::PdnContext,
		procedure::{Procedure, ProcedureId, ProcedureKind},
		ue_context::UeContext,
	},
	nas::EsmMessage,
};

/// 3GPP TS 24.301 §6.5.1.4: Activate Default EPS Bearer Context Request is
/// retransmitted up to four times (five transmissions total) before giving
/// up, the same counter shape as Attach Accept's T3450.
const RETRY_COUNTER_MAX: u32 = 5;

const STAGE_AWAITING_SESSION: u8 = 1;
const STAGE_AWAITING_ACCEPT: u8 = 2;

const CAUSE_INSUFFICIENT_RESOURCES: u8 = 26;
const CAUSE_UNKNOWN_APN: u8 = 27;
const CAUSE_PROTOCOL_ERROR: u8 = 111;

/// A standalone, UE-initiated PDN Connectivity Request arriving after
/// Attach (not embedded in one).
pub async fn on_request(
	ue: &mut UeContext,
	services: &EsmServices,
	message: EsmMessage,
) {
	let EsmMessage::PdnConnectivityRequest { pti, requested_apn, pdn_type } = message else {
		return;
	};
	start(ue, services, pti, requested_apn, pdn_type, None).await;
}

/// A PDN Connectivity Request carried in an Attach/TAU Request's ESM
/// container, answered via `EsmContainerReady` instead of a NAS downlink
/// of its own.
pub async fn on_emm_triggered(
	ue: &mut UeContext,
	services: &EsmServices,
	trigger: ProcedureId,
	message: EsmMessage,
) {
	let EsmMessage::PdnConnectivityRequest { pti, requested_apn, pdn_type } = message else {
		return;
	};
	start(ue, services, pti, requested_apn, pdn_type, Some(trigger)).await;
}

async fn start(
	ue: &mut UeContext,
	services: &EsmServices,
	pti: u8,
	requested_apn: Option<String>,
	pdn_type: gtp::PdnType,
	emm_trigger: Option<ProcedureId>,
) {
	let apn_config = match apn_selection::select(ue.subscription_data.as_ref(), requested_apn.as_deref()) {
		Ok(config) => config.clone(),
		Err(err) => {
			warn!(ue_id = %ue.mme_ue_s1ap_id, %err, "APN selection failed for PDN Connectivity Request");
			reply(ue, services, emm_trigger, EsmMessage::PdnConnectivityReject { pti, cause: CAUSE_UNKNOWN_APN }).await;
			services.stats.record_pdn_connectivity_outcome(false);
			return;
		}
	};

	let default_ebi = match ue.session_pool.allocate_bearer_ebi() {
		Ok(ebi) => ebi,
		Err(_) => {
			reply(ue, services, emm_trigger, EsmMessage::PdnConnectivityReject { pti, cause: CAUSE_INSUFFICIENT_RESOURCES })
				.await;
			services.stats.record_pdn_connectivity_outcome(false);
			return;
		}
	};
	let pdn_context_id = match ue.session_pool.allocate_pdn_slot() {
		Ok(id) => id,
		Err(_) => {
			ue.session_pool.release_bearer_ebi(default_ebi);
			reply(ue, services, emm_trigger, EsmMessage::PdnConnectivityReject { pti, cause: CAUSE_INSUFFICIENT_RESOURCES })
				.await;
			services.stats.record_pdn_connectivity_outcome(false);
			return;
		}
	};

	let qos = BearerQos {
		qci: apn_config.subscribed_qci,
		arp_priority_level: 1,
		arp_preemption_capability: false,
		arp_preemption_vulnerability: false,
	};
	let bearer = BearerContext::new_default(default_ebi, pdn_context_id, qos);
	let pdn_context = PdnContext::new(pdn_context_id, apn_config.apn.clone(), pdn_type, bearer);
	ue.session_pool.insert_pdn_context(pdn_context);

	let procedure_id = ue.allocate_procedure_id();
	let mut procedure = Procedure::new(procedure_id, ProcedureKind::PdnConnectivity, ue.mme_ue_s1ap_id, None);
	procedure.pti = Some(pti);
	procedure.ebi = Some(default_ebi);
	procedure.emm_trigger = emm_trigger;
	procedure.stage = STAGE_AWAITING_SESSION;
	ue.procedures.push(procedure);
	ue.session_pool.esm_procedures.push(procedure_id);

	let local_addr =
		services.config.configuration.s11.addresses.first().copied().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED.into());
	let request = gtp::CreateSessionRequest {
		imsi: ue.imsi.as_ref().map(|imsi| imsi.as_str().to_owned()).unwrap_or_default(),
		sender_fteid_control_plane: gtp::FTeid { teid: ue.session_pool.mme_teid_s11, addr: local_addr },
		apn: apn_config.apn.clone(),
		pdn_type,
		default_ebi,
		bearer_contexts: vec![gtp::BearerContextIe {
			ebi: default_ebi,
			qci: Some(apn_config.subscribed_qci),
			arp_priority_level: Some(1),
			..Default::default()
		}],
	};
	services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::CreateSession(request));
}

pub async fn on_session_outcome(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
	event: GtpSessionEvent,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.kind != ProcedureKind::PdnConnectivity || procedure.stage != STAGE_AWAITING_SESSION {
		return;
	}
	let GtpSessionEvent::CreateSessionResponse(response) = event else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "unexpected session event awaiting Create Session Response");
		return;
	};
	let pti = procedure.pti.unwrap_or(0);
	let emm_trigger = procedure.emm_trigger;
	let default_ebi = procedure.ebi.expect("PDN Connectivity procedure always records its default EBI");

	if !response.cause.is_accepted() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, cause = ?response.cause, "SGW rejected Create Session Request");
		rollback_session(ue, default_ebi);
		reply(ue, services, emm_trigger, EsmMessage::PdnConnectivityReject { pti, cause: CAUSE_INSUFFICIENT_RESOURCES }).await;
		services.stats.record_pdn_connectivity_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(fteid) = response.sender_fteid_control_plane else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Create Session Response accepted with no control-plane F-TEID");
		rollback_session(ue, default_ebi);
		reply(ue, services, emm_trigger, EsmMessage::PdnConnectivityReject { pti, cause: CAUSE_PROTOCOL_ERROR }).await;
		services.stats.record_pdn_connectivity_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	};
	let allocated_ip = response.pdn_addr_allocation;
	let pdn_type = ue
		.session_pool
		.pdn_context_owning_bearer(default_ebi)
		.map(|pdn| pdn.pdn_type)
		.unwrap_or(gtp::PdnType::Ipv4);
	let pco = {
		let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(default_ebi) else {
			return;
		};
		pdn.update_from_create_session_response(fteid, allocated_ip);
		if let Some(bearer) = pdn.bearer_mut(default_ebi) {
			if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::ActivePending) {
				bearer.ebr_state = next;
			}
		}
		if pdn.pco.0.is_empty() { None } else { Some(pdn.pco.0.clone()) }
	};

	let accept = EsmMessage::ActivateDefaultEpsBearerContextRequest { ebi: default_ebi, pti, pdn_type, pco };

	if let Some(trigger) = emm_trigger {
		// The Attach/TAU Accept this container rides along on carries no
		// separate wire-level Activate Default EPS Bearer Context Accept
		// (spec's `EmmMessage::AttachComplete` has no ESM container field),
		// so there is nothing left here to wait on: treat the bearer as
		// active as soon as EMM's own Accept/Complete exchange closes.
		if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(default_ebi) {
			if let Some(bearer) = pdn.bearer_mut(default_ebi) {
				if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::Active) {
					bearer.ebr_state = next;
				}
			}
		}
		reply(ue, services, Some(trigger), accept).await;
		services.stats.record_pdn_connectivity_outcome(true);
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Activate Default EPS Bearer Context Request with no eNB association");
		return;
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &accept);
	set_stage(ue, procedure_id, STAGE_AWAITING_ACCEPT);
	let timer = services.start_timer(services.config.configuration.timers.t3485, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
	}
}

pub async fn on_activate_default_accept(
	ue: &mut UeContext,
	services: &EsmServices,
	ebi: u8,
) {
	let Some(procedure_id) = active_procedure_for_ebi(ue, ebi) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Activate Default EPS Bearer Context Accept for no in-flight PDN Connectivity");
		return;
	};
	if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
		if let Some(bearer) = pdn.bearer_mut(ebi) {
			if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::Active) {
				bearer.ebr_state = next;
			}
		}
	}
	services.stats.record_pdn_connectivity_outcome(true);
	finish(ue, services, procedure_id).await;
}

pub async fn on_activate_default_reject(
	ue: &mut UeContext,
	services: &EsmServices,
	ebi: u8,
	cause: u8,
) {
	let Some(procedure_id) = active_procedure_for_ebi(ue, ebi) else {
		return;
	};
	warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, cause, "UE rejected its default EPS bearer, tearing session down");
	rollback_session(ue, ebi);
	services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::DeleteSession(gtp::DeleteSessionRequest { linked_ebi: ebi }));
	services.stats.record_pdn_connectivity_outcome(false);
	finish(ue, services, procedure_id).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.kind != ProcedureKind::PdnConnectivity || procedure.stage != STAGE_AWAITING_ACCEPT {
		return;
	}
	let default_ebi = procedure.ebi.expect("PDN Connectivity procedure always records its default EBI");
	let pti = procedure.pti.unwrap_or(0);
	let retry_count = procedure.retry_count;

	if retry_count + 1 >= RETRY_COUNTER_MAX {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Activate Default EPS Bearer Context retransmission limit reached");
		rollback_session(ue, default_ebi);
		services.request_session(
			ue.mme_ue_s1ap_id,
			procedure_id,
			EsmSessionRequest::DeleteSession(gtp::DeleteSessionRequest { linked_ebi: default_ebi }),
		);
		services.stats.record_pdn_connectivity_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(enb_key) = ue.enb_key else {
		return;
	};
	let pdn_type =
		ue.session_pool.pdn_context_owning_bearer(default_ebi).map(|pdn| pdn.pdn_type).unwrap_or(gtp::PdnType::Ipv4);
	let message = EsmMessage::ActivateDefaultEpsBearerContextRequest { ebi: default_ebi, pti, pdn_type, pco: None };
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &message);
	let timer = services.start_timer(services.config.configuration.timers.t3485, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
	}
}

fn rollback_session(
	ue: &mut UeContext,
	default_ebi: u8,
) {
	if let Some(context_id) = ue.session_pool.pdn_context_owning_bearer(default_ebi).map(|pdn| pdn.context_id) {
		ue.session_pool.remove_pdn_context(context_id);
	}
}

fn active_procedure_for_ebi(
	ue: &UeContext,
	ebi: u8,
) -> Option<ProcedureId> {
	ue.procedures
		.iter()
		.find(|p| p.kind == ProcedureKind::PdnConnectivity && p.ebi == Some(ebi) && !p.is_terminal())
		.map(|p| p.id)
}

fn set_stage(
	ue: &mut UeContext,
	procedure_id: ProcedureId,
	stage: u8,
) {
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.stage = stage;
	}
}

async fn finish(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
) {
	for procedure in ue.remove_procedure_cascade(procedure_id) {
		if let Some(handle) = procedure.timer {
			services.cancel_timer(handle).await;
		}
		ue.session_pool.esm_procedures.retain(|id| *id != procedure.id);
	}
}
