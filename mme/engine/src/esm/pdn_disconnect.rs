//! PDN Disconnect procedure (3GPP TS 24.301 §6.5.4, spec §5.2): tears down
//! a PDN connection the UE no longer needs, in lock-step with deleting its
//! S11 session and deactivating its default bearer over the air. Grounded
//! on `original_source/component/oai-mme/src/nas/esm/esm_proc.h`'s
//! `esm_proc_pdn_disconnect_request` declaration.

use tracing::warn;

use crate::{
	emm::fsm,
	esm::{reply, EsmServices},
	messages::{EsmSessionRequest, GtpSessionEvent},
	model::{
		procedure::{Procedure, ProcedureId, ProcedureKind},
		ue_context::UeContext,
	},
	nas::EsmMessage,
};

/// Mirrors `pdn_connectivity`'s T3495 retransmission counter: five
/// transmissions total before the network gives up and tears the bearer
/// down locally anyway.
const RETRY_COUNTER_MAX: u32 = 5;

const STAGE_AWAITING_SESSION: u8 = 1;
const STAGE_AWAITING_ACCEPT: u8 = 2;

const CAUSE_UNKNOWN_EPS_BEARER_CONTEXT: u8 = 43;
const CAUSE_REGULAR_DEACTIVATION: u8 = 36;

pub async fn on_request(
	ue: &mut UeContext,
	services: &EsmServices,
	message: EsmMessage,
) {
	let EsmMessage::PdnDisconnectRequest { pti, linked_ebi } = message else {
		return;
	};

	if ue.session_pool.pdn_context_owning_bearer(linked_ebi).is_none() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, linked_ebi, "PDN Disconnect Request names an unknown EPS bearer context");
		reply(ue, services, None, EsmMessage::PdnDisconnectReject { pti, cause: CAUSE_UNKNOWN_EPS_BEARER_CONTEXT }).await;
		return;
	}

	let procedure_id = ue.allocate_procedure_id();
	let mut procedure = Procedure::new(procedure_id, ProcedureKind::PdnDisconnect, ue.mme_ue_s1ap_id, None);
	procedure.pti = Some(pti);
	procedure.ebi = Some(linked_ebi);
	procedure.stage = STAGE_AWAITING_SESSION;
	ue.procedures.push(procedure);
	ue.session_pool.esm_procedures.push(procedure_id);

	services
		.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::DeleteSession(gtp::DeleteSessionRequest { linked_ebi }));
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
	if procedure.kind != ProcedureKind::PdnDisconnect || procedure.stage != STAGE_AWAITING_SESSION {
		return;
	}
	let GtpSessionEvent::DeleteSessionResponse(response) = event else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "unexpected session event awaiting Delete Session Response");
		return;
	};
	let pti = procedure.pti.unwrap_or(0);
	let linked_ebi = procedure.ebi.expect("PDN Disconnect procedure always records its linked EBI");

	if !response.cause.is_accepted() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, cause = ?response.cause, "SGW rejected Delete Session Request");
		reply(ue, services, None, EsmMessage::PdnDisconnectReject { pti, cause: CAUSE_REGULAR_DEACTIVATION }).await;
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(enb_key) = ue.enb_key else {
		remove_pdn(ue, linked_ebi);
		finish(ue, services, procedure_id).await;
		return;
	};
	let deactivate = EsmMessage::DeactivateEpsBearerContextRequest { ebi: linked_ebi, cause: CAUSE_REGULAR_DEACTIVATION };
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &deactivate);
	set_stage(ue, procedure_id, STAGE_AWAITING_ACCEPT);
	let timer = services.start_timer(services.config.configuration.timers.t3495, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
	}
}

pub async fn on_deactivate_accept(
	ue: &mut UeContext,
	services: &EsmServices,
	ebi: u8,
) {
	let Some(procedure_id) = active_procedure_for_ebi(ue, ebi) else {
		return;
	};
	remove_pdn(ue, ebi);
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
	if procedure.kind != ProcedureKind::PdnDisconnect || procedure.stage != STAGE_AWAITING_ACCEPT {
		return;
	}
	let linked_ebi = procedure.ebi.expect("PDN Disconnect procedure always records its linked EBI");
	let retry_count = procedure.retry_count;

	if retry_count + 1 >= RETRY_COUNTER_MAX {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Deactivate EPS Bearer Context retransmission limit reached, removing locally");
		remove_pdn(ue, linked_ebi);
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(enb_key) = ue.enb_key else {
		return;
	};
	let deactivate = EsmMessage::DeactivateEpsBearerContextRequest { ebi: linked_ebi, cause: CAUSE_REGULAR_DEACTIVATION };
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &deactivate);
	let timer = services.start_timer(services.config.configuration.timers.t3495, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
	}
}

/// Frees the PDN context owning `linked_ebi` and, if that was the UE's last
/// one, detaches it locally (spec §8 scenario 6: "because it was the last,
/// UE is detached, subscription data freed") — mirrors `emm::detach`'s
/// network-initiated-without-explicit-NAS path, since there is no PDN
/// connection left for the UE to be usefully attached with.
fn remove_pdn(
	ue: &mut UeContext,
	linked_ebi: u8,
) {
	if let Some(context_id) = ue.session_pool.pdn_context_owning_bearer(linked_ebi).map(|pdn| pdn.context_id) {
		ue.session_pool.remove_pdn_context(context_id);
	}
	if ue.session_pool.pdn_contexts().next().is_none() {
		ue.emm_state = fsm::on_detach_completed();
		ue.subscription_data = None;
	}
}

fn active_procedure_for_ebi(
	ue: &UeContext,
	ebi: u8,
) -> Option<ProcedureId> {
	ue.procedures
		.iter()
		.find(|p| p.kind == ProcedureKind::PdnDisconnect && p.ebi == Some(ebi) && !p.is_terminal())
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
