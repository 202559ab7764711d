//! EPS Bearer Context Deactivation procedure (3GPP TS 24.301 §6.4.4, spec
//! §5.2): network-triggered teardown of one or more existing bearers,
//! arriving as a GTPv2-C Delete Bearer Request or Delete Bearer Command and
//! correlated back into one aggregated Delete Bearer Response. Grounded on
//! `original_source/component/oai-mme/src/nas/esm/EpsBearerContextDeactivation.c`.

use tracing::warn;

use crate::{
	esm::{bearer_state, EsmServices},
	messages::EsmSessionRequest,
	model::{
		bearer_context::EsmEbrState,
		procedure::{Procedure, ProcedureId, ProcedureKind},
		ue_context::UeContext,
	},
	nas::EsmMessage,
};

const RETRY_COUNTER_MAX: u32 = 5;
const STAGE_AWAITING_ACCEPT: u8 = 1;
const CAUSE_REGULAR_DEACTIVATION: u8 = 36;

pub async fn on_network_triggered(
	ue: &mut UeContext,
	services: &EsmServices,
	ebis: Vec<u8>,
) {
	let procedure_id = ue.allocate_procedure_id();
	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot deactivate a bearer with no eNB association");
		let response = gtp::DeleteBearerResponse { cause: gtp::Cause::SystemFailure, bearer_contexts: Vec::new() };
		services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::DeleteBearerResponse(response));
		return;
	};

	let mut procedure = Procedure::new(procedure_id, ProcedureKind::BearerDeactivation, ue.mme_ue_s1ap_id, None);
	procedure.stage = STAGE_AWAITING_ACCEPT;

	for ebi in ebis {
		let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) else {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Delete Bearer Request names an unknown EBI");
			procedure.bearer_outcomes.push((ebi, gtp::Cause::ContextNotFound));
			continue;
		};
		if ebi == pdn.default_ebi {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "refusing to deactivate a default bearer through this procedure");
			procedure.bearer_outcomes.push((ebi, gtp::Cause::InvalidMessageFormat));
			continue;
		}
		if let Some(bearer) = pdn.bearer_mut(ebi) {
			if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::InactivePending) {
				bearer.ebr_state = next;
			}
		}
		services.send_downlink_nas(
			enb_key,
			ue.mme_ue_s1ap_id,
			&EsmMessage::DeactivateEpsBearerContextRequest { ebi, cause: CAUSE_REGULAR_DEACTIVATION },
		);
		procedure.pending_ebis.push(ebi);
	}

	if procedure.pending_ebis.is_empty() {
		finalize(ue, services, procedure).await;
		return;
	}

	let timer = services.start_timer(services.config.configuration.timers.t3495, ue.mme_ue_s1ap_id, procedure_id).await;
	procedure.timer = Some(timer);
	ue.procedures.push(procedure);
	ue.session_pool.esm_procedures.push(procedure_id);
}

pub async fn on_accept(
	ue: &mut UeContext,
	services: &EsmServices,
	ebi: u8,
) {
	let Some(procedure_id) = active_procedure_for_ebi(ue, ebi) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Deactivate EPS Bearer Context Accept for no in-flight deactivation");
		return;
	};
	remove_bearer(ue, ebi);
	record_outcome(ue, services, procedure_id, ebi, gtp::Cause::RequestAccepted).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.kind != ProcedureKind::BearerDeactivation {
		return;
	}
	let retry_count = procedure.retry_count;
	let pending: Vec<u8> = procedure.pending_ebis.clone();
	let Some(enb_key) = ue.enb_key else {
		return;
	};

	if retry_count + 1 >= RETRY_COUNTER_MAX {
		for ebi in pending {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Deactivate EPS Bearer Context retransmission limit reached, removing locally");
			remove_bearer(ue, ebi);
			if let Some(procedure) = ue.procedure_mut(procedure_id) {
				procedure.pending_ebis.retain(|pending_ebi| *pending_ebi != ebi);
				procedure.bearer_outcomes.push((ebi, gtp::Cause::RequestAccepted));
			}
		}
		maybe_finalize(ue, services, procedure_id).await;
		return;
	}

	for ebi in pending {
		services.send_downlink_nas(
			enb_key,
			ue.mme_ue_s1ap_id,
			&EsmMessage::DeactivateEpsBearerContextRequest { ebi, cause: CAUSE_REGULAR_DEACTIVATION },
		);
	}
	let timer = services.start_timer(services.config.configuration.timers.t3495, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
	}
}

fn remove_bearer(
	ue: &mut UeContext,
	ebi: u8,
) {
	if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
		let _ = pdn.remove_bearer(ebi);
	}
	ue.session_pool.release_bearer_ebi(ebi);
}

async fn record_outcome(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
	ebi: u8,
	cause: gtp::Cause,
) {
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.pending_ebis.retain(|pending_ebi| *pending_ebi != ebi);
		procedure.bearer_outcomes.push((ebi, cause));
	}
	maybe_finalize(ue, services, procedure_id).await;
}

async fn maybe_finalize(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
) {
	let done = ue.procedure(procedure_id).is_some_and(|p| p.pending_ebis.is_empty());
	if !done {
		return;
	}
	let Some(index) = ue.procedures.iter().position(|p| p.id == procedure_id) else {
		return;
	};
	let procedure = ue.procedures.remove(index);
	finalize(ue, services, procedure).await;
}

async fn finalize(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure: Procedure,
) {
	ue.session_pool.esm_procedures.retain(|id| *id != procedure.id);
	if let Some(handle) = procedure.timer {
		services.cancel_timer(handle).await;
	}
	let cause = if procedure.bearer_outcomes.iter().any(|(_, cause)| cause.is_accepted()) {
		gtp::Cause::RequestAccepted
	} else {
		gtp::Cause::RequestAcceptedPartially
	};
	let bearer_contexts = procedure
		.bearer_outcomes
		.into_iter()
		.map(|(ebi, cause)| gtp::BearerContextIe { ebi, cause: Some(cause), ..Default::default() })
		.collect();
	let response = gtp::DeleteBearerResponse { cause, bearer_contexts };
	services.request_session(ue.mme_ue_s1ap_id, procedure.id, EsmSessionRequest::DeleteBearerResponse(response));
}

fn active_procedure_for_ebi(
	ue: &UeContext,
	ebi: u8,
) -> Option<ProcedureId> {
	ue.procedures
		.iter()
		.find(|p| p.kind == ProcedureKind::BearerDeactivation && p.pending_ebis.contains(&ebi))
		.map(|p| p.id)
}
