//! EPS Bearer Context Modification procedure (3GPP TS 24.301 §6.4.3, spec
//! §5.2): network-triggered QoS changes on one or more existing bearers,
//! arriving as a GTPv2-C Update Bearer Request and correlated back into one
//! aggregated Update Bearer Response. Grounded on
//! `original_source/component/oai-mme/src/nas/esm/esm_proc.h`'s
//! `esm_proc_modify_eps_bearer_context` declaration.

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

pub async fn on_network_triggered(
	ue: &mut UeContext,
	services: &EsmServices,
	request: gtp::UpdateBearerRequest,
) {
	let procedure_id = ue.allocate_procedure_id();
	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot modify a bearer with no eNB association");
		let response = gtp::UpdateBearerResponse { cause: gtp::Cause::SystemFailure, bearer_contexts: Vec::new() };
		services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::UpdateBearerResponse(response));
		return;
	};

	let mut procedure = Procedure::new(procedure_id, ProcedureKind::BearerModification, ue.mme_ue_s1ap_id, None);
	procedure.stage = STAGE_AWAITING_ACCEPT;

	for requested in &request.bearer_contexts {
		let ebi = requested.ebi;
		let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) else {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Update Bearer Request names an unknown EBI");
			procedure.bearer_outcomes.push((ebi, gtp::Cause::ContextNotFound));
			continue;
		};
		let Some(bearer) = pdn.bearer_mut(ebi) else {
			procedure.bearer_outcomes.push((ebi, gtp::Cause::ContextNotFound));
			continue;
		};
		if let Some(qci) = requested.qci {
			bearer.qos.qci = qci;
		}
		if let Some(arp) = requested.arp_priority_level {
			bearer.qos.arp_priority_level = arp;
		}
		if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::ModifyPending) {
			bearer.ebr_state = next;
		}
		services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EsmMessage::ModifyEpsBearerContextRequest { ebi });
		procedure.pending_ebis.push(ebi);
	}

	if procedure.pending_ebis.is_empty() {
		finalize(ue, services, procedure).await;
		return;
	}

	let timer = services.start_timer(services.config.configuration.timers.t3486, ue.mme_ue_s1ap_id, procedure_id).await;
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
		warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Modify EPS Bearer Context Accept for no in-flight modification");
		return;
	};
	settle_bearer(ue, ebi);
	record_outcome(ue, services, procedure_id, ebi, gtp::Cause::RequestAccepted).await;
}

pub async fn on_reject(
	ue: &mut UeContext,
	services: &EsmServices,
	ebi: u8,
	cause: u8,
) {
	let Some(procedure_id) = active_procedure_for_ebi(ue, ebi) else {
		return;
	};
	warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, cause, "UE rejected bearer modification");
	settle_bearer(ue, ebi);
	record_outcome(ue, services, procedure_id, ebi, gtp::Cause::Other(cause)).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EsmServices,
	procedure_id: ProcedureId,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.kind != ProcedureKind::BearerModification {
		return;
	}
	let retry_count = procedure.retry_count;
	let pending: Vec<u8> = procedure.pending_ebis.clone();
	let Some(enb_key) = ue.enb_key else {
		return;
	};

	if retry_count + 1 >= RETRY_COUNTER_MAX {
		for ebi in pending {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Modify EPS Bearer Context retransmission limit reached");
			settle_bearer(ue, ebi);
			if let Some(procedure) = ue.procedure_mut(procedure_id) {
				procedure.pending_ebis.retain(|pending_ebi| *pending_ebi != ebi);
				procedure.bearer_outcomes.push((ebi, gtp::Cause::NoResourcesAvailable));
			}
		}
		maybe_finalize(ue, services, procedure_id).await;
		return;
	}

	for ebi in pending {
		services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EsmMessage::ModifyEpsBearerContextRequest { ebi });
	}
	let timer = services.start_timer(services.config.configuration.timers.t3486, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
	}
}

/// Returns the bearer to `Active` once its modification round trip
/// settles, whichever way it settled.
fn settle_bearer(
	ue: &mut UeContext,
	ebi: u8,
) {
	if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
		if let Some(bearer) = pdn.bearer_mut(ebi) {
			if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::Active) {
				bearer.ebr_state = next;
			}
		}
	}
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
	let any_accepted = procedure.bearer_outcomes.iter().any(|(_, cause)| cause.is_accepted());
	let all_accepted = procedure.bearer_outcomes.iter().all(|(_, cause)| cause.is_accepted());
	let cause = if procedure.bearer_outcomes.is_empty() || all_accepted {
		gtp::Cause::RequestAccepted
	} else if any_accepted {
		gtp::Cause::RequestAcceptedPartially
	} else {
		gtp::Cause::NoResourcesAvailable
	};
	let bearer_contexts = procedure
		.bearer_outcomes
		.into_iter()
		.map(|(ebi, cause)| gtp::BearerContextIe { ebi, cause: Some(cause), ..Default::default() })
		.collect();
	let response = gtp::UpdateBearerResponse { cause, bearer_contexts };
	services.request_session(ue.mme_ue_s1ap_id, procedure.id, EsmSessionRequest::UpdateBearerResponse(response));
}

fn active_procedure_for_ebi(
	ue: &UeContext,
	ebi: u8,
) -> Option<ProcedureId> {
	ue.procedures
		.iter()
		.find(|p| p.kind == ProcedureKind::BearerModification && p.pending_ebis.contains(&ebi))
		.map(|p| p.id)
}
