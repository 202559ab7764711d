//! Dedicated Bearer Activation procedure (3GPP TS 24.301 §6.4.2, spec
//! §5.2): network-triggered, arrives from the SGW/PGW as a GTPv2-C Create
//! Bearer Request naming one or more new dedicated bearers, each of which
//! gets its own Activate Dedicated EPS Bearer Context Request/Accept/Reject
//! NAS exchange, correlated back into one aggregated Create Bearer
//! Response. Grounded on
//! `original_source/component/oai-mme/src/nas/esm/esm_proc.h`'s
//! `esm_proc_dedicated_eps_bearer_context` declaration.

use tracing::warn;

use crate::{
	esm::{bearer_state, EsmServices},
	messages::EsmSessionRequest,
	model::{
		bearer_context::{BearerContext, BearerQos, EsmEbrState},
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
	request: gtp::CreateBearerRequest,
) {
	let procedure_id = ue.allocate_procedure_id();

	let Some(pdn_context_id) = ue.session_pool.pdn_context_owning_bearer(request.linked_ebi).map(|pdn| pdn.context_id)
	else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, linked_ebi = request.linked_ebi, "Create Bearer Request names an unknown PDN connection");
		let response = gtp::CreateBearerResponse { cause: gtp::Cause::ContextNotFound, bearer_contexts: Vec::new() };
		services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::CreateBearerResponse(response));
		return;
	};

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot activate a dedicated bearer with no eNB association");
		let response = gtp::CreateBearerResponse { cause: gtp::Cause::SystemFailure, bearer_contexts: Vec::new() };
		services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::CreateBearerResponse(response));
		return;
	};

	let mut procedure = Procedure::new(procedure_id, ProcedureKind::BearerActivation, ue.mme_ue_s1ap_id, None);
	procedure.ebi = Some(request.linked_ebi);
	procedure.stage = STAGE_AWAITING_ACCEPT;

	for requested in &request.bearer_contexts {
		let qos = BearerQos {
			qci: requested.qci.unwrap_or(9),
			arp_priority_level: requested.arp_priority_level.unwrap_or(8),
			arp_preemption_capability: false,
			arp_preemption_vulnerability: false,
		};
		match ue.session_pool.allocate_bearer_ebi() {
			Ok(ebi) => {
				let mut bearer = BearerContext::new_dedicated(ebi, request.linked_ebi, pdn_context_id, qos);
				bearer.ebr_state = bearer_state::transition(EsmEbrState::Inactive, EsmEbrState::ActivePending).unwrap();
				if let Some(pdn) = ue.session_pool.pdn_context_mut(pdn_context_id) {
					pdn.add_dedicated_bearer(bearer);
				}
				services.send_downlink_nas(
					enb_key,
					ue.mme_ue_s1ap_id,
					&EsmMessage::ActivateDedicatedEpsBearerContextRequest { ebi, linked_ebi: request.linked_ebi },
				);
				procedure.pending_ebis.push(ebi);
			}
			Err(_) => {
				warn!(ue_id = %ue.mme_ue_s1ap_id, "no free EBI to activate another dedicated bearer, marking it failed");
				procedure.bearer_outcomes.push((0, gtp::Cause::NoResourcesAvailable));
			}
		}
	}

	if procedure.pending_ebis.is_empty() {
		finalize(ue, services, procedure).await;
		return;
	}

	let timer = services.start_timer(services.config.configuration.timers.t3485, ue.mme_ue_s1ap_id, procedure_id).await;
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
		warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Activate Dedicated EPS Bearer Context Accept for no in-flight activation");
		return;
	};
	if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
		if let Some(bearer) = pdn.bearer_mut(ebi) {
			if let Ok(next) = bearer_state::transition(bearer.ebr_state, EsmEbrState::Active) {
				bearer.ebr_state = next;
			}
		}
	}
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
	warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, cause, "UE rejected dedicated bearer activation");
	if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
		let _ = pdn.remove_bearer(ebi);
	}
	ue.session_pool.release_bearer_ebi(ebi);
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
	if procedure.kind != ProcedureKind::BearerActivation {
		return;
	}
	let linked_ebi = procedure.ebi.unwrap_or(0);
	let retry_count = procedure.retry_count;
	let pending: Vec<u8> = procedure.pending_ebis.clone();
	let Some(enb_key) = ue.enb_key else {
		return;
	};

	if retry_count + 1 >= RETRY_COUNTER_MAX {
		for ebi in pending {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ebi, "Activate Dedicated EPS Bearer Context retransmission limit reached");
			if let Some(pdn) = ue.session_pool.pdn_context_owning_bearer_mut(ebi) {
				let _ = pdn.remove_bearer(ebi);
			}
			ue.session_pool.release_bearer_ebi(ebi);
			if let Some(procedure) = ue.procedure_mut(procedure_id) {
				procedure.pending_ebis.retain(|pending_ebi| *pending_ebi != ebi);
				procedure.bearer_outcomes.push((ebi, gtp::Cause::NoResourcesAvailable));
			}
		}
		maybe_finalize(ue, services, procedure_id).await;
		return;
	}

	for ebi in pending {
		services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EsmMessage::ActivateDedicatedEpsBearerContextRequest { ebi, linked_ebi });
	}
	let timer = services.start_timer(services.config.configuration.timers.t3485, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
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
	let response = gtp::CreateBearerResponse { cause, bearer_contexts };
	services.request_session(ue.mme_ue_s1ap_id, procedure.id, EsmSessionRequest::CreateBearerResponse(response));
}

fn active_procedure_for_ebi(
	ue: &UeContext,
	ebi: u8,
) -> Option<ProcedureId> {
	ue.procedures
		.iter()
		.find(|p| p.kind == ProcedureKind::BearerActivation && p.pending_ebis.contains(&ebi))
		.map(|p| p.id)
}
