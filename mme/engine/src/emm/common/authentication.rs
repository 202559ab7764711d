//! Authentication procedure (3GPP TS 24.301 §5.4.2): fetches or replays a
//! cached vector, sends Authentication Request, and on a matching RES
//! derives the security context Security Mode Control goes on to activate.

use tracing::warn;

use crate::{
	emm::{common, EmmServices},
	model::{
		procedure::{ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
	s6a::{AuthenticationInformationRequest, S6aError, MAX_EPS_AUTH_VECTORS},
};

/// Starts Authentication nested under `parent_id`, fetching a fresh vector
/// batch from the HSS if none is cached (spec §4.7). Returns `None` (and
/// leaves the FSM untouched) if the context lacks what a request needs.
pub async fn start(
	ue: &mut UeContext,
	services: &EmmServices,
	parent_id: ProcedureId,
) -> Option<ProcedureId> {
	let Some(imsi) = ue.imsi.clone() else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot authenticate a UE context with no IMSI");
		return None;
	};
	let Some(plmn) = ue.emm_data.serving_plmn.clone() else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot authenticate a UE context with no serving PLMN");
		return None;
	};

	if ue.emm_data.security_context.unused_auth_vectors.is_empty() {
		let request = AuthenticationInformationRequest {
			imsi,
			visited_plmn_id: plmn,
			requested_vectors: MAX_EPS_AUTH_VECTORS as u8,
		};
		match services.hss.authentication_information(request).await {
			Ok(answer) => ue.emm_data.security_context.unused_auth_vectors = answer.vectors,
			Err(S6aError::DiameterError(code)) => {
				warn!(ue_id = %ue.mme_ue_s1ap_id, code, "HSS rejected authentication information request");
				return None;
			}
			Err(S6aError::Unreachable) => {
				warn!(ue_id = %ue.mme_ue_s1ap_id, "HSS unreachable fetching authentication vectors");
				return None;
			}
		}
	}
	if ue.emm_data.security_context.unused_auth_vectors.is_empty() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "HSS returned no authentication vectors");
		return None;
	}

	let vector = ue.emm_data.security_context.unused_auth_vectors.remove(0);
	let id = common::begin(ue, parent_id, ProcedureKind::Authentication).ok()?;
	ue.emm_data.security_context.pending_vector = Some(vector.clone());

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Authentication Request with no eNB association");
		return Some(id);
	};
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::AuthenticationRequest { rand: vector.rand, autn: vector.autn },
	);
	let timer = services.start_timer(services.config.configuration.timers.t3460, ue.mme_ue_s1ap_id, id).await;
	if let Some(procedure) = ue.procedure_mut(id) {
		procedure.timer = Some(timer);
	}
	Some(id)
}

pub async fn on_authentication_response(
	ue: &mut UeContext,
	services: &EmmServices,
	res: Vec<u8>,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Authentication Response with no Authentication procedure in flight");
		return;
	};
	let Some(vector) = ue.emm_data.security_context.pending_vector.take() else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Authentication Response with no pending vector");
		return;
	};
	let outcome = if res == vector.xres {
		ue.emm_data.security_context.kasme = Some(vector.kasme);
		ue.emm_data.security_context.ksi = Some(next_ksi(ue.emm_data.security_context.ksi));
		ProcedureOutcome::Success
	} else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Authentication Response RES mismatch");
		ProcedureOutcome::Failure
	};
	complete(ue, services, procedure_id, outcome).await;
}

pub async fn on_authentication_failure(
	ue: &mut UeContext,
	services: &EmmServices,
	cause: u8,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, cause, "UE reported Authentication Failure");
	ue.emm_data.security_context.pending_vector = None;
	if let Some(procedure_id) = active_procedure(ue) {
		complete(ue, services, procedure_id, ProcedureOutcome::Failure).await;
	}
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "Authentication Request timed out (T3460)");
	ue.emm_data.security_context.pending_vector = None;
	complete(ue, services, procedure_id, ProcedureOutcome::Timeout).await;
}

fn active_procedure(ue: &UeContext) -> Option<ProcedureId> {
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::Authentication && !p.is_terminal()).map(|p| p.id)
}

/// KSI cycles through the 0..=6 range TS 24.301 reserves for "a key is
/// available"; 7 is "no key available" and is never assigned here.
fn next_ksi(current: Option<u8>) -> u8 {
	current.map_or(0, |ksi| (ksi + 1) % 7)
}

async fn complete(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
	outcome: ProcedureOutcome,
) {
	if let Some(finished) = common::finish(ue, services, procedure_id, outcome).await {
		common::resume_parent(ue, services, &finished).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ksi_cycles_within_reserved_range() {
		assert_eq!(next_ksi(None), 0);
		assert_eq!(next_ksi(Some(6)), 0);
		assert_eq!(next_ksi(Some(2)), 3);
	}
}
