//! Attach procedure (3GPP TS 24.301 §5.5.1, spec §5.1): establishes an EMM
//! context and, through its embedded ESM container, the UE's initial
//! default PDN connection. Nested common procedures and the ESM
//! round-trip advance one root `Procedure` record through `procedure.stage`
//! rather than a dedicated sub-state enum (see `model::procedure::Procedure`).

use itti::{Priority, TaskId};
use tracing::{debug, warn};

use crate::{
	emm::{common, fsm, EmmServices},
	messages::{AppMessage, EsmBusMessage},
	model::{
		procedure::{Procedure, ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::{EmmMessage, EpsAttachType, EsmMessage},
};

/// 3GPP TS 24.301 §5.5.1.2.6: Attach Accept is retransmitted up to four
/// times (five transmissions total) before the network tears the context
/// down locally.
const ATTACH_COUNTER_MAX: u32 = 5;

const STAGE_IDENTIFYING: u8 = 1;
const STAGE_AUTHENTICATING: u8 = 2;
const STAGE_SECURING: u8 = 3;
const STAGE_ESM: u8 = 4;
const STAGE_ACCEPTED: u8 = 5;

pub async fn on_attach_request(
	ue: &mut UeContext,
	services: &EmmServices,
	message: EmmMessage,
) {
	let EmmMessage::AttachRequest { imsi, guti: _, has_security_context: _, attach_type, imeisv, esm_container } = message else {
		return;
	};
	ue.num_attach_request += 1;
	services.stats.record_attach_attempt();

	// spec §4.5 step 1 / §8 testable boundary.
	if attach_type == EpsAttachType::Emergency && !services.config.configuration.eps_network_feature_support.emergency_bearer_support {
		let cause = if imeisv.is_some() { IMEI_NOT_ACCEPTED_CAUSE } else { NOT_AUTHORIZED_FOR_THIS_PLMN_CAUSE };
		warn!(ue_id = %ue.mme_ue_s1ap_id, cause, "rejecting emergency Attach Request, emergency bearer support disabled");
		send_reject(ue, services, cause).await;
		services.stats.record_attach_outcome(false);
		return;
	}

	if let Some(imeisv) = imeisv {
		ue.imeisv = Some(imeisv);
	}

	// spec §4.5 step 2's Attach collision decision table. `mme_app` has
	// already resolved this request onto an existing context (by GUTI,
	// then IMSI) before routing it here, so a non-terminal Attach found now
	// means a genuine collision, not a fresh attacher.
	if let Some(procedure_id) = active_procedure(ue) {
		let stage = ue.procedure(procedure_id).map(|p| p.stage).unwrap_or(0);
		if stage == STAGE_ACCEPTED {
			let matches = ue.procedure(procedure_id).and_then(|p| p.pending_esm_container.as_ref()) == Some(&esm_container);
			if matches {
				debug!(ue_id = %ue.mme_ue_s1ap_id, "duplicate Attach Request after Attach Accept, retransmitting bit-identical");
				retransmit_attach_accept(ue, services, procedure_id).await;
				return;
			}
			warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach Request with differing IEs supersedes an already-accepted Attach, aborting it");
		} else {
			warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach Request collides with a common procedure already nested under Attach, aborting it");
		}
		for procedure in ue.remove_procedure_cascade(procedure_id) {
			if let Some(handle) = procedure.timer {
				services.cancel_timer(handle).await;
			}
		}
		ue.emm_state = fsm::on_implicit_detach();
	}

	if let Err(err) = fsm::can_start_attach(ue.emm_state) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, %err, "Attach Request against an existing REGISTERED context, implicitly detaching and continuing");
		ue.emm_state = fsm::on_implicit_detach();
	}

	if let Some(imsi) = imsi {
		ue.imsi = Some(imsi);
	}

	let procedure_id = ue.allocate_procedure_id();
	let mut procedure = Procedure::new(procedure_id, ProcedureKind::Attach, ue.mme_ue_s1ap_id, None);
	procedure.pending_esm_container = Some(esm_container);
	ue.procedures.push(procedure);

	advance(ue, services, procedure_id).await;
}

/// Drives the Attach procedure forward by exactly one step: identify,
/// authenticate, secure, forward the ESM container, or (once all of those
/// are satisfied) wait — called both right after the request arrives and
/// every time a nested procedure reports back via `resume`.
async fn advance(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	let Some(stage) = ue.procedure(procedure_id).map(|p| p.stage) else {
		return;
	};

	if ue.imsi.is_none() {
		if stage < STAGE_IDENTIFYING && common::identification::start(ue, services, procedure_id).await.is_some() {
			set_stage(ue, procedure_id, STAGE_IDENTIFYING);
		}
		return;
	}

	if ue.emm_data.security_context.kasme.is_none() {
		if stage < STAGE_AUTHENTICATING && common::authentication::start(ue, services, procedure_id).await.is_some() {
			set_stage(ue, procedure_id, STAGE_AUTHENTICATING);
		}
		return;
	}

	if stage < STAGE_SECURING {
		let eea = services.config.configuration.security.eea_order.first().copied().unwrap_or(0);
		let eia = services.config.configuration.security.eia_order.first().copied().unwrap_or(0);
		if common::security_mode_control::start(ue, services, procedure_id, eea, eia).await.is_some() {
			set_stage(ue, procedure_id, STAGE_SECURING);
		}
		return;
	}

	if stage < STAGE_ESM {
		let Some(esm_container) = ue.procedure_mut(procedure_id).and_then(|p| p.pending_esm_container.take()) else {
			warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach procedure missing its ESM container");
			return;
		};
		set_stage(ue, procedure_id, STAGE_ESM);
		if let Err(err) = services.bus.send(
			TaskId::Emm,
			TaskId::Esm,
			0,
			Priority::Normal,
			AppMessage::Esm(EsmBusMessage::EmmTriggered { ue_id: ue.mme_ue_s1ap_id, procedure_id, esm_message: esm_container }),
		) {
			warn!(%err, "failed to forward Attach's ESM container to the ESM task");
		}
	}
	// stage == STAGE_ESM: waiting on `on_esm_container_ready`.
	// stage == STAGE_ACCEPTED: waiting on Attach Complete or T3450.
}

/// ESM's answer to the container this procedure forwarded at `STAGE_ESM`
/// (spec §4.1: EMM and ESM exchange the container over the bus, not a
/// direct call).
pub async fn on_esm_container_ready(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
	esm_message: EsmMessage,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.kind != ProcedureKind::Attach || procedure.stage != STAGE_ESM {
		return;
	}

	if matches!(esm_message, EsmMessage::PdnConnectivityReject { .. }) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "PDN Connectivity rejected during Attach, rejecting Attach");
		send_reject(ue, services, ESM_FAILURE_CAUSE).await;
		ue.emm_state = fsm::on_attach_rejected();
		services.stats.record_attach_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Attach Accept with no eNB association");
		return;
	};
	let guti = ue.emm_data.guti.clone();
	let tai_list = ue.current_tai.clone().into_iter().collect::<Vec<_>>();
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::AttachAccept { guti, tai_list, esm_container: esm_message.clone() },
	);
	set_stage(ue, procedure_id, STAGE_ACCEPTED);
	let timer = services.start_timer(services.config.configuration.timers.t3450, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count = 0;
		// Kept for T3450 retransmission (on_timeout), not a fresh request.
		procedure.pending_esm_container = Some(esm_message);
	}
}

pub async fn on_attach_complete(
	ue: &mut UeContext,
	services: &EmmServices,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach Complete with no Attach procedure in flight");
		return;
	};
	ue.emm_state = fsm::on_attach_accepted();
	services.stats.record_attach_outcome(true);
	finish(ue, services, procedure_id).await;
}

/// Called by `emm::common::resume_parent` when a nested common procedure
/// (Identification/Authentication/Security Mode Control) this Attach
/// started has finished.
pub async fn resume(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
	child_kind: ProcedureKind,
	outcome: ProcedureOutcome,
) {
	if outcome != ProcedureOutcome::Success {
		warn!(ue_id = %ue.mme_ue_s1ap_id, ?child_kind, ?outcome, "Attach-nested common procedure did not succeed, rejecting Attach");
		send_reject(ue, services, cause_for(child_kind)).await;
		ue.emm_state = fsm::on_attach_rejected();
		services.stats.record_attach_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}
	advance(ue, services, procedure_id).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.stage != STAGE_ACCEPTED {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach timed out before reaching Accept, aborting");
		ue.emm_state = fsm::on_attach_rejected();
		services.stats.record_attach_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}

	let retry_count = procedure.retry_count;
	if retry_count + 1 >= ATTACH_COUNTER_MAX {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Attach Accept retransmission limit reached, implicit detach");
		ue.emm_state = fsm::on_implicit_detach();
		services.stats.record_attach_outcome(false);
		finish(ue, services, procedure_id).await;
		return;
	}

	if retransmit_attach_accept(ue, services, procedure_id).await {
		if let Some(procedure) = ue.procedure_mut(procedure_id) {
			procedure.retry_count += 1;
		}
	}
}

/// Re-sends the cached Attach Accept bit-identical and restarts T3450
/// (spec §5.1 step 7/8's retransmission path and §8 scenario 2: "Attach
/// Accept re-sent bit-identical, T3450 reset"). Shared by a T3450 timeout
/// (which increments `retry_count` itself) and a duplicate Attach Request
/// at `STAGE_ACCEPTED` (which must leave `retry_count` untouched per spec
/// §8's idempotence property).
async fn retransmit_attach_accept(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) -> bool {
	let Some(enb_key) = ue.enb_key else {
		return false;
	};
	let guti = ue.emm_data.guti.clone();
	let tai_list = ue.current_tai.clone().into_iter().collect::<Vec<_>>();
	let Some(esm_container) = ue.procedure(procedure_id).and_then(|p| p.pending_esm_container.clone()) else {
		return false;
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::AttachAccept { guti, tai_list, esm_container });

	let old_timer = ue.procedure(procedure_id).and_then(|p| p.timer);
	if let Some(handle) = old_timer {
		services.cancel_timer(handle).await;
	}
	let timer = services.start_timer(services.config.configuration.timers.t3450, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
	}
	true
}

/// Generic EMM cause used when a nested common procedure fails; the exact
/// 3GPP cause value is a NAS IE encoding concern the codec seam owns.
const ESM_FAILURE_CAUSE: u8 = 19; // ESM failure
const PROTOCOL_ERROR_CAUSE: u8 = 111; // protocol error, unspecified
const IMEI_NOT_ACCEPTED_CAUSE: u8 = 5; // IMEI not accepted
const NOT_AUTHORIZED_FOR_THIS_PLMN_CAUSE: u8 = 11; // PLMN not allowed

fn cause_for(_kind: ProcedureKind) -> u8 {
	PROTOCOL_ERROR_CAUSE
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

async fn send_reject(
	ue: &UeContext,
	services: &EmmServices,
	cause: u8,
) {
	let Some(enb_key) = ue.enb_key else {
		return;
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::AttachReject { cause });
}

async fn finish(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	for procedure in ue.remove_procedure_cascade(procedure_id) {
		if let Some(handle) = procedure.timer {
			services.cancel_timer(handle).await;
		}
	}
}

fn active_procedure(ue: &UeContext) -> Option<ProcedureId> {
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::Attach && !p.is_terminal()).map(|p| p.id)
}
