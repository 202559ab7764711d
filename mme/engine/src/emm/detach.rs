//! Detach procedure (3GPP TS 24.301 §5.5.2, spec §5.2): UE-initiated
//! (switch-off or explicit) and network-initiated detach. Session/bearer
//! teardown triggered by a detach is the MME-application orchestrator's
//! concern (spec §4.7); this module only drives the NAS exchange and the
//! EMM FSM transition.

use tracing::warn;

use crate::{
	emm::{fsm, EmmServices},
	model::{
		procedure::{Procedure, ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
};

const T3422_MAX_RETRIES: u32 = 5;

/// UE-initiated Detach: no retransmission wait is needed, so this runs to
/// completion synchronously (spec §5.2's "switch-off detach gets no
/// accept at all; explicit detach gets one immediately").
pub async fn on_detach_request(
	ue: &mut UeContext,
	services: &EmmServices,
	switch_off: bool,
) {
	if let Err(err) = fsm::can_start_detach(ue.emm_state) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, %err, "Detach Request in a state that cannot start Detach");
		return;
	}

	services.stats.record_detach();
	ue.emm_state = fsm::on_detach_initiated();

	if !switch_off {
		if let Some(enb_key) = ue.enb_key {
			services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::DetachAccept);
		}
	}

	ue.emm_state = fsm::on_detach_completed();
	ue.procedures.clear();
}

/// The UE's reply to a network-initiated Detach Request started by
/// `start`.
pub async fn on_detach_accept(
	ue: &mut UeContext,
	services: &EmmServices,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Detach Accept with no network-initiated Detach in flight");
		return;
	};
	ue.emm_state = fsm::on_detach_completed();
	finish(ue, services, procedure_id).await;
}

/// Starts a network-initiated Detach (spec §4.7's implicit/explicit
/// network detach, invoked by `mme_app`, e.g. on an HSS Cancel Location).
pub async fn start(
	ue: &mut UeContext,
	services: &EmmServices,
	cause: u8,
	reattach_required: bool,
) -> Option<ProcedureId> {
	if fsm::can_start_detach(ue.emm_state).is_err() {
		return None;
	}
	let procedure_id = ue.allocate_procedure_id();
	ue.procedures.push(Procedure::new(procedure_id, ProcedureKind::Detach, ue.mme_ue_s1ap_id, None));
	ue.emm_state = fsm::on_detach_initiated();
	services.stats.record_detach();

	let Some(enb_key) = ue.enb_key else {
		ue.emm_state = fsm::on_detach_completed();
		finish(ue, services, procedure_id).await;
		return None;
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::NetworkDetachRequest { cause, reattach_required });
	let timer = services.start_timer(services.config.configuration.timers.t3422, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
	}
	Some(procedure_id)
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	let Some(procedure) = ue.procedure(procedure_id) else {
		return;
	};
	if procedure.retry_count + 1 >= T3422_MAX_RETRIES {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "network-initiated Detach retransmission limit reached, completing locally");
		ue.emm_state = fsm::on_detach_completed();
		finish(ue, services, procedure_id).await;
		return;
	}
	let Some(enb_key) = ue.enb_key else {
		return;
	};
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::NetworkDetachRequest { cause: 2, reattach_required: false },
	);
	let timer = services.start_timer(services.config.configuration.timers.t3422, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
		procedure.retry_count += 1;
	}
}

/// Detach does not nest common procedures in this design — the UE is
/// already leaving — so this is a defensive log-only no-op.
pub async fn resume(
	ue: &mut UeContext,
	_services: &EmmServices,
	_procedure_id: ProcedureId,
	child_kind: ProcedureKind,
	outcome: ProcedureOutcome,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, ?child_kind, ?outcome, "unexpected common procedure nested under Detach");
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
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::Detach && !p.is_terminal()).map(|p| p.id)
}
