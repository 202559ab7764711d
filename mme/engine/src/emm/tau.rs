//! Tracking Area Update procedure (3GPP TS 24.301 §5.5.3, spec §5.3):
//! re-authenticates when the UE arrives without a usable security context,
//! then answers with a TAU Accept that may carry a freshly allocated GUTI
//! inline (no separate GUTI Reallocation Command, unlike Attach).

use tracing::warn;

use crate::{
	emm::{common, common::guti_reallocation, fsm, EmmServices},
	model::{
		ids::Guti,
		procedure::{Procedure, ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
};

const STAGE_AUTHENTICATING: u8 = 1;
const STAGE_ACCEPTED: u8 = 2;

pub async fn on_tau_request(
	ue: &mut UeContext,
	services: &EmmServices,
	guti: Guti,
	active_flag: bool,
	has_security_context: bool,
) {
	if active_procedure(ue).is_some() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Tracking Area Update Request retransmission while TAU is already in progress");
		return;
	}
	if let Err(err) = fsm::can_start_tau(ue.emm_state) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, %err, "Tracking Area Update Request outside Registered, rejecting");
		send_reject(ue, services, ILLEGAL_UE_CAUSE).await;
		return;
	}

	services.stats.record_tau();
	ue.emm_data.guti = Some(guti);
	// Bearer reactivation implied by `active_flag` is the MME-application
	// orchestrator's concern (spec §4.7), out of scope for the NAS exchange.
	let _ = active_flag;

	let procedure_id = ue.allocate_procedure_id();
	ue.procedures.push(Procedure::new(procedure_id, ProcedureKind::TrackingAreaUpdate, ue.mme_ue_s1ap_id, None));
	if !has_security_context {
		ue.emm_data.security_context.kasme = None;
	}
	advance(ue, services, procedure_id).await;
}

async fn advance(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	let Some(stage) = ue.procedure(procedure_id).map(|p| p.stage) else {
		return;
	};

	if ue.emm_data.security_context.kasme.is_none() {
		if stage < STAGE_AUTHENTICATING && common::authentication::start(ue, services, procedure_id).await.is_some() {
			set_stage(ue, procedure_id, STAGE_AUTHENTICATING);
		}
		return;
	}

	if stage < STAGE_ACCEPTED {
		send_accept(ue, services, procedure_id).await;
	}
}

async fn send_accept(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Tracking Area Update Accept with no eNB association");
		return;
	};

	let new_guti = guti_reallocation::allocate_guti(&services.config);
	if let Some(guti) = new_guti.clone() {
		ue.emm_data.rotate_guti(guti);
	}
	let tai_list = ue.current_tai.clone().into_iter().collect::<Vec<_>>();
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::TrackingAreaUpdateAccept { guti: new_guti.clone(), tai_list },
	);

	set_stage(ue, procedure_id, STAGE_ACCEPTED);
	if new_guti.is_none() {
		// No GUTI carried, no Complete expected (3GPP TS 24.301 §5.5.3.2.4).
		finish(ue, services, procedure_id).await;
		return;
	}
	let timer = services.start_timer(services.config.configuration.timers.t3450, ue.mme_ue_s1ap_id, procedure_id).await;
	if let Some(procedure) = ue.procedure_mut(procedure_id) {
		procedure.timer = Some(timer);
	}
}

pub async fn on_tau_complete(
	ue: &mut UeContext,
	services: &EmmServices,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Tracking Area Update Complete with no TAU in flight");
		return;
	};
	finish(ue, services, procedure_id).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "Tracking Area Update Accept timed out (T3450), completing locally");
	finish(ue, services, procedure_id).await;
}

pub async fn resume(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
	child_kind: ProcedureKind,
	outcome: ProcedureOutcome,
) {
	if outcome != ProcedureOutcome::Success {
		warn!(ue_id = %ue.mme_ue_s1ap_id, ?child_kind, ?outcome, "TAU-nested common procedure did not succeed, rejecting TAU");
		send_reject(ue, services, ILLEGAL_UE_CAUSE).await;
		finish(ue, services, procedure_id).await;
		return;
	}
	advance(ue, services, procedure_id).await;
}

const ILLEGAL_UE_CAUSE: u8 = 3;

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
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::TrackingAreaUpdateReject { cause });
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
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::TrackingAreaUpdate && !p.is_terminal()).map(|p| p.id)
}
