//! Security Mode Control procedure (3GPP TS 24.301 §5.4.3): activates the
//! EPS security context Authentication derived, by having the UE confirm
//! the selected ciphering/integrity algorithms.

use tracing::warn;

use crate::{
	emm::{common, EmmServices},
	model::{
		emm_data::SelectedAlgorithms,
		procedure::{ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
};

pub async fn start(
	ue: &mut UeContext,
	services: &EmmServices,
	parent_id: ProcedureId,
	selected_eea: u8,
	selected_eia: u8,
) -> Option<ProcedureId> {
	let id = common::begin(ue, parent_id, ProcedureKind::SecurityModeControl).ok()?;

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Security Mode Command with no eNB association");
		return Some(id);
	};
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::SecurityModeCommand { selected_eea, selected_eia },
	);
	let timer = services.start_timer(services.config.configuration.timers.t3460, ue.mme_ue_s1ap_id, id).await;
	if let Some(procedure) = ue.procedure_mut(id) {
		procedure.timer = Some(timer);
	}
	ue.emm_data.security_context.selected_algorithms = SelectedAlgorithms { eea: selected_eea, eia: selected_eia };
	Some(id)
}

pub async fn on_security_mode_complete(
	ue: &mut UeContext,
	services: &EmmServices,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Security Mode Complete with no Security Mode Control procedure in flight");
		return;
	};
	complete(ue, services, procedure_id, ProcedureOutcome::Success).await;
}

pub async fn on_security_mode_reject(
	ue: &mut UeContext,
	services: &EmmServices,
	cause: u8,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, cause, "UE rejected Security Mode Command");
	if let Some(procedure_id) = active_procedure(ue) {
		complete(ue, services, procedure_id, ProcedureOutcome::Failure).await;
	}
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "Security Mode Command timed out (T3460)");
	complete(ue, services, procedure_id, ProcedureOutcome::Timeout).await;
}

fn active_procedure(ue: &UeContext) -> Option<ProcedureId> {
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::SecurityModeControl && !p.is_terminal()).map(|p| p.id)
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
