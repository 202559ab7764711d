//! Identification procedure (3GPP TS 24.301 §5.4.4): asks the UE for its
//! IMSI when the network has no other way to resolve one (e.g. an Attach
//! Request that arrived with neither a usable GUTI nor an IMSI).

use tracing::warn;

use crate::{
	emm::{common, EmmServices},
	model::{
		procedure::{ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
};

pub async fn start(
	ue: &mut UeContext,
	services: &EmmServices,
	parent_id: ProcedureId,
) -> Option<ProcedureId> {
	let id = common::begin(ue, parent_id, ProcedureKind::Identification).ok()?;

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send Identity Request with no eNB association");
		return Some(id);
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::IdentityRequest);
	let timer = services.start_timer(services.config.configuration.timers.t3470, ue.mme_ue_s1ap_id, id).await;
	if let Some(procedure) = ue.procedure_mut(id) {
		procedure.timer = Some(timer);
	}
	Some(id)
}

pub async fn on_identity_response(
	ue: &mut UeContext,
	services: &EmmServices,
	imsi: crate::model::ids::Imsi,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Identity Response with no Identification procedure in flight");
		return;
	};
	ue.imsi = Some(imsi);
	complete(ue, services, procedure_id, ProcedureOutcome::Success).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "Identity Request timed out (T3470)");
	complete(ue, services, procedure_id, ProcedureOutcome::Timeout).await;
}

fn active_procedure(ue: &UeContext) -> Option<ProcedureId> {
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::Identification && !p.is_terminal()).map(|p| p.id)
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
