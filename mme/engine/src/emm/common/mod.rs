//! The four EMM common procedures (3GPP TS 24.301 §5.4, spec §5): each
//! runs nested under an Attach/Detach/TAU/Service Request parent, bumping
//! the EMM FSM to `CommonProcedureInitiated` for its own duration only.
//!
//! This module holds the shared begin/finish/resume plumbing; each
//! submodule owns its own request/response/timeout handling.

pub mod authentication;
pub mod guti_reallocation;
pub mod identification;
pub mod security_mode_control;

use tracing::warn;

use crate::{
	emm::{attach, detach, fsm, service_request, tau, EmmServices},
	model::{
		procedure::{Procedure, ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
};

/// Allocates a common-procedure record nested under `parent_id` and bumps
/// the EMM FSM into `CommonProcedureInitiated`, recording the state to
/// restore once the child finishes (spec §5).
pub fn begin(
	ue: &mut UeContext,
	parent_id: ProcedureId,
	kind: ProcedureKind,
) -> Result<ProcedureId, fsm::EmmFsmError> {
	let (next_state, previous_state) = fsm::begin_common_procedure(ue.emm_state)?;
	let id = ue.allocate_procedure_id();
	let mut procedure = Procedure::new(id, kind, ue.mme_ue_s1ap_id, Some(parent_id));
	procedure.previous_emm_fsm_state = Some(previous_state);
	ue.procedures.push(procedure);
	if let Some(parent) = ue.procedure_mut(parent_id) {
		parent.add_child(id);
	}
	ue.emm_state = next_state;
	Ok(id)
}

/// Cancels the procedure's timer, restores the EMM FSM to whatever state
/// `begin` recorded, detaches the record from its parent's child list, and
/// removes it — returning the now-terminal record so the caller can
/// inspect its `kind`/`parent` to decide what to resume.
pub async fn finish(
	ue: &mut UeContext,
	services: &EmmServices,
	id: ProcedureId,
	outcome: ProcedureOutcome,
) -> Option<Procedure> {
	let index = ue.procedures.iter().position(|p| p.id == id)?;
	let mut procedure = ue.procedures.remove(index);
	if let Some(handle) = procedure.timer.take() {
		services.cancel_timer(handle).await;
	}
	if let Some(previous) = procedure.previous_emm_fsm_state {
		ue.emm_state = fsm::end_common_procedure(previous);
	}
	if let Some(parent_id) = procedure.parent {
		if let Some(parent) = ue.procedure_mut(parent_id) {
			parent.children.retain(|child| *child != id);
		}
	}
	procedure.outcome = Some(outcome);
	Some(procedure)
}

/// Routes a just-finished common procedure's outcome back to whatever
/// EMM procedure nested it (spec §8: "a nested procedure surfaces its own
/// cause to its immediate parent only").
pub async fn resume_parent(
	ue: &mut UeContext,
	services: &EmmServices,
	finished: &Procedure,
) {
	let Some(parent_id) = finished.parent else {
		return;
	};
	let Some(parent) = ue.procedure(parent_id) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, kind = ?finished.kind, "common procedure finished with no surviving parent record");
		return;
	};
	let outcome = finished.outcome.unwrap_or(ProcedureOutcome::Failure);
	match parent.kind {
		ProcedureKind::Attach => attach::resume(ue, services, parent_id, finished.kind, outcome).await,
		ProcedureKind::Detach => detach::resume(ue, services, parent_id, finished.kind, outcome).await,
		ProcedureKind::TrackingAreaUpdate => tau::resume(ue, services, parent_id, finished.kind, outcome).await,
		ProcedureKind::ServiceRequest => service_request::resume(ue, services, parent_id, finished.kind, outcome).await,
		ProcedureKind::CnTriggered => crate::emm::cn_triggered::resume(ue, services, parent_id, finished.kind, outcome).await,
		other => warn!(ue_id = %ue.mme_ue_s1ap_id, ?other, "common procedure finished under an unexpected parent kind"),
	}
}
