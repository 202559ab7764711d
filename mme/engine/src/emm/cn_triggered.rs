//! CN-triggered procedures (spec §4.7): S6a-initiated exchanges the MME did
//! not start itself. Only Cancel Location is wired end-to-end here — it
//! maps directly onto the already-implemented Detach procedure; Reset and
//! Insert Subscriber Data remain typed `s6a` request shapes with no handler
//! yet (Non-goal: full HSS push-procedure coverage).

use tracing::warn;

use crate::{
	emm::{detach, EmmServices},
	model::{
		procedure::{Procedure, ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	s6a::CancellationType,
};

/// HSS Cancel Location (3GPP TS 29.272 §5.2.3.1): always tears the local
/// context down; a subscription withdrawal additionally runs a
/// network-initiated Detach towards the UE (an inter-MME update does not,
/// since the UE already re-registered elsewhere).
pub async fn on_cancel_location(
	ue: &mut UeContext,
	services: &EmmServices,
	cancellation_type: CancellationType,
) {
	let procedure_id = ue.allocate_procedure_id();
	ue.procedures.push(Procedure::new(procedure_id, ProcedureKind::CnTriggered, ue.mme_ue_s1ap_id, None));

	if cancellation_type == CancellationType::SubscriptionWithdrawal {
		const REASON_SUBSCRIPTION_WITHDRAWN: u8 = 7;
		detach::start(ue, services, REASON_SUBSCRIPTION_WITHDRAWN, false).await;
	}
	finish(ue, services, procedure_id).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "CN-triggered procedure timed out");
	finish(ue, services, procedure_id).await;
}

/// CN-triggered procedures do not nest a common procedure in this design;
/// defensive log-only no-op.
pub async fn resume(
	ue: &mut UeContext,
	_services: &EmmServices,
	_procedure_id: ProcedureId,
	child_kind: ProcedureKind,
	outcome: ProcedureOutcome,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, ?child_kind, ?outcome, "unexpected common procedure nested under a CN-triggered procedure");
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
