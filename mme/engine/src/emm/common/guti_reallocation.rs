//! GUTI Reallocation procedure (3GPP TS 24.301 §5.4.1): hands the UE a
//! fresh M-TMSI under this MME's GUMMEI, run standalone or nested inside
//! Attach/TAU when the network decides to reallocate rather than reuse the
//! GUTI it already assigned.

use std::num::NonZeroU32;

use counter::CounterU32;
use tracing::warn;

use crate::{
	emm::{common, EmmServices},
	model::{
		ids::Guti,
		procedure::{ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::UeContext,
	},
	nas::EmmMessage,
};

/// Process-wide M-TMSI allocator. Starts at 1 (`CounterU32::new`), so the
/// `NonZeroU32` in every allocated `Guti` never needs an `unwrap`.
static M_TMSI_COUNTER: CounterU32 = CounterU32::new();

/// Allocates a fresh GUTI under the MME's first configured GUMMEI (spec §6:
/// a single MME instance here always advertises one GUMMEI list entry as
/// its own identity).
pub fn allocate_guti(config: &mme_config::MmeConfig) -> Option<Guti> {
	let gummei = config.configuration.gummei_list.first()?;
	let m_tmsi = NonZeroU32::new(M_TMSI_COUNTER.increment())?;
	Some(Guti { plmn_id: gummei.plmn_id.clone(), mme_group_id: gummei.mme_group_id, mme_code: gummei.mme_code, m_tmsi })
}

pub async fn start(
	ue: &mut UeContext,
	services: &EmmServices,
	parent_id: ProcedureId,
	new_guti: Guti,
) -> Option<ProcedureId> {
	let id = common::begin(ue, parent_id, ProcedureKind::GutiReallocation).ok()?;

	let Some(enb_key) = ue.enb_key else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot send GUTI Reallocation Command with no eNB association");
		return Some(id);
	};
	services.send_downlink_nas(
		enb_key,
		ue.mme_ue_s1ap_id,
		&EmmMessage::GutiReallocationCommand { guti: new_guti.clone() },
	);
	ue.emm_data.rotate_guti(new_guti);
	let timer = services.start_timer(services.config.configuration.timers.t3450, ue.mme_ue_s1ap_id, id).await;
	if let Some(procedure) = ue.procedure_mut(id) {
		procedure.timer = Some(timer);
	}
	Some(id)
}

pub async fn on_complete(
	ue: &mut UeContext,
	services: &EmmServices,
) {
	let Some(procedure_id) = active_procedure(ue) else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "GUTI Reallocation Complete with no GUTI Reallocation procedure in flight");
		return;
	};
	complete(ue, services, procedure_id, ProcedureOutcome::Success).await;
}

pub async fn on_timeout(
	ue: &mut UeContext,
	services: &EmmServices,
	procedure_id: ProcedureId,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, "GUTI Reallocation Command timed out (T3450)");
	complete(ue, services, procedure_id, ProcedureOutcome::Timeout).await;
}

fn active_procedure(ue: &UeContext) -> Option<ProcedureId> {
	ue.procedures.iter().find(|p| p.kind == ProcedureKind::GutiReallocation && !p.is_terminal()).map(|p| p.id)
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
