//! Bearer Resource Allocation procedure (3GPP TS 24.301 §6.5.3, spec §5.2):
//! the UE's sole standalone request that does not get its own NAS reply —
//! the MME's answer, if the network grants the request, arrives later as an
//! ordinary network-triggered Create/Update Bearer Request (spec §4.6).
//! Grounded on `original_source/component/oai-mme/src/nas/esm/esm_proc.h`'s
//! `esm_proc_bearer_resource_allocation_request`/
//! `esm_proc_bearer_resource_modification_request` pass-through shape.

use tracing::warn;

use crate::{
	esm::{reply, EsmServices},
	messages::EsmSessionRequest,
	model::ue_context::UeContext,
	nas::EsmMessage,
};

const CAUSE_UNKNOWN_EPS_BEARER_CONTEXT: u8 = 43;

pub async fn on_request(
	ue: &mut UeContext,
	services: &EsmServices,
	message: EsmMessage,
) {
	let EsmMessage::BearerResourceAllocationRequest { pti, linked_ebi } = message else {
		return;
	};

	if ue.session_pool.pdn_context_owning_bearer(linked_ebi).is_none() {
		warn!(ue_id = %ue.mme_ue_s1ap_id, linked_ebi, "Bearer Resource Allocation Request names an unknown EPS bearer context");
		reply(ue, services, None, EsmMessage::BearerResourceAllocationReject { pti, cause: CAUSE_UNKNOWN_EPS_BEARER_CONTEXT })
			.await;
		return;
	}

	let procedure_id = ue.allocate_procedure_id();
	let command = gtp::BearerResourceCommand { linked_ebi, procedure_transaction_id: pti };
	services.request_session(ue.mme_ue_s1ap_id, procedure_id, EsmSessionRequest::BearerResourceCommand(command));
}
