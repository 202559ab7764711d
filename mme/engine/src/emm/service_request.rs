//! Service Request procedure (3GPP TS 24.301 §5.6.1, spec §5.4): the only
//! EMM procedure with no accept message — success is implicit once the
//! radio/S1 bearers mme_app re-establishes come up, so this module only
//! validates the request and flips ECM to Connected.

use tracing::warn;

use crate::{
	emm::{fsm, EmmServices},
	model::{
		ids::Guti,
		procedure::{ProcedureId, ProcedureKind, ProcedureOutcome},
		ue_context::{EcmState, UeContext},
	},
	nas::EmmMessage,
};

const ILLEGAL_UE_CAUSE: u8 = 3;

pub async fn on_service_request(
	ue: &mut UeContext,
	services: &EmmServices,
	guti: Guti,
) {
	if let Err(err) = fsm::can_start_service_request(ue.emm_state) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, %err, "Service Request outside Registered, rejecting");
		send_reject(ue, services, ILLEGAL_UE_CAUSE).await;
		return;
	}
	if ue.emm_data.guti.as_ref() != Some(&guti) {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "Service Request GUTI does not match the stored GUTI, rejecting");
		send_reject(ue, services, ILLEGAL_UE_CAUSE).await;
		return;
	}

	services.stats.record_service_request();
	ue.ecm_state = EcmState::Connected;
	// Re-establishing user-plane bearers over the now-connected S1 link is
	// mme_app's orchestration concern (spec §4.7), not this NAS exchange's.
}

/// Service Request never nests a common procedure in this design (no
/// accept message exists to delay); defensive log-only no-op.
pub async fn resume(
	ue: &mut UeContext,
	_services: &EmmServices,
	_procedure_id: ProcedureId,
	child_kind: ProcedureKind,
	outcome: ProcedureOutcome,
) {
	warn!(ue_id = %ue.mme_ue_s1ap_id, ?child_kind, ?outcome, "unexpected common procedure nested under Service Request");
}

async fn send_reject(
	ue: &UeContext,
	services: &EmmServices,
	cause: u8,
) {
	let Some(enb_key) = ue.enb_key else {
		return;
	};
	services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &EmmMessage::ServiceReject { cause });
}
