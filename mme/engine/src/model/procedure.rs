//! Procedure records (spec §3 + §5): the bookkeeping every in-flight
//! EMM/ESM/CN-triggered exchange needs to correlate a reply, retry, and
//! notify whatever asked for it.
//!
//! Grounded on `original_source/component/oai-mme/src/mme_app/mme_app_procedures.c`'s
//! `mme_app_s11_proc_t`/`mme_app_s10_proc_t` family and on
//! `original_source/component/oai-mme/src/nas/emm/nas_emm_procedures.h`'s
//! EMM procedure records: every procedure carries a discriminated "what
//! outcome fires next" continuation rather than a raw function pointer,
//! since the outcome here is always "enqueue one more message on the bus"
//! (spec §4.1's "no procedure calls another task directly").

use scheduler::TimerHandle;

use crate::model::ids::MmeUeS1apId;

/// Opaque, process-wide identifier for a procedure record, analogous to
/// the original's `nas_proc_id` (spec §3: "never reused while the
/// procedure is in flight").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcedureId(pub u64);

/// What kind of exchange this procedure record tracks (spec §5's
/// enumerated EMM/ESM/CN-triggered procedures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
	Attach,
	Detach,
	TrackingAreaUpdate,
	Identification,
	Authentication,
	SecurityModeControl,
	GutiReallocation,
	ServiceRequest,
	PdnConnectivity,
	PdnDisconnect,
	BearerActivation,
	BearerModification,
	BearerDeactivation,
	BearerResourceCommand,
	/// S6a-triggered (Cancel-Location, Reset, Insert-Subscriber-Data) or
	/// S10-triggered (Context Request) procedures the MME did not
	/// initiate itself (spec §4.7).
	CnTriggered,
}

/// Terminal outcome of a procedure, reported to its parent (if any) and
/// to whichever task is awaiting it (spec §3: "a nested procedure
/// surfaces its own cause to its immediate parent only").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureOutcome {
	Success,
	Failure,
	/// The parent explicitly aborted this procedure (spec §8's abort
	/// cascade: aborting a parent aborts every child still in flight).
	Aborted,
	Timeout,
}

/// One in-flight procedure. `parent`/`children` encode the nesting spec
/// §3 and §8 describe (e.g. Authentication and Security Mode Control
/// nested inside Attach); `retry_count` and `timer` back the retransmit
/// policy each concrete procedure module applies to its own request.
#[derive(Debug)]
pub struct Procedure {
	pub id: ProcedureId,
	pub kind: ProcedureKind,
	pub ue_id: MmeUeS1apId,
	pub parent: Option<ProcedureId>,
	pub children: Vec<ProcedureId>,
	/// The EMM FSM state recorded when this procedure started, restored
	/// on abort/timeout if the FSM transitioned speculatively (spec §5's
	/// "COMMON_PROCEDURE_INITIATED" superstate).
	pub previous_emm_fsm_state: Option<crate::model::ue_context::EmmState>,
	pub retry_count: u32,
	pub timer: Option<TimerHandle>,
	pub outcome: Option<ProcedureOutcome>,
	/// Opaque sub-state counter, mirroring the original's per-procedure-type
	/// `sub_state` field: each top-level procedure module (attach/detach/
	/// tau/service_request) defines its own meaning for the value and
	/// advances it as nested common procedures and the ESM container
	/// round-trip complete.
	pub stage: u8,
	/// The ESM container an Attach/TAU Request arrived with, held here
	/// between forwarding it to the ESM task (`EsmBusMessage::EmmTriggered`)
	/// and getting the answer back (`EmmBusMessage::EsmContainerReady`) to
	/// embed in the Accept/Reject this procedure eventually sends.
	pub pending_esm_container: Option<crate::nas::EsmMessage>,
	/// ESM procedure correlation key for UE-triggered transactions (spec
	/// §4.6: "ESM procedures are keyed by `(ue_id, PTI)` for UE-triggered
	/// transactions"). `None` for EMM/CN-triggered procedures.
	pub pti: Option<u8>,
	/// ESM procedure correlation key for network-triggered bearer
	/// procedures (spec §4.6: "`(ue_id, PTI=0, EBI)` for network-triggered
	/// bearer procedures"). `None` for EMM/CN-triggered procedures.
	pub ebi: Option<u8>,
	/// The EMM procedure this ESM procedure is answering an embedded
	/// container for (spec §4.1's `EsmBusMessage::EmmTriggered` round trip);
	/// `None` for a standalone ESM procedure with its own NAS downlink.
	pub emm_trigger: Option<ProcedureId>,
	/// EBIs a Create/Update/Delete Bearer Request is still waiting on a NAS
	/// reply for (spec §4.6: one GTPv2-C request can carry several bearer
	/// contexts, each activated/modified/deactivated with its own NAS
	/// exchange, correlated back into a single aggregated GTP response).
	pub pending_ebis: Vec<u8>,
	/// Per-EBI outcomes collected so far for a multi-bearer network-triggered
	/// procedure, consumed once `pending_ebis` is empty to build the
	/// aggregated Create/Update/Delete Bearer Response.
	pub bearer_outcomes: Vec<(u8, gtp::Cause)>,
}

impl Procedure {
	pub fn new(
		id: ProcedureId,
		kind: ProcedureKind,
		ue_id: MmeUeS1apId,
		parent: Option<ProcedureId>,
	) -> Self {
		Self {
			id,
			kind,
			ue_id,
			parent,
			children: Vec::new(),
			previous_emm_fsm_state: None,
			retry_count: 0,
			timer: None,
			outcome: None,
			stage: 0,
			pending_esm_container: None,
			pti: None,
			ebi: None,
			emm_trigger: None,
			pending_ebis: Vec::new(),
			bearer_outcomes: Vec::new(),
		}
	}

	pub fn is_root(&self) -> bool {
		self.parent.is_none()
	}

	pub fn is_terminal(&self) -> bool {
		self.outcome.is_some()
	}

	pub fn add_child(
		&mut self,
		child: ProcedureId,
	) {
		self.children.push(child);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_procedure_has_no_outcome() {
		let proc = Procedure::new(ProcedureId(1), ProcedureKind::Attach, MmeUeS1apId(7), None);
		assert!(proc.is_root());
		assert!(!proc.is_terminal());
	}

	#[test]
	fn nested_procedure_tracks_parent() {
		let mut parent = Procedure::new(ProcedureId(1), ProcedureKind::Attach, MmeUeS1apId(7), None);
		let child = Procedure::new(ProcedureId(2), ProcedureKind::Authentication, MmeUeS1apId(7), Some(ProcedureId(1)));
		parent.add_child(child.id);
		assert!(!child.is_root());
		assert_eq!(parent.children, vec![ProcedureId(2)]);
	}
}
