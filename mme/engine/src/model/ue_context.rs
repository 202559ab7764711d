//! UE context (spec §3): the top-level record a `store::UeContextStore`
//! indexes by IMSI, GUTI, eNB key, and S11/S10 TEID, and which exclusively
//! owns an EMM data context, a session pool, and the procedures running
//! against them.

use std::net::IpAddr;

use gtp::ContextManager as GtpContextManager;

use crate::{
	model::{
		emm_data::EmmDataContext,
		ids::{Ecgi, EnbS1apIdKey, Guti, Imsi, MmeUeS1apId, Tai},
		procedure::{Procedure, ProcedureId},
		session_pool::SessionPool,
	},
	s6a,
};

/// EMM registration state (spec §5's top-level EMM FSM states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmmState {
	Deregistered,
	CommonProcedureInitiated,
	Registered,
	DeregisteredInitiated,
}

/// EPS Connection Management state: independent of `EmmState`, tracks
/// whether the UE currently has a signalling connection to an eNB (spec
/// §5's "ECM" axis, e.g. a registered UE with no S1 signalling connection
/// is ECM-IDLE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmState {
	Idle,
	Connected,
}

/// Why a UE context's S1 connection (or the context itself) was released,
/// recorded so the reason can be surfaced in subsequent S1AP/GTP
/// signalling (spec §5's "ReleaseCause" carried through UE Context
/// Release Request/Command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseCause {
	NormalRelease,
	Implicit,
	RadioLinkFailure,
	CsfbTriggered,
	UserInactivity,
	HandoverSuccessful,
	HandoverFailure,
}

/// Cached UE radio capability (spec §3 supplemented feature, carried
/// opaquely — the IE contents are a NAS/S1AP codec concern, out of scope
/// here), plus the URC id the network used to decide whether re-fetching
/// from the UE is necessary (3GPP TS 36.413's "UE Radio Capability ID").
#[derive(Debug, Clone, Default)]
pub struct RadioCapability {
	pub payload: Option<Vec<u8>>,
	pub urc_id: Option<String>,
}

#[derive(Debug)]
pub struct UeContext {
	pub mme_ue_s1ap_id: MmeUeS1apId,
	pub enb_key: Option<EnbS1apIdKey>,
	pub imsi: Option<Imsi>,
	pub imeisv: Option<String>,
	pub ecgi: Option<Ecgi>,
	pub current_tai: Option<Tai>,

	pub emm_state: EmmState,
	pub ecm_state: EcmState,
	pub emm_data: EmmDataContext,
	pub session_pool: SessionPool,
	/// Local S10 TEID for an in-flight inter-MME handover/context-transfer
	/// procedure (spec §3: "`mme_teid_s10`"); `None` outside such a
	/// procedure, since the S10 tunnel is not kept up once it concludes.
	pub mme_teid_s10: Option<u32>,
	/// Cached from the HSS's Update Location Answer (spec §6), consulted by
	/// `esm::apn_selection` so a PDN Connectivity Request doesn't need a
	/// fresh S6a round-trip once the UE has attached.
	pub subscription_data: Option<s6a::SubscriptionData>,

	pub radio_capability: RadioCapability,
	pub release_cause: Option<ReleaseCause>,

	/// Raw ingress counter (spec's Open-Question resolution: "num_attach_request
	/// is the raw ingress counter, not a de-duplicated one" — incremented on
	/// every Attach Request received for this context, retransmissions
	/// included).
	pub num_attach_request: u64,

	pub procedures: Vec<Procedure>,
	next_procedure_id: u64,
}

impl gtp::Identifiable for UeContext {
	type Key = MmeUeS1apId;

	fn key(&self) -> Self::Key {
		self.mme_ue_s1ap_id
	}
}

pub type UeContextManager = GtpContextManager<UeContext>;

impl UeContext {
	pub fn new(
		mme_ue_s1ap_id: MmeUeS1apId,
		mme_teid_s11: u32,
	) -> Self {
		Self {
			mme_ue_s1ap_id,
			enb_key: None,
			imsi: None,
			imeisv: None,
			ecgi: None,
			current_tai: None,
			emm_state: EmmState::Deregistered,
			ecm_state: EcmState::Idle,
			emm_data: EmmDataContext::default(),
			session_pool: SessionPool::new(mme_teid_s11),
			mme_teid_s10: None,
			radio_capability: RadioCapability::default(),
			release_cause: None,
			num_attach_request: 0,
			procedures: Vec::new(),
			next_procedure_id: 1,
		}
	}

	pub fn allocate_procedure_id(&mut self) -> ProcedureId {
		let id = ProcedureId(self.next_procedure_id);
		self.next_procedure_id += 1;
		id
	}

	pub fn procedure(
		&self,
		id: ProcedureId,
	) -> Option<&Procedure> {
		self.procedures.iter().find(|p| p.id == id)
	}

	pub fn procedure_mut(
		&mut self,
		id: ProcedureId,
	) -> Option<&mut Procedure> {
		self.procedures.iter_mut().find(|p| p.id == id)
	}

	/// Removes a procedure and, recursively, all of its still-pending
	/// children (spec §8's abort cascade: "aborting a parent aborts every
	/// child still in flight").
	pub fn remove_procedure_cascade(
		&mut self,
		id: ProcedureId,
	) -> Vec<Procedure> {
		let mut removed = Vec::new();
		let mut frontier = vec![id];
		while let Some(current) = frontier.pop() {
			if let Some(index) = self.procedures.iter().position(|p| p.id == current) {
				let procedure = self.procedures.remove(index);
				frontier.extend(procedure.children.iter().copied());
				removed.push(procedure);
			}
		}
		removed
	}

	pub fn is_registered(&self) -> bool {
		self.emm_state == EmmState::Registered
	}

	pub fn has_active_ip(&self) -> bool {
		self.session_pool
			.pdn_contexts()
			.any(|pdn| !pdn.ip_addresses.is_empty())
	}

	pub fn allocated_ip_addresses(&self) -> Vec<IpAddr> {
		self.session_pool
			.pdn_contexts()
			.flat_map(|pdn| pdn.ip_addresses.iter().copied())
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use crate::model::procedure::ProcedureKind;

	use super::*;

	#[test]
	fn aborting_parent_removes_nested_children() {
		let mut ue = UeContext::new(MmeUeS1apId(1), 100);
		let attach_id = ue.allocate_procedure_id();
		let mut attach = Procedure::new(attach_id, ProcedureKind::Attach, ue.mme_ue_s1ap_id, None);
		let auth_id = ue.allocate_procedure_id();
		let auth = Procedure::new(auth_id, ProcedureKind::Authentication, ue.mme_ue_s1ap_id, Some(attach_id));
		attach.add_child(auth_id);
		ue.procedures.push(attach);
		ue.procedures.push(auth);

		let removed = ue.remove_procedure_cascade(attach_id);
		assert_eq!(removed.len(), 2);
		assert!(ue.procedures.is_empty());
	}

	#[test]
	fn fresh_context_starts_deregistered_and_idle() {
		let ue = UeContext::new(MmeUeS1apId(1), 100);
		assert_eq!(ue.emm_state, EmmState::Deregistered);
		assert_eq!(ue.ecm_state, EcmState::Idle);
		assert!(!ue.is_registered());
	}
}
