//! Session pool (spec §3): one per UE context, separated from it to permit
//! independent locking of session/bearer state versus EMM state (the
//! teacher's per-UE `ContextQueue` collapses that separation back into a
//! single mutual-exclusion domain — see DESIGN.md open-question 3).

use std::collections::BTreeMap;

use crate::model::{
	pdn_context::{Ambr, PdnContext, PdnContextError},
	procedure::ProcedureId,
};

/// `original_source/component/oai-mme/src/nas/esm/sap/esm_sap.c`'s
/// `MAX_APN_PER_UE`: at most this many simultaneous PDN connections per
/// subscriber.
pub const MAX_APN_PER_UE: u8 = 5;

/// EPS Bearer Identity range (spec glossary: "EBI 5..15").
pub const MIN_EBI: u8 = 5;
pub const MAX_EBI: u8 = 15;

#[derive(Debug, thiserror::Error)]
pub enum SessionPoolError {
	#[error("no free PDN context slot (insufficient resources)")]
	NoFreePdnSlot,
	#[error("no free bearer (EBI) slot (insufficient resources)")]
	NoFreeBearerSlot,
	#[error("PDN context {0} not found")]
	PdnNotFound(u8),
	#[error(transparent)]
	PdnContext(#[from] PdnContextError),
}

/// Ordered by `(context_id, default_ebi, apn)` per spec §3's "ordered map
/// of active PDN contexts keyed by a triple".
type PdnKey = (u8, u8, String);

#[derive(Debug)]
pub struct SessionPool {
	/// Stable for the UE's lifetime; seeds the UE's M-TMSI (spec §3).
	pub mme_teid_s11: u32,
	pub sgw_teid_s11: Option<u32>,
	pub subscribed_ue_ambr: Option<Ambr>,

	free_pdn_slots: Vec<u8>,
	free_bearer_ebis: Vec<u8>,
	pdn_contexts: BTreeMap<PdnKey, PdnContext>,

	pub s11_procedures: Vec<ProcedureId>,
	pub esm_procedures: Vec<ProcedureId>,
	pub s1ap_procedures: Vec<ProcedureId>,
}

impl SessionPool {
	pub fn new(mme_teid_s11: u32) -> Self {
		Self {
			mme_teid_s11,
			sgw_teid_s11: None,
			subscribed_ue_ambr: None,
			free_pdn_slots: (0..MAX_APN_PER_UE).rev().collect(),
			free_bearer_ebis: (MIN_EBI..=MAX_EBI).rev().collect(),
			pdn_contexts: BTreeMap::new(),
			s11_procedures: Vec::new(),
			esm_procedures: Vec::new(),
			s1ap_procedures: Vec::new(),
		}
	}

	/// spec §8: "A UE with an exhausted PDN-context free-list returns ESM
	/// cause 'insufficient resources' regardless of APN."
	pub fn allocate_pdn_slot(&mut self) -> Result<u8, SessionPoolError> {
		self.free_pdn_slots.pop().ok_or(SessionPoolError::NoFreePdnSlot)
	}

	pub fn allocate_bearer_ebi(&mut self) -> Result<u8, SessionPoolError> {
		self.free_bearer_ebis.pop().ok_or(SessionPoolError::NoFreeBearerSlot)
	}

	pub fn release_bearer_ebi(
		&mut self,
		ebi: u8,
	) {
		debug_assert!((MIN_EBI..=MAX_EBI).contains(&ebi));
		if !self.free_bearer_ebis.contains(&ebi) {
			self.free_bearer_ebis.push(ebi);
		}
	}

	pub fn insert_pdn_context(
		&mut self,
		pdn: PdnContext,
	) {
		let key = (pdn.context_id, pdn.default_ebi, pdn.apn.clone());
		self.pdn_contexts.insert(key, pdn);
	}

	pub fn remove_pdn_context(
		&mut self,
		context_id: u8,
	) -> Option<PdnContext> {
		let key = self.pdn_contexts.keys().find(|(cid, _, _)| *cid == context_id).cloned()?;
		let pdn = self.pdn_contexts.remove(&key)?;
		self.free_pdn_slots.push(context_id);
		for bearer in pdn.bearers() {
			self.release_bearer_ebi(bearer.ebi);
		}
		Some(pdn)
	}

	pub fn pdn_context(
		&self,
		context_id: u8,
	) -> Option<&PdnContext> {
		self.pdn_contexts.values().find(|p| p.context_id == context_id)
	}

	pub fn pdn_context_mut(
		&mut self,
		context_id: u8,
	) -> Option<&mut PdnContext> {
		self.pdn_contexts.values_mut().find(|p| p.context_id == context_id)
	}

	pub fn pdn_context_by_apn(
		&self,
		apn: &str,
	) -> Option<&PdnContext> {
		self.pdn_contexts.values().find(|p| p.apn_matches(apn))
	}

	/// Locates the PDN context owning `ebi`, whether it is the default or
	/// a dedicated bearer — used by Create/Update/Delete Bearer handling
	/// (spec §4.6 "Correlation rules") to find the parent PDN via the
	/// linked EBI.
	pub fn pdn_context_owning_bearer(
		&self,
		ebi: u8,
	) -> Option<&PdnContext> {
		self.pdn_contexts.values().find(|p| p.bearer(ebi).is_some())
	}

	pub fn pdn_context_owning_bearer_mut(
		&mut self,
		ebi: u8,
	) -> Option<&mut PdnContext> {
		self.pdn_contexts.values_mut().find(|p| p.bearer(ebi).is_some())
	}

	pub fn pdn_contexts(&self) -> impl Iterator<Item = &PdnContext> {
		self.pdn_contexts.values()
	}

	pub fn pdn_context_count(&self) -> usize {
		self.pdn_contexts.len()
	}

	pub fn is_last_pdn_context(
		&self,
		context_id: u8,
	) -> bool {
		self.pdn_contexts.len() == 1 && self.pdn_contexts.values().any(|p| p.context_id == context_id)
	}
}

#[cfg(test)]
mod tests {
	use gtp::PdnType;

	use super::*;
	use crate::model::bearer_context::{BearerContext, BearerQos};

	fn qos() -> BearerQos {
		BearerQos { qci: 9, arp_priority_level: 8, arp_preemption_capability: true, arp_preemption_vulnerability: true }
	}

	#[test]
	fn pdn_slot_exhaustion_yields_insufficient_resources() {
		let mut pool = SessionPool::new(1);
		for _ in 0..MAX_APN_PER_UE {
			pool.allocate_pdn_slot().unwrap();
		}
		assert!(matches!(pool.allocate_pdn_slot(), Err(SessionPoolError::NoFreePdnSlot)));
	}

	#[test]
	fn removing_pdn_context_frees_its_bearer_ebis() {
		let mut pool = SessionPool::new(1);
		let cid = pool.allocate_pdn_slot().unwrap();
		let ebi = pool.allocate_bearer_ebi().unwrap();
		pool.insert_pdn_context(PdnContext::new(cid, "internet", PdnType::Ipv4, BearerContext::new_default(ebi, cid, qos())));
		assert_eq!(pool.pdn_context_count(), 1);
		pool.remove_pdn_context(cid);
		assert_eq!(pool.pdn_context_count(), 0);
		// The freed EBI is available again.
		let reused = pool.allocate_bearer_ebi().unwrap();
		assert_eq!(reused, ebi);
	}
}
