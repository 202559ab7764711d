//! Bearer context (spec §3): one per EPS bearer, 5..15.

use gtp::FTeid;

/// ESM EBR (EPS Bearer Resource) sub-state, elaborated per SPEC_FULL.md §C
/// from `original_source/esm_ebr.c`: each transition is validated by
/// [`crate::esm::bearer_state`] rather than assigned freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsmEbrState {
	Inactive,
	ActivePending,
	Active,
	InactivePending,
	ModifyPending,
}

/// Bearer-state bit flags (spec §3: "a bit-flag bearer state
/// `{MME_CREATED | ENB_CREATED | ACTIVE | ...}`"), a plain `u8` mask in the
/// original's style rather than a pulled-in bitflags crate — there are only
/// four bits and no serialization boundary that needs named-flag parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerFlags(u8);

impl BearerFlags {
	pub const MME_CREATED: BearerFlags = BearerFlags(0b0000_0001);
	pub const ENB_CREATED: BearerFlags = BearerFlags(0b0000_0010);
	pub const ACTIVE: BearerFlags = BearerFlags(0b0000_0100);
	pub const S1_RELEASED: BearerFlags = BearerFlags(0b0000_1000);

	pub const fn empty() -> Self {
		BearerFlags(0)
	}

	pub fn contains(
		&self,
		other: BearerFlags,
	) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn insert(
		&mut self,
		other: BearerFlags,
	) {
		self.0 |= other.0;
	}

	pub fn remove(
		&mut self,
		other: BearerFlags,
	) {
		self.0 &= !other.0;
	}
}

impl std::ops::BitOr for BearerFlags {
	type Output = BearerFlags;

	fn bitor(
		self,
		rhs: BearerFlags,
	) -> BearerFlags {
		BearerFlags(self.0 | rhs.0)
	}
}

/// Bearer-level QoS (QCI + ARP), spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerQos {
	pub qci: u8,
	pub arp_priority_level: u8,
	pub arp_preemption_capability: bool,
	pub arp_preemption_vulnerability: bool,
}

#[derive(Debug, Clone)]
pub struct BearerContext {
	pub ebi: u8,
	/// The default EBI of this bearer's PDN (spec §3: "linked-EBI").
	pub linked_ebi: u8,
	pub pdn_context_id: u8,
	pub ebr_state: EsmEbrState,
	pub flags: BearerFlags,
	pub enb_fteid_s1u: Option<FTeid>,
	pub sgw_fteid_s1u: Option<FTeid>,
	pub traffic_flow_template: Option<Vec<u8>>,
	pub qos: BearerQos,
	pub pco: Option<Vec<u8>>,
}

impl BearerContext {
	pub fn new_default(
		ebi: u8,
		pdn_context_id: u8,
		qos: BearerQos,
	) -> Self {
		Self {
			ebi,
			linked_ebi: ebi,
			pdn_context_id,
			ebr_state: EsmEbrState::Inactive,
			flags: BearerFlags::empty(),
			enb_fteid_s1u: None,
			sgw_fteid_s1u: None,
			traffic_flow_template: None,
			qos,
			pco: None,
		}
	}

	pub fn new_dedicated(
		ebi: u8,
		linked_ebi: u8,
		pdn_context_id: u8,
		qos: BearerQos,
	) -> Self {
		Self {
			ebi,
			linked_ebi,
			pdn_context_id,
			ebr_state: EsmEbrState::Inactive,
			flags: BearerFlags::empty(),
			enb_fteid_s1u: None,
			sgw_fteid_s1u: None,
			traffic_flow_template: None,
			qos,
			pco: None,
		}
	}

	/// Invariant (spec §3 + §8): `ACTIVE` requires `MME_CREATED ∧
	/// ENB_CREATED` and a nonzero eNB F-TEID.
	pub fn is_invariant_satisfied(&self) -> bool {
		if !self.flags.contains(BearerFlags::ACTIVE) {
			return true;
		}
		self.flags.contains(BearerFlags::MME_CREATED)
			&& self.flags.contains(BearerFlags::ENB_CREATED)
			&& self.enb_fteid_s1u.map(|f| f.teid != 0).unwrap_or(false)
	}

	pub fn mark_active(
		&mut self,
		enb_fteid: FTeid,
	) {
		self.flags.insert(BearerFlags::MME_CREATED | BearerFlags::ENB_CREATED | BearerFlags::ACTIVE);
		self.enb_fteid_s1u = Some(enb_fteid);
		self.ebr_state = EsmEbrState::Active;
		debug_assert!(self.is_invariant_satisfied());
	}
}

#[cfg(test)]
mod tests {
	use std::net::{IpAddr, Ipv4Addr};

	use super::*;

	fn qos() -> BearerQos {
		BearerQos { qci: 9, arp_priority_level: 8, arp_preemption_capability: true, arp_preemption_vulnerability: true }
	}

	#[test]
	fn inactive_bearer_always_satisfies_invariant() {
		let bearer = BearerContext::new_default(5, 0, qos());
		assert!(bearer.is_invariant_satisfied());
	}

	#[test]
	fn active_without_enb_fteid_violates_invariant() {
		let mut bearer = BearerContext::new_default(5, 0, qos());
		bearer.flags.insert(BearerFlags::ACTIVE | BearerFlags::MME_CREATED | BearerFlags::ENB_CREATED);
		assert!(!bearer.is_invariant_satisfied());
	}

	#[test]
	fn mark_active_establishes_invariant() {
		let mut bearer = BearerContext::new_default(5, 0, qos());
		bearer.mark_active(FTeid { teid: 0xabcd, addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)) });
		assert!(bearer.is_invariant_satisfied());
	}
}
