//! PDN context (spec §3): one per active PDN connection.

use std::net::IpAddr;

use gtp::{FTeid, PdnType};

use crate::model::bearer_context::BearerContext;

#[derive(Debug, thiserror::Error)]
pub enum PdnContextError {
	#[error("PDN context has no bearers")]
	NoBearers,
	#[error("cannot remove the default bearer (EBI {0}) while {1} other bearer(s) remain")]
	CannotRemoveDefaultWhileDedicatedExist(u8, usize),
	#[error("bearer EBI {0} not found on this PDN context")]
	BearerNotFound(u8),
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolConfigOptions(pub Vec<u8>);

#[derive(Debug, Clone)]
pub struct PdnContext {
	/// From subscription (spec §3); identifies this PDN connection within
	/// the session pool's ordered map alongside `default_ebi`/`apn`.
	pub context_id: u8,
	pub default_ebi: u8,
	/// Case-insensitive compare per spec §3.
	pub apn: String,
	pub pdn_type: PdnType,
	pub ip_addresses: Vec<IpAddr>,
	pub subscribed_apn_ambr: Option<Ambr>,
	pub sgw_teid_s11_s4: Option<u32>,
	pub sgw_addr_s11_s4: Option<IpAddr>,
	pub pco: ProtocolConfigOptions,
	/// Invariant (spec §3 + §8): `default_ebi` is the EBI of
	/// `session_bearers[0]`, always — the default bearer is never removed
	/// while dedicated bearers remain (spec §8 idempotence/invariants).
	session_bearers: Vec<BearerContext>,
}

#[derive(Debug, Clone, Copy)]
pub struct Ambr {
	pub uplink_kbps: u64,
	pub downlink_kbps: u64,
}

impl PdnContext {
	pub fn new(
		context_id: u8,
		apn: impl Into<String>,
		pdn_type: PdnType,
		default_bearer: BearerContext,
	) -> Self {
		let default_ebi = default_bearer.ebi;
		Self {
			context_id,
			default_ebi,
			apn: apn.into(),
			pdn_type,
			ip_addresses: Vec::new(),
			subscribed_apn_ambr: None,
			sgw_teid_s11_s4: None,
			sgw_addr_s11_s4: None,
			pco: ProtocolConfigOptions::default(),
			session_bearers: vec![default_bearer],
		}
	}

	pub fn apn_matches(
		&self,
		candidate: &str,
	) -> bool {
		self.apn.eq_ignore_ascii_case(candidate)
	}

	pub fn default_bearer(&self) -> &BearerContext {
		&self.session_bearers[0]
	}

	pub fn default_bearer_mut(&mut self) -> &mut BearerContext {
		&mut self.session_bearers[0]
	}

	pub fn bearers(&self) -> &[BearerContext] {
		&self.session_bearers
	}

	pub fn bearer(
		&self,
		ebi: u8,
	) -> Option<&BearerContext> {
		self.session_bearers.iter().find(|b| b.ebi == ebi)
	}

	pub fn bearer_mut(
		&mut self,
		ebi: u8,
	) -> Option<&mut BearerContext> {
		self.session_bearers.iter_mut().find(|b| b.ebi == ebi)
	}

	pub fn add_dedicated_bearer(
		&mut self,
		bearer: BearerContext,
	) {
		debug_assert_eq!(bearer.linked_ebi, self.default_ebi);
		self.session_bearers.push(bearer);
	}

	/// Removes a bearer by EBI. Removing the default bearer is only
	/// permitted when it is the sole remaining bearer (spec §3 invariant).
	pub fn remove_bearer(
		&mut self,
		ebi: u8,
	) -> Result<BearerContext, PdnContextError> {
		let index =
			self.session_bearers.iter().position(|b| b.ebi == ebi).ok_or(PdnContextError::BearerNotFound(ebi))?;
		if ebi == self.default_ebi && self.session_bearers.len() > 1 {
			return Err(PdnContextError::CannotRemoveDefaultWhileDedicatedExist(
				ebi,
				self.session_bearers.len() - 1,
			));
		}
		Ok(self.session_bearers.remove(index))
	}

	pub fn is_last_bearer(
		&self,
		ebi: u8,
	) -> bool {
		self.session_bearers.len() == 1 && self.session_bearers[0].ebi == ebi
	}

	pub fn update_from_create_session_response(
		&mut self,
		fteid: FTeid,
		allocated_ip: Option<IpAddr>,
	) {
		self.sgw_teid_s11_s4 = Some(fteid.teid);
		self.sgw_addr_s11_s4 = Some(fteid.addr);
		if let Some(ip) = allocated_ip {
			self.ip_addresses.push(ip);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::bearer_context::{BearerContext, BearerQos};

	fn qos() -> BearerQos {
		BearerQos { qci: 9, arp_priority_level: 8, arp_preemption_capability: true, arp_preemption_vulnerability: true }
	}

	#[test]
	fn default_ebi_always_matches_first_bearer() {
		let pdn = PdnContext::new(0, "internet", PdnType::Ipv4, BearerContext::new_default(5, 0, qos()));
		assert_eq!(pdn.default_ebi, pdn.default_bearer().ebi);
	}

	#[test]
	fn cannot_remove_default_bearer_while_dedicated_exist() {
		let mut pdn = PdnContext::new(0, "internet", PdnType::Ipv4, BearerContext::new_default(5, 0, qos()));
		pdn.add_dedicated_bearer(BearerContext::new_dedicated(6, 5, 0, qos()));
		let err = pdn.remove_bearer(5).unwrap_err();
		assert!(matches!(err, PdnContextError::CannotRemoveDefaultWhileDedicatedExist(5, 1)));
	}

	#[test]
	fn apn_compare_is_case_insensitive() {
		let pdn = PdnContext::new(0, "Internet", PdnType::Ipv4, BearerContext::new_default(5, 0, qos()));
		assert!(pdn.apn_matches("internet"));
		assert!(pdn.apn_matches("INTERNET"));
		assert!(!pdn.apn_matches("ims"));
	}
}
