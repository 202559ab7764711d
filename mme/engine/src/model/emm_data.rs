//! EMM data context (spec §3): the NAS security and mobility state a UE
//! context carries independently of any in-flight procedure.

use crate::model::ids::{Guti, MmeUeS1apId, PlmnId, Tai};

/// 24-bit NAS COUNT, wrapping per 3GPP TS 24.301 §4.4.3.1 semantics
/// (the `count_t` the security context in
/// `original_source/component/oai-mme/src/nas/emm/nas_emm_procedures.h`
/// carries): overflow of the uplink counter without a new security
/// context drives a local detach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NasCount(u32);

const NAS_COUNT_MAX: u32 = 0x00FF_FFFF;

impl NasCount {
	pub fn value(&self) -> u32 {
		self.0
	}

	/// Returns `true` if incrementing wrapped past the 24-bit range —
	/// callers use this to trigger a new security context or detach.
	#[must_use]
	pub fn increment(&mut self) -> bool {
		if self.0 >= NAS_COUNT_MAX {
			self.0 = 0;
			true
		} else {
			self.0 += 1;
			false
		}
	}
}

/// EPS Encryption/Integrity Algorithm selector, spec §3's "selected
/// EEA/EIA" — the algorithm identifiers themselves (0 = null, 1 = SNOW
/// 3G, 2 = AES, 3 = ZUC) rather than the key material, which belongs to
/// the NAS codec seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectedAlgorithms {
	pub eea: u8,
	pub eia: u8,
}

/// EPS NAS security context (spec §3), established by Authentication and
/// activated by Security Mode Command.
#[derive(Debug, Clone, Default)]
pub struct EpsSecurityContext {
	pub ksi: Option<u8>,
	/// K_ASME, opaque — key derivation belongs to the NAS codec/HSS seam.
	pub kasme: Option<Vec<u8>>,
	pub selected_algorithms: SelectedAlgorithms,
	pub ul_count: NasCount,
	pub dl_count: NasCount,
	/// Cached on Authentication Info Answer so a retried Attach/TAU can be
	/// served without a fresh S6a round-trip (spec §4.7).
	pub unused_auth_vectors: Vec<AuthenticationVector>,
	/// The vector an in-flight Authentication procedure sent to the UE,
	/// held here so the response handler can check RES against XRES and
	/// derive K_ASME without a second S6a round-trip.
	pub pending_vector: Option<AuthenticationVector>,
}

/// One (RAND, AUTN, XRES, KASME) quintuplet-as-delivered-to-the-MME, per
/// spec §4.7's S6a Authentication-Information contract.
#[derive(Debug, Clone)]
pub struct AuthenticationVector {
	pub rand: [u8; 16],
	pub autn: [u8; 16],
	pub xres: Vec<u8>,
	pub kasme: Vec<u8>,
}

/// UE/MS network capability bits the EMM layer must remember across
/// procedures to answer subsequent Security Mode Command / TAU replies
/// (spec §3) — carried opaquely since their bit-level shape is a NAS IE,
/// out of scope here.
#[derive(Debug, Clone, Default)]
pub struct UeNetworkCapability(pub Vec<u8>);

/// EMM mobility/registration state a UE context carries between
/// procedures: current/old GUTI, TAI list, DRX parameters, and the
/// active security context (spec §3).
#[derive(Debug, Clone)]
pub struct EmmDataContext {
	pub imeisv: Option<String>,
	pub guti: Option<Guti>,
	pub old_guti: Option<Guti>,
	pub last_visited_registered_tai: Option<Tai>,
	pub tai_list: Vec<Tai>,
	pub serving_plmn: Option<PlmnId>,
	pub security_context: EpsSecurityContext,
	pub ue_network_capability: UeNetworkCapability,
	pub ms_network_capability: Option<Vec<u8>>,
	pub drx_parameter: Option<[u8; 2]>,
	/// Old MME identity carried during an inter-MME TAU/attach so the
	/// context request knows where to ask (spec §4.7 CN-triggered).
	pub old_mme_identity: Option<MmeUeS1apId>,
}

impl Default for EmmDataContext {
	fn default() -> Self {
		Self {
			imeisv: None,
			guti: None,
			old_guti: None,
			last_visited_registered_tai: None,
			tai_list: Vec::new(),
			serving_plmn: None,
			security_context: EpsSecurityContext::default(),
			ue_network_capability: UeNetworkCapability::default(),
			ms_network_capability: None,
			drx_parameter: None,
			old_mme_identity: None,
		}
	}
}

impl EmmDataContext {
	pub fn rotate_guti(
		&mut self,
		new_guti: Guti,
	) {
		self.old_guti = self.guti.replace(new_guti);
	}

	pub fn is_in_tai_list(
		&self,
		tai: &Tai,
	) -> bool {
		self.tai_list.iter().any(|t| t == tai)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nas_count_wraps_at_24_bits() {
		let mut count = NasCount(NAS_COUNT_MAX);
		assert!(count.increment());
		assert_eq!(count.value(), 0);
	}

	#[test]
	fn nas_count_increments_normally_below_max() {
		let mut count = NasCount::default();
		assert!(!count.increment());
		assert_eq!(count.value(), 1);
	}
}
