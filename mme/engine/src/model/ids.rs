//! The identifier types the data model is keyed by (spec §3). `PlmnId` and
//! `Tai` are the config crate's types reused verbatim — a served TAI and a
//! UE's serving TAI are the same shape.

use std::{fmt, num::NonZeroU32};

use serde::{Deserialize, Serialize};

pub use mme_config::{PlmnId, Tai};

/// MME-assigned UE identifier. Unique process-wide, never reused while the
/// context it names exists (spec §3). `0` is reserved ("invalid", spec
/// §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MmeUeS1apId(pub u32);

impl MmeUeS1apId {
	pub const INVALID: MmeUeS1apId = MmeUeS1apId(0);

	pub fn is_valid(&self) -> bool {
		self.0 != 0
	}
}

impl fmt::Display for MmeUeS1apId {
	fn fmt(
		&self,
		f: &mut fmt::Formatter<'_>,
	) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

/// The eNB-assigned identifier paired with the SCTP association it arrived
/// on — together they uniquely address a UE's radio-side context (spec
/// §3). The eNB UE S1AP ID is a 24-bit value; this keeps it as `u32` and
/// relies on callers only ever constructing it from a decoded IE (masking
/// is the ASN.1 codec's job, out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnbS1apIdKey {
	pub enb_ue_s1ap_id: u32,
	pub sctp_assoc_id: u32,
}

/// A 15-digit IMSI, kept as digit characters (never parsed as an integer —
/// leading behavior around MNC length/digit count matters, same rationale
/// as `mme_config::PlmnId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Imsi(String);

#[derive(Debug, thiserror::Error)]
#[error("IMSI must be 15 decimal digits, got {0:?}")]
pub struct InvalidImsi(String);

impl Imsi {
	pub fn new(digits: impl Into<String>) -> Result<Self, InvalidImsi> {
		let digits = digits.into();
		if digits.len() == 15 && digits.bytes().all(|b| b.is_ascii_digit()) {
			Ok(Imsi(digits))
		} else {
			Err(InvalidImsi(digits))
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Imsi {
	fn fmt(
		&self,
		f: &mut fmt::Formatter<'_>,
	) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Globally Unique Temporary Identifier: PLMN + MME Group Id + MME Code +
/// M-TMSI (spec §3). `m_tmsi` is seeded from the UE's stable S11 TEID per
/// spec §3 ("Session pool" — "used as the M-TMSI seed").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guti {
	pub plmn_id: PlmnId,
	pub mme_group_id: u16,
	pub mme_code: u8,
	pub m_tmsi: NonZeroU32,
}

/// E-UTRAN Cell Global Identifier: PLMN + 28-bit cell id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ecgi {
	pub plmn_id: PlmnIdLite,
	pub cell_id: u32,
}

/// `Ecgi` needs a `Copy` PLMN representation; `mme_config::PlmnId` carries
/// `String`s (MCC/MNC digit strings can have variable length), so a
/// compact fixed-width copy is kept here purely for the radio-identity
/// hot path, converted from/to `mme_config::PlmnId` at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlmnIdLite {
	pub mcc: [u8; 3],
	pub mnc: [u8; 3],
	pub mnc_len: u8,
}

impl From<&PlmnId> for PlmnIdLite {
	fn from(value: &PlmnId) -> Self {
		let mut mcc = [0u8; 3];
		mcc.copy_from_slice(value.mcc.as_bytes());
		let mut mnc = [0u8; 3];
		mnc[..value.mnc.len()].copy_from_slice(value.mnc.as_bytes());
		PlmnIdLite { mcc, mnc, mnc_len: value.mnc.len() as u8 }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn imsi_rejects_wrong_length() {
		assert!(Imsi::new("123").is_err());
		assert!(Imsi::new("262010000000001").is_ok());
	}

	#[test]
	fn mme_ue_s1ap_id_zero_is_invalid() {
		assert!(!MmeUeS1apId::INVALID.is_valid());
		assert!(MmeUeS1apId(1).is_valid());
	}
}
