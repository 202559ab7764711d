//! The MME configuration surface (spec §6): served TAIs, GUMMEI list,
//! preferred ciphering/integrity algorithms, EPS Network Feature bits,
//! per-procedure timer durations, and the local S1-MME/S11/S10 addresses.
//!
//! Grounded on the teacher's `omnipath/src/config.rs`: a top-level
//! `serde_valid::Validate`-derived config struct, loaded as YAML, wrapped in
//! `SerdeValidated<T>` so an invalid file never reaches a running `Engine`.

use std::net::IpAddr;

use nonempty::NonEmpty;
use runtime_base::{CoreConfig, LoggingConfig, RuntimeConfig};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use serde_with::{DisplayFromStr, serde_as};

#[derive(Serialize, Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MmeConfig {
	pub info: Info,
	#[validate]
	pub configuration: Configuration,
	pub logger: LoggingConfig,
	pub runtime: RuntimeConfig,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Info {
	#[serde_as(as = "DisplayFromStr")]
	pub version: versions::SemVer,
	pub description: String,
}

impl CoreConfig for MmeConfig {
	fn get_log_config(&self) -> &LoggingConfig {
		&self.logger
	}

	fn get_runtime_config(&self) -> &RuntimeConfig {
		&self.runtime
	}
}

/// PLMN identity: MCC + (2 or 3 digit) MNC, carried as decimal digit strings
/// the way the original keeps them (never parsed as an integer — leading
/// zeroes in the MNC are significant).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlmnId {
	#[validate(pattern = r"^\d{3}$")]
	pub mcc: String,
	#[validate(pattern = r"^\d{2,3}$")]
	pub mnc: String,
}

/// Tracking Area Identity: PLMN + 16-bit TAC.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Tai {
	pub plmn_id: PlmnId,
	pub tac: u16,
}

/// spec §6: "served TAIs (one 'partial TAI list' of one of three types)".
/// Type 0: one PLMN with a list of TACs. Type 1: a consecutive TAC range
/// under one PLMN. Type 2: an explicit list of full TAIs, each with its own
/// PLMN. The MME serves exactly one such list at a time.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PartialTaiList {
	ManyTacsOnePlmn { plmn_id: PlmnId, tacs: NonEmpty<u16> },
	ConsecutiveTacs { plmn_id: PlmnId, start_tac: u16, count: u16 },
	ManyPlmns { tais: NonEmpty<Tai> },
}

impl PartialTaiList {
	pub fn contains(
		&self,
		tai: &Tai,
	) -> bool {
		match self {
			PartialTaiList::ManyTacsOnePlmn { plmn_id, tacs } => {
				*plmn_id == tai.plmn_id && tacs.iter().any(|t| *t == tai.tac)
			}
			PartialTaiList::ConsecutiveTacs { plmn_id, start_tac, count } => {
				*plmn_id == tai.plmn_id
					&& tai.tac >= *start_tac
					&& tai.tac < start_tac.saturating_add(*count)
			}
			PartialTaiList::ManyPlmns { tais } => tais.iter().any(|t| t == tai),
		}
	}
}

/// Globally Unique MME Identifier: PLMN + MME Group Id + MME Code.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Gummei {
	pub plmn_id: PlmnId,
	pub mme_group_id: u16,
	pub mme_code: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
	pub mme_name: String,
	pub realm: String,
	pub relative_capacity: u8,

	pub served_tai_list: PartialTaiList,
	#[validate(min_items = 1)]
	pub gummei_list: Vec<Gummei>,

	pub s1ap: EndpointConfig,
	pub s11: EndpointConfig,
	pub s10: EndpointConfig,

	#[validate(minimum = 1)]
	pub max_ues: u32,

	pub eps_network_feature_support: EpsNetworkFeatureSupport,
	pub security: NasSecurityConfig,

	/// REDESIGN FLAG / design note: the source forces a TAU on every
	/// service request regardless of the TAI match; we expose this as a
	/// config bit instead of hard-coding the legacy behavior.
	#[serde(default)]
	pub force_tau: bool,

	pub timers: TimerConfig,
	pub edns: EdnsConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
	#[validate(min_items = 1)]
	pub addresses: Vec<IpAddr>,
	pub port: u16,
}

/// EPS Network Feature Support bits (3GPP TS 24.301 §9.9.3.12A), carried
/// flat instead of as a packed octet — the bit-level encoding belongs to
/// the external NAS codec.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct EpsNetworkFeatureSupport {
	pub emergency_bearer_support: bool,
	pub ims_voice_over_ps: bool,
	pub location_services: bool,
	pub extended_service_request: bool,
}

/// Preferred ciphering/integrity algorithm orderings, most-preferred first.
/// The actual algorithm implementations are external (spec §1 Non-goals);
/// this is the ordered capability list SMC negotiation walks.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NasSecurityConfig {
	#[serde(default = "default_eea_order")]
	pub eea_order: Vec<u8>,
	#[serde(default = "default_eia_order")]
	pub eia_order: Vec<u8>,
}

fn default_eea_order() -> Vec<u8> {
	vec![2, 1, 0]
}

fn default_eia_order() -> Vec<u8> {
	vec![2, 1, 0]
}

/// All procedure-retransmission and reachability timers named in spec §6,
/// expressed as (seconds, microseconds) pairs matching the timer service's
/// `create` contract (scheduler::TimerService::create).
#[derive(Serialize, Deserialize, Debug, Clone, smart_default::SmartDefault)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
	#[default((12 * 60, 0))]
	pub t3402: (u64, u32),
	#[default((54 * 60, 0))]
	pub t3412: (u64, u32),
	#[default((6, 0))]
	pub t3422: (u64, u32),
	#[default((6, 0))]
	pub t3450: (u64, u32),
	#[default((6, 0))]
	pub t3460: (u64, u32),
	#[default((6, 0))]
	pub t3470: (u64, u32),
	#[default((8, 0))]
	pub t3485: (u64, u32),
	#[default((8, 0))]
	pub t3486: (u64, u32),
	#[default((8, 0))]
	pub t3495: (u64, u32),
	#[default((4, 0))]
	pub mme_s10_handover_completion: (u64, u32),
	#[default((4, 0))]
	pub mme_mobility_completion: (u64, u32),
}

/// A weighted eDNS/WRR candidate peer, keyed by TAC at lookup time (spec
/// §4.7, supplemented by `original_source/mme_app_edns_emulation.c` /
/// `mme_app_wrr_selection.c` per SPEC_FULL.md §C).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPeer {
	pub address: IpAddr,
	pub port: u16,
	#[serde(default = "default_weight")]
	pub weight: u8,
}

fn default_weight() -> u8 {
	1
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EdnsEntry {
	pub tac: u16,
	pub apn: Option<String>,
	pub candidates: NonEmpty<WeightedPeer>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EdnsConfig {
	#[serde(default)]
	pub sgw_entries: Vec<EdnsEntry>,
	#[serde(default)]
	pub mme_entries: Vec<EdnsEntry>,
}

pub struct SerdeValidated<T>(T);

impl<T: Validate> SerdeValidated<T> {
	pub fn new(value: T) -> Result<Self, serde_valid::validation::Errors> {
		value.validate()?;
		Ok(SerdeValidated(value))
	}

	pub fn inner(&self) -> &T {
		&self.0
	}

	pub fn into_inner(self) -> T {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn consecutive_tac_partial_list_contains_boundary_but_not_past_end() {
		let plmn = PlmnId { mcc: "262".into(), mnc: "01".into() };
		let list =
			PartialTaiList::ConsecutiveTacs { plmn_id: plmn.clone(), start_tac: 100, count: 10 };
		assert!(list.contains(&Tai { plmn_id: plmn.clone(), tac: 100 }));
		assert!(list.contains(&Tai { plmn_id: plmn.clone(), tac: 109 }));
		assert!(!list.contains(&Tai { plmn_id: plmn, tac: 110 }));
	}

	#[test]
	fn many_tacs_one_plmn_rejects_other_plmn() {
		let plmn = PlmnId { mcc: "262".into(), mnc: "01".into() };
		let other = PlmnId { mcc: "310".into(), mnc: "260".into() };
		let list = PartialTaiList::ManyTacsOnePlmn {
			plmn_id: plmn.clone(),
			tacs: NonEmpty::from((1u16, vec![2, 3])),
		};
		assert!(list.contains(&Tai { plmn_id: plmn, tac: 2 }));
		assert!(!list.contains(&Tai { plmn_id: other, tac: 2 }));
	}
}
