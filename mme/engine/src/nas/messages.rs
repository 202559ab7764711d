//! Decoded EMM/ESM NAS message catalog (spec §4.5/§4.6). The bit-level
//! IEs are a NAS codec concern (Non-goal, see `codec.rs`); these variants
//! carry exactly the fields the control-flow logic branches on, the way
//! the teacher's `nas_models::message::*` types arrive already decoded at
//! `NasContext`/`GmmMessage` call sites.

use serde::{Deserialize, Serialize};

use crate::model::ids::{Guti, Imsi};

/// EPS Attach Type IE, 3GPP TS 24.301 §9.9.3.11 (spec §4.5 step 1: "Validate
/// the Attach type; reject emergency attaches if network-unsupported").
/// `Combined` (GPRS-combined attach) is never emitted by this core's
/// Non-goal scope (no SGSN interface) but is kept here so a decoded value
/// round-trips instead of being silently reinterpreted as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpsAttachType {
	Normal,
	Emergency,
	Combined,
}

/// EMM-layer messages, 3GPP TS 24.301 §8.2. Uplink (UE -> MME) and
/// downlink (MME -> UE) variants share one enum, the same shape the
/// decoded `GtpMessageBody` catalog uses for request/response pairs —
/// `NasCodec` encodes whichever variant is handed to it and decodes
/// whichever arrives, without a separate direction type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmmMessage {
	AttachRequest {
		imsi: Option<Imsi>,
		guti: Option<Guti>,
		has_security_context: bool,
		attach_type: EpsAttachType,
		/// Present when the UE has no IMSI/GUTI to offer yet, or is
		/// attaching for emergency service (spec §8's "IMEI not accepted"
		/// boundary needs to know whether one was presented).
		imeisv: Option<String>,
		esm_container: EsmMessage,
	},
	AttachAccept {
		guti: Option<Guti>,
		tai_list: Vec<mme_config::Tai>,
		esm_container: EsmMessage,
	},
	AttachReject {
		cause: u8,
	},
	AttachComplete,
	IdentityRequest,
	IdentityResponse {
		imsi: Imsi,
	},
	AuthenticationRequest {
		rand: [u8; 16],
		autn: [u8; 16],
	},
	AuthenticationResponse {
		res: Vec<u8>,
	},
	AuthenticationReject,
	AuthenticationFailure {
		cause: u8,
	},
	SecurityModeCommand {
		selected_eea: u8,
		selected_eia: u8,
	},
	SecurityModeComplete,
	SecurityModeReject {
		cause: u8,
	},
	GutiReallocationCommand {
		guti: Guti,
	},
	GutiReallocationComplete,
	/// UE-initiated Detach Request.
	DetachRequest {
		switch_off: bool,
	},
	/// Network-initiated Detach Request (spec §8's implicit/explicit
	/// network detach): distinct from the UE-initiated variant since the
	/// fields and the direction it is valid in differ.
	NetworkDetachRequest {
		cause: u8,
		reattach_required: bool,
	},
	DetachAccept,
	TrackingAreaUpdateRequest {
		guti: Guti,
		active_flag: bool,
		has_security_context: bool,
	},
	TrackingAreaUpdateAccept {
		guti: Option<Guti>,
		tai_list: Vec<mme_config::Tai>,
	},
	TrackingAreaUpdateReject {
		cause: u8,
	},
	TrackingAreaUpdateComplete,
	ServiceRequest {
		guti: Guti,
	},
	ServiceReject {
		cause: u8,
	},
	EmmStatus {
		cause: u8,
	},
}

/// ESM-layer messages, 3GPP TS 24.301 §8.3. `pti` is present on every
/// UE-triggered variant; network-triggered replies correlate by EBI
/// instead (spec's Open-Question 4 discriminator, `esm::Direction`).
///
/// `PartialEq` backs the "matching IEs" branch of the Attach collision
/// table (spec §4.5 step 2): a retransmitted Attach Request's embedded ESM
/// container is compared against the one cached on the Attach procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EsmMessage {
	PdnConnectivityRequest {
		pti: u8,
		requested_apn: Option<String>,
		pdn_type: gtp::PdnType,
	},
	PdnConnectivityReject {
		pti: u8,
		cause: u8,
	},
	PdnDisconnectRequest {
		pti: u8,
		linked_ebi: u8,
	},
	PdnDisconnectReject {
		pti: u8,
		cause: u8,
	},
	EsmInformationRequest {
		pti: u8,
	},
	EsmInformationResponse {
		pti: u8,
		apn: Option<String>,
		pco: Option<Vec<u8>>,
	},
	BearerResourceAllocationRequest {
		pti: u8,
		linked_ebi: u8,
	},
	BearerResourceAllocationReject {
		pti: u8,
		cause: u8,
	},
	ActivateDefaultEpsBearerContextRequest {
		ebi: u8,
		pti: u8,
		pdn_type: gtp::PdnType,
		pco: Option<Vec<u8>>,
	},
	ActivateDefaultEpsBearerContextAccept {
		ebi: u8,
	},
	ActivateDefaultEpsBearerContextReject {
		ebi: u8,
		cause: u8,
	},
	ActivateDedicatedEpsBearerContextRequest {
		ebi: u8,
		linked_ebi: u8,
	},
	ActivateDedicatedEpsBearerContextAccept {
		ebi: u8,
	},
	ActivateDedicatedEpsBearerContextReject {
		ebi: u8,
		cause: u8,
	},
	ModifyEpsBearerContextRequest {
		ebi: u8,
	},
	ModifyEpsBearerContextAccept {
		ebi: u8,
	},
	ModifyEpsBearerContextReject {
		ebi: u8,
		cause: u8,
	},
	DeactivateEpsBearerContextRequest {
		ebi: u8,
		cause: u8,
	},
	DeactivateEpsBearerContextAccept {
		ebi: u8,
	},
	EsmStatus {
		pti: u8,
		cause: u8,
	},
}

impl EsmMessage {
	/// `None` for network-triggered variants (ESM replies correlated by
	/// EBI, not PTI — the spec's PTI=0 discriminator redesign flag).
	pub fn pti(&self) -> Option<u8> {
		match self {
			EsmMessage::PdnConnectivityRequest { pti, .. }
			| EsmMessage::PdnConnectivityReject { pti, .. }
			| EsmMessage::PdnDisconnectRequest { pti, .. }
			| EsmMessage::PdnDisconnectReject { pti, .. }
			| EsmMessage::EsmInformationRequest { pti }
			| EsmMessage::EsmInformationResponse { pti, .. }
			| EsmMessage::BearerResourceAllocationRequest { pti, .. }
			| EsmMessage::BearerResourceAllocationReject { pti, .. }
			| EsmMessage::EsmStatus { pti, .. } => Some(*pti),
			_ => None,
		}
	}
}
