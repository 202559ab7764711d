//! Decoded S1AP PDU catalog (spec §4.8), restricted to the procedures the
//! core dispatches on. Bit-level IEs are the ASN.1 PER codec's concern
//! (Non-goal); these carry only the fields MME-app/EMM/ESM branch on,
//! mirroring how `ngap_models` arrives pre-decoded at the teacher's
//! `ngap::core::initial_ue_message` call sites.

use std::net::IpAddr;

use crate::model::ids::{Ecgi, EnbS1apIdKey, MmeUeS1apId, Tai};

/// Incoming PDUs (eNB -> MME), spec §4.8's dispatch-by-procedure-code list.
#[derive(Debug, Clone)]
pub enum S1apIndication {
	InitialUeMessage {
		enb_key: EnbS1apIdKey,
		tai: Tai,
		ecgi: Ecgi,
		nas_pdu: Vec<u8>,
	},
	UplinkNasTransport {
		mme_ue_s1ap_id: MmeUeS1apId,
		enb_key: EnbS1apIdKey,
		nas_pdu: Vec<u8>,
	},
	UeContextReleaseRequest {
		mme_ue_s1ap_id: MmeUeS1apId,
		cause: ReleaseCauseIndication,
	},
	UeContextReleaseComplete {
		mme_ue_s1ap_id: MmeUeS1apId,
	},
	ErabSetupResponse {
		mme_ue_s1ap_id: MmeUeS1apId,
		succeeded: Vec<ErabSetupItem>,
		failed: Vec<ErabFailedItem>,
	},
	ErabModifyResponse {
		mme_ue_s1ap_id: MmeUeS1apId,
		succeeded: Vec<u8>,
		failed: Vec<ErabFailedItem>,
	},
	ErabReleaseResponse {
		mme_ue_s1ap_id: MmeUeS1apId,
		released: Vec<u8>,
	},
	PathSwitchRequest {
		mme_ue_s1ap_id: MmeUeS1apId,
		new_enb_key: EnbS1apIdKey,
		erabs_to_switch: Vec<u8>,
	},
	HandoverRequired {
		mme_ue_s1ap_id: MmeUeS1apId,
		target_ecgi: Ecgi,
	},
	HandoverRequestAcknowledge {
		mme_ue_s1ap_id: MmeUeS1apId,
		target_enb_fteid_s1u: Vec<(u8, IpAddr, u32)>,
	},
	HandoverNotify {
		mme_ue_s1ap_id: MmeUeS1apId,
		cell_id: Ecgi,
	},
	HandoverCancel {
		mme_ue_s1ap_id: MmeUeS1apId,
	},
	S1SetupRequest {
		global_enb_id: u32,
		supported_tais: Vec<Tai>,
	},
	EnbConfigurationTransfer {
		target_ecgi: Ecgi,
		source_ecgi: Ecgi,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseCauseIndication {
	UserInactivity,
	RadioLinkFailure,
	CsfbTriggered,
	Other,
}

#[derive(Debug, Clone, Copy)]
pub struct ErabSetupItem {
	pub ebi: u8,
	pub enb_fteid_s1u: (IpAddr, u32),
}

#[derive(Debug, Clone, Copy)]
pub struct ErabFailedItem {
	pub ebi: u8,
	pub cause: u8,
}

/// Outgoing actions (MME -> eNB), spec §4.8/§4.7.
#[derive(Debug, Clone)]
pub enum S1apAction {
	DownlinkNasTransport {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		nas_pdu: Vec<u8>,
	},
	InitialContextSetupRequest {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		erabs: Vec<ErabSetupItem>,
		nas_pdu: Option<Vec<u8>>,
	},
	UeContextReleaseCommand {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		cause: ReleaseCauseIndication,
	},
	ErabSetupRequest {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		erabs: Vec<ErabSetupItem>,
	},
	ErabModifyRequest {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		ebis: Vec<u8>,
	},
	ErabReleaseCommand {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		ebis: Vec<u8>,
	},
	PathSwitchRequestAcknowledge {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
	},
	HandoverCommand {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		target_enb_key: EnbS1apIdKey,
	},
	HandoverRequest {
		target_enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
		source_ecgi: Ecgi,
	},
	MmeStatusTransfer {
		enb_key: EnbS1apIdKey,
		mme_ue_s1ap_id: MmeUeS1apId,
	},
}
