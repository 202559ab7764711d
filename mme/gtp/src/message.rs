use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// GTPv2-C cause value (3GPP TS 29.274 §8.4). Only the handful the core
/// branches on are named; anything else round-trips as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Cause {
	#[default]
	RequestAccepted,
	RequestAcceptedPartially,
	ContextNotFound,
	InvalidMessageFormat,
	NoResourcesAvailable,
	SystemFailure,
	Other(u8),
}

impl Cause {
	pub fn is_accepted(&self) -> bool {
		matches!(self, Cause::RequestAccepted | Cause::RequestAcceptedPartially)
	}
}

/// A fully qualified TEID, i.e. a TEID plus the address it is reachable at.
/// Interface type (S1-U, S5/S8, S11, S10, ...) is carried by which field of
/// the containing IE the F-TEID was placed in, as in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FTeid {
	pub teid: u32,
	pub addr: IpAddr,
}

impl Default for FTeid {
	fn default() -> Self {
		Self { teid: 0, addr: IpAddr::from([0, 0, 0, 0]) }
	}
}

/// One Bearer Context IE, shared shape across Create/Update/Delete Bearer
/// and Modify Bearer request/response pairs. Absent optional fields are
/// simply not meaningful for a given message (e.g. `cause` is only set on
/// responses).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BearerContextIe {
	pub ebi: u8,
	pub cause: Option<Cause>,
	pub s1u_enb_fteid: Option<FTeid>,
	pub s1u_sgw_fteid: Option<FTeid>,
	pub s5s8_pgw_fteid: Option<FTeid>,
	pub qci: Option<u8>,
	pub arp_priority_level: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
	pub imsi: String,
	pub sender_fteid_control_plane: FTeid,
	pub apn: String,
	pub pdn_type: PdnType,
	pub default_ebi: u8,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionResponse {
	pub cause: Cause,
	pub sender_fteid_control_plane: Option<FTeid>,
	pub pdn_addr_allocation: Option<IpAddr>,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PdnType {
	#[default]
	Ipv4,
	Ipv6,
	Ipv4v6,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyBearerRequest {
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyBearerResponse {
	pub cause: Cause,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteSessionRequest {
	pub linked_ebi: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteSessionResponse {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseAccessBearersRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseAccessBearersResponse {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBearerRequest {
	pub linked_ebi: u8,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBearerResponse {
	pub cause: Cause,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBearerRequest {
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBearerResponse {
	pub cause: Cause,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBearerRequest {
	pub ebis: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBearerResponse {
	pub cause: Cause,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBearerCommand {
	pub ebis: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBearerFailureIndication {
	pub cause: Cause,
	pub bearer_contexts: Vec<BearerContextIe>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BearerResourceCommand {
	pub linked_ebi: u8,
	pub procedure_transaction_id: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownlinkDataNotification {
	pub ebi: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownlinkDataNotificationAcknowledge {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoRequest {
	pub recovery: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoResponse {
	pub recovery: u8,
}

/// S10 messages carry an MM context (security context, UE radio
/// capabilities) and a PDN connection list that belong, semantically, to
/// the EMM/ESM layer above this crate. Rather than duplicate those types
/// here (and invert the dependency graph), S10 payloads that need them
/// carry an opaque, already-serialized blob that `mme-engine` produced and
/// will parse back out; this layer only needs to relay it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardRelocationRequest {
	pub mm_context: Vec<u8>,
	pub pdn_connections: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardRelocationResponse {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRequest {
	pub imsi: Option<String>,
	pub guti: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextResponse {
	pub cause: Cause,
	pub mm_context: Vec<u8>,
	pub pdn_connections: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextAcknowledge {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardAccessContextNotification {
	pub rrc_container: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardAccessContextAcknowledge {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardRelocationCompleteNotification;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardRelocationCompleteAcknowledge {
	pub cause: Cause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelocationCancelRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelocationCancelResponse {
	pub cause: Cause,
}

/// The GTPv2-C message catalog this core emits and consumes (3GPP TS
/// 29.274 §6 + §7, restricted to the S11/S10 procedures spec §5 names).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GtpMessageBody {
	EchoRequest(EchoRequest),
	EchoResponse(EchoResponse),
	CreateSessionRequest(CreateSessionRequest),
	CreateSessionResponse(CreateSessionResponse),
	ModifyBearerRequest(ModifyBearerRequest),
	ModifyBearerResponse(ModifyBearerResponse),
	DeleteSessionRequest(DeleteSessionRequest),
	DeleteSessionResponse(DeleteSessionResponse),
	ReleaseAccessBearersRequest(ReleaseAccessBearersRequest),
	ReleaseAccessBearersResponse(ReleaseAccessBearersResponse),
	CreateBearerRequest(CreateBearerRequest),
	CreateBearerResponse(CreateBearerResponse),
	UpdateBearerRequest(UpdateBearerRequest),
	UpdateBearerResponse(UpdateBearerResponse),
	DeleteBearerRequest(DeleteBearerRequest),
	DeleteBearerResponse(DeleteBearerResponse),
	DeleteBearerCommand(DeleteBearerCommand),
	DeleteBearerFailureIndication(DeleteBearerFailureIndication),
	BearerResourceCommand(BearerResourceCommand),
	DownlinkDataNotification(DownlinkDataNotification),
	DownlinkDataNotificationAcknowledge(DownlinkDataNotificationAcknowledge),
	ForwardRelocationRequest(ForwardRelocationRequest),
	ForwardRelocationResponse(ForwardRelocationResponse),
	ContextRequest(ContextRequest),
	ContextResponse(ContextResponse),
	ContextAcknowledge(ContextAcknowledge),
	ForwardAccessContextNotification(ForwardAccessContextNotification),
	ForwardAccessContextAcknowledge(ForwardAccessContextAcknowledge),
	ForwardRelocationCompleteNotification(ForwardRelocationCompleteNotification),
	ForwardRelocationCompleteAcknowledge(ForwardRelocationCompleteAcknowledge),
	RelocationCancelRequest(RelocationCancelRequest),
	RelocationCancelResponse(RelocationCancelResponse),
}

impl GtpMessageBody {
	/// Requests expect a correlated response; responses (and one-way
	/// notifications that are themselves acked) do not get retransmitted by
	/// the transaction layer once sent.
	pub fn is_request(&self) -> bool {
		matches!(
			self,
			GtpMessageBody::EchoRequest(_)
				| GtpMessageBody::CreateSessionRequest(_)
				| GtpMessageBody::ModifyBearerRequest(_)
				| GtpMessageBody::DeleteSessionRequest(_)
				| GtpMessageBody::ReleaseAccessBearersRequest(_)
				| GtpMessageBody::CreateBearerRequest(_)
				| GtpMessageBody::UpdateBearerRequest(_)
				| GtpMessageBody::DeleteBearerRequest(_)
				| GtpMessageBody::DeleteBearerCommand(_)
				| GtpMessageBody::BearerResourceCommand(_)
				| GtpMessageBody::DownlinkDataNotification(_)
				| GtpMessageBody::ForwardRelocationRequest(_)
				| GtpMessageBody::ContextRequest(_)
				| GtpMessageBody::ForwardAccessContextNotification(_)
				| GtpMessageBody::ForwardRelocationCompleteNotification(_)
				| GtpMessageBody::RelocationCancelRequest(_)
		)
	}
}

/// The envelope every GTPv2-C datagram carries: a message body plus the
/// header fields the transaction layer correlates on. `teid` is the
/// receiving tunnel's local TEID, except on the very first Create Session
/// Request of a session, which carries TEID 0 (spec §5, "GTPv2-C common").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtpMessage {
	pub teid: u32,
	pub sequence_number: u32,
	pub body: GtpMessageBody,
}
