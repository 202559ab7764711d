//! The concrete inter-task message catalog (spec §4.1): every payload that
//! travels across `itti::Bus<AppMessage>`. One variant per originating
//! subsystem, grounded on
//! `original_source/component/oai-mme/src/common/messages_def.h`'s
//! per-component message macro blocks (`MME_APP_*`, `NAS_*`, `S1AP_*`,
//! `S6A_*`).
//!
//! Every variant owns its fields directly (`String`/`Vec<u8>`/model types),
//! so there is no `itti_free_msg_content` counterpart to write: dropping an
//! `AppMessage` frees everything it owns through ordinary `Drop` glue.

use itti::TimerExpiry;

use crate::{
	model::ids::MmeUeS1apId,
	model::procedure::ProcedureId,
	nas::{EmmMessage, EsmMessage},
	s1ap::messages::{S1apAction, S1apIndication},
	s6a,
};

/// Which owning subsystem a fired timer belongs to, so the single
/// `AppMessage: From<TimerExpiry<TimerArg>>` impl the timer service
/// requires can still route the expiry to the right task's dispatch
/// logic (spec §4.2: one opaque handle/argument shape for every timer,
/// regardless of owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOwner {
	Emm,
	Esm,
	MmeApp,
}

/// Carried by every timer this engine creates: which UE and which
/// procedure asked for it (spec §4.2: "the argument pointer is returned
/// verbatim").
#[derive(Debug, Clone, Copy)]
pub struct TimerArg {
	pub owner: TimerOwner,
	pub ue_id: MmeUeS1apId,
	pub procedure_id: ProcedureId,
}

#[derive(Debug)]
pub enum EmmBusMessage {
	UplinkMessage { ue_id: MmeUeS1apId, message: EmmMessage },
	/// ESM's answer to an `EsmBusMessage::EmmTriggered` this task sent
	/// earlier, carrying whatever ESM message (Activate Default EPS Bearer
	/// Context Request, or a PDN Connectivity Reject) belongs in the
	/// Attach/TAU Accept/Reject this procedure is about to send (spec §4.1:
	/// EMM and ESM are separate tasks, so the ESM container they exchange
	/// during Attach/TAU travels as a bus message, never a direct call).
	EsmContainerReady { ue_id: MmeUeS1apId, procedure_id: ProcedureId, esm_message: EsmMessage },
	TimerExpired(TimerArg),
}

#[derive(Debug)]
pub enum EsmBusMessage {
	UplinkMessage { ue_id: MmeUeS1apId, message: EsmMessage },
	/// An ESM request carried inline in an Attach/TAU Request's ESM
	/// container: ESM processes it as an ordinary PDN Connectivity Request
	/// and answers with `EmmBusMessage::EsmContainerReady` instead of a
	/// downlink NAS transport of its own.
	EmmTriggered { ue_id: MmeUeS1apId, procedure_id: ProcedureId, esm_message: EsmMessage },
	NetworkTriggered { ue_id: MmeUeS1apId, request: NetworkTriggeredEsmRequest },
	/// mme_app's answer to an `MmeAppBusMessage::EsmSessionRequest` this
	/// task sent earlier (spec §4.7: mme_app owns the S11 round-trip; ESM
	/// owns the NAS-side transaction it unblocks), correlated by
	/// `procedure_id`.
	SessionOutcome { ue_id: MmeUeS1apId, procedure_id: ProcedureId, event: GtpSessionEvent },
	TimerExpired(TimerArg),
}

/// What `MmeAppBusMessage::EsmSessionRequest` asks mme_app's session
/// orchestration to do on ESM's behalf (spec §4.7: "Builds and sends S11
/// Create Session Request, Modify Bearer Request, Delete Session Request,
/// Release Access Bearers Request ... translating between the internal
/// bearer-context representation and the GTPv2-C payload" — ESM supplies
/// the already-translated payload, mme_app only owns the wire round-trip).
#[derive(Debug, Clone)]
pub enum EsmSessionRequest {
	CreateSession(gtp::CreateSessionRequest),
	ModifyBearer(gtp::ModifyBearerRequest),
	DeleteSession(gtp::DeleteSessionRequest),
	ReleaseAccessBearers,
	/// ESM's answer to a `NetworkTriggered` request, to be relayed back to
	/// the SGW on whatever tunnel mme_app cached when it forwarded the
	/// original request (spec §4.7's "at most one S11 procedure ... at a
	/// time" per UE makes a single pending-request slot sufficient).
	CreateBearerResponse(gtp::CreateBearerResponse),
	UpdateBearerResponse(gtp::UpdateBearerResponse),
	DeleteBearerResponse(gtp::DeleteBearerResponse),
	/// A UE-initiated Bearer Resource Allocation Request, forwarded to the
	/// SGW/PGW as a standalone S11 command rather than a request/response
	/// pair: the network's answer, if any, arrives later as an ordinary
	/// network-triggered Create/Update Bearer Request (spec §4.6).
	BearerResourceCommand(gtp::BearerResourceCommand),
}

/// SGW-originated ESM-layer requests (Create/Update/Delete Bearer Request),
/// already correlated to a UE by the GTP transaction layer's tunnel map
/// (spec §4.6's network-triggered procedure family).
#[derive(Debug, Clone)]
pub enum NetworkTriggeredEsmRequest {
	CreateBearer(gtp::CreateBearerRequest),
	UpdateBearer(gtp::UpdateBearerRequest),
	DeleteBearer(gtp::DeleteBearerRequest),
	DeleteBearerCommand(gtp::DeleteBearerCommand),
}

#[derive(Debug)]
pub enum MmeAppBusMessage {
	S1apIndication { assoc_teid: Option<u32>, indication: S1apIndication },
	GtpSessionResponse { ue_id: MmeUeS1apId, response: GtpSessionEvent },
	HssAnswer { ue_id: MmeUeS1apId, answer: HssAnswerEvent },
	/// ESM asking mme_app's session orchestration to perform an S11
	/// round-trip on its behalf (spec §4.7); answered with
	/// `EsmBusMessage::SessionOutcome` once mme_app's GTP ULP callback
	/// reports the correlated response.
	EsmSessionRequest { ue_id: MmeUeS1apId, procedure_id: ProcedureId, request: EsmSessionRequest },
	TimerExpired(TimerArg),
}

#[derive(Debug, Clone)]
pub enum GtpSessionEvent {
	CreateSessionResponse(gtp::CreateSessionResponse),
	ModifyBearerResponse(gtp::ModifyBearerResponse),
	DeleteSessionResponse(gtp::DeleteSessionResponse),
	ReleaseAccessBearersResponse(gtp::ReleaseAccessBearersResponse),
	/// S10 inter-MME handover response (spec §4.7's "Forward Relocation
	/// Request/Response"), routed through the same `GtpSessionResponse`
	/// path as the S11 session events above since both arrive via the
	/// same `UlpCallback::triggered_response` seam.
	ForwardRelocationResponse(gtp::ForwardRelocationResponse),
	PeerNotResponding,
}

#[derive(Debug, Clone)]
pub enum HssAnswerEvent {
	AuthenticationInformationAnswer(Result<s6a::AuthenticationInformationAnswer, s6a::S6aError>),
	UpdateLocationAnswer(Result<s6a::UpdateLocationAnswer, s6a::S6aError>),
}

#[derive(Debug)]
pub enum S1apBusMessage {
	Outgoing(S1apAction),
}

/// The instantiated bus payload (spec §4.1's `Message` envelope's `msg`
/// union, here a closed Rust enum instead of a tagged C union). There is no
/// `Gtp` task variant: the GTPv2-C transaction layer is driven directly by
/// its transport's `recv_from` loop and `gtp_ulp::GtpUlp`'s `UlpCallback`
/// impl, never by a bus queue of its own (spec §4.3 sits below the bus in
/// the component order, §2).
#[derive(Debug)]
pub enum AppMessage {
	Emm(EmmBusMessage),
	Esm(EsmBusMessage),
	MmeApp(MmeAppBusMessage),
	S1ap(S1apBusMessage),
}

impl From<TimerExpiry<TimerArg>> for AppMessage {
	fn from(expiry: TimerExpiry<TimerArg>) -> Self {
		match expiry.arg.owner {
			TimerOwner::Emm => AppMessage::Emm(EmmBusMessage::TimerExpired(expiry.arg)),
			TimerOwner::Esm => AppMessage::Esm(EsmBusMessage::TimerExpired(expiry.arg)),
			TimerOwner::MmeApp => AppMessage::MmeApp(MmeAppBusMessage::TimerExpired(expiry.arg)),
		}
	}
}
