//! GTPv2-C transaction layer (spec §4.3): local TEID allocation, wire
//! message catalog, transport seam, and the generic per-entity
//! serialization primitive (`ContextQueue`/`ContextManager`) reused by both
//! the tunnel endpoint map here and the UE context store in `mme-engine`.

mod context_manager;
mod context_queue;
mod error;
mod message;
mod transport;

pub mod transaction;

pub use context_manager::{ContextManager, Identifiable};
pub use context_queue::ContextQueue;
pub use error::{TransactionError, TransportError};
pub use message::{
	BearerContextIe,
	BearerResourceCommand,
	Cause,
	ContextAcknowledge,
	ContextRequest,
	ContextResponse,
	CreateBearerRequest,
	CreateBearerResponse,
	CreateSessionRequest,
	CreateSessionResponse,
	DeleteBearerCommand,
	DeleteBearerFailureIndication,
	DeleteBearerRequest,
	DeleteBearerResponse,
	DeleteSessionRequest,
	DeleteSessionResponse,
	DownlinkDataNotification,
	DownlinkDataNotificationAcknowledge,
	EchoRequest,
	EchoResponse,
	FTeid,
	ForwardAccessContextAcknowledge,
	ForwardAccessContextNotification,
	ForwardRelocationCompleteAcknowledge,
	ForwardRelocationCompleteNotification,
	ForwardRelocationRequest,
	ForwardRelocationResponse,
	GtpMessage,
	GtpMessageBody,
	ModifyBearerRequest,
	ModifyBearerResponse,
	PdnType,
	ReleaseAccessBearersRequest,
	ReleaseAccessBearersResponse,
	RelocationCancelRequest,
	RelocationCancelResponse,
	UpdateBearerRequest,
	UpdateBearerResponse,
};
pub use transaction::{Backoff, RetransmissionPolicy, TransactionLayer, UlpCallback};
pub use transport::{GtpTransport, UdpJsonTransport};
