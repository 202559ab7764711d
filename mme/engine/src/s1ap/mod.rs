//! S1AP adaptor boundary (spec §4.8 + §6): the decoded PDU catalog
//! (`messages.rs`) and the external transport seam. ASN.1 PER encode/decode
//! and SCTP transport are both Non-goals; only the contract the core drives
//! against them is specified here, mirroring how `gtp::GtpTransport` seams
//! off UDP for the GTPv2-C side.

pub mod messages;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ids::EnbS1apIdKey;
use messages::S1apAction;

#[derive(Debug, Error)]
pub enum S1apTransportError {
	#[error("no SCTP association for eNB key {0:?}")]
	NoAssociation(EnbS1apIdKey),
	#[error("transport send failed: {0}")]
	Send(String),
}

/// External collaborator (Non-goal: "SCTP and UDP transports" / "ASN.1 PER
/// codec for S1AP messages"). A concrete implementation encodes `action`
/// into a PDU and hands the bytes to SCTP on the association addressed by
/// the eNB key embedded in it.
#[async_trait]
pub trait S1apTransport: Send + Sync + 'static {
	async fn send(
		&self,
		action: S1apAction,
	) -> Result<(), S1apTransportError>;
}

/// A runnable stand-in (Non-goal: SCTP transport, ASN.1 PER codec): logs
/// every outgoing action instead of encoding and placing it on an SCTP
/// association, the S1AP equivalent of `gtp::UdpJsonTransport` standing in
/// for the wire format below the transaction layer.
#[derive(Debug, Default)]
pub struct LoggingS1apTransport;

#[async_trait]
impl S1apTransport for LoggingS1apTransport {
	async fn send(
		&self,
		action: S1apAction,
	) -> Result<(), S1apTransportError> {
		tracing::info!(?action, "S1AP action (no SCTP transport configured)");
		Ok(())
	}
}
