use std::{io::Error as IoError, net::SocketAddr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("failed to bind GTPv2-C socket on {0}")]
	Bind(SocketAddr, #[source] IoError),
	#[error("failed to send datagram to {0}")]
	Send(SocketAddr, #[source] IoError),
	#[error("failed to receive datagram")]
	Receive(#[source] IoError),
}

#[derive(Error, Debug)]
pub enum TransactionError {
	#[error("no tunnel endpoint registered for local TEID {0:#x}")]
	UnknownLocalTeid(u32),
	#[error("transport error")]
	Transport(#[from] TransportError),
	#[error("request exceeded its retransmission budget")]
	RetransmissionExhausted,
}
