use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::{error::TransportError, message::GtpMessage};

/// The boundary between this layer and the bit-level GTPv2-C wire format,
/// which spec §1 places out of scope alongside the UDP transport itself.
/// A real deployment plugs in a TLV encoder/decoder over a bound
/// `UdpSocket`; [`UdpJsonTransport`] stands in for both with a
/// `serde_json`-encoded payload, giving the transaction layer above
/// something concrete to drive and test against.
#[async_trait]
pub trait GtpTransport: Send + Sync + 'static {
	async fn send_to(
		&self,
		peer: SocketAddr,
		message: &GtpMessage,
	) -> Result<(), TransportError>;

	async fn recv_from(&self) -> Result<(GtpMessage, SocketAddr), TransportError>;

	fn local_addr(&self) -> SocketAddr;
}

pub struct UdpJsonTransport {
	socket: UdpSocket,
	local_addr: SocketAddr,
}

impl UdpJsonTransport {
	pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
		let socket = UdpSocket::bind(addr).await.map_err(|err| TransportError::Bind(addr, err))?;
		let local_addr = socket.local_addr().map_err(|err| TransportError::Bind(addr, err))?;
		Ok(Self { socket, local_addr })
	}
}

#[async_trait]
impl GtpTransport for UdpJsonTransport {
	async fn send_to(
		&self,
		peer: SocketAddr,
		message: &GtpMessage,
	) -> Result<(), TransportError> {
		let encoded = serde_json::to_vec(message).expect("GtpMessage is always serializable");
		self.socket
			.send_to(&encoded, peer)
			.await
			.map(|_| ())
			.map_err(|err| TransportError::Send(peer, err))
	}

	async fn recv_from(&self) -> Result<(GtpMessage, SocketAddr), TransportError> {
		let mut buf = vec![0u8; 65536];
		let (len, peer) = self.socket.recv_from(&mut buf).await.map_err(TransportError::Receive)?;
		let message: GtpMessage =
			serde_json::from_slice(&buf[..len]).map_err(|_| TransportError::Receive(std::io::Error::from(std::io::ErrorKind::InvalidData)))?;
		Ok((message, peer))
	}

	fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}
}

/// Lets `TransactionLayer<T, _>` be instantiated with `T = Arc<dyn
/// GtpTransport>`, so a process can pick its transport at runtime instead
/// of fixing it at the type level.
#[async_trait]
impl GtpTransport for std::sync::Arc<dyn GtpTransport> {
	async fn send_to(
		&self,
		peer: SocketAddr,
		message: &GtpMessage,
	) -> Result<(), TransportError> {
		(**self).send_to(peer, message).await
	}

	async fn recv_from(&self) -> Result<(GtpMessage, SocketAddr), TransportError> {
		(**self).recv_from().await
	}

	fn local_addr(&self) -> SocketAddr {
		(**self).local_addr()
	}
}
