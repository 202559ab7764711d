//! Top-level engine error (spec §2): wraps the one or two ways bringing
//! the process up can fail. Per-procedure failures never reach here — they
//! are reported as NAS/S1AP/GTP causes to the peer that asked, not as a
//! Rust `Err` unwinding out of a task loop (spec §4.1: "no procedure calls
//! another task directly", so there is nowhere for such an error to
//! propagate to).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("failed to bind S11 transport: {0}")]
	S11Bind(#[source] gtp::TransportError),
	#[error("failed to bind S10 transport: {0}")]
	S10Bind(#[source] gtp::TransportError),
	#[error("failed to enqueue onto the message bus: {0}")]
	Bus(#[from] itti::SendError),
	/// `CoreInstance::initialize` is synchronous, but binding the S11/S10
	/// UDP sockets is not; a short-lived current-thread runtime drives
	/// those binds during construction, and only its own setup can fail
	/// here (the binds themselves surface as `S11Bind`/`S10Bind`).
	#[error("failed to start the runtime used to bind GTP sockets: {0}")]
	Runtime(#[source] std::io::Error),
}
