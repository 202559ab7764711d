//! The NAS encode/decode boundary (spec §6: "NAS messages ... opaque to
//! the core; the EMM/ESM engines invoke external encode/decode"). This
//! crate only ever handles `EmmMessage`/`EsmMessage` — already-decoded
//! values — and hands opaque bytes to/from a `NasCodec` implementation,
//! the same seam shape as `gtp::GtpTransport` and the teacher's
//! `NgapWriteError`/`ToNgapPdu` boundary to `asn1-per`.

use thiserror::Error;

use crate::nas::messages::{EmmMessage, EsmMessage};

#[derive(Debug, Error)]
pub enum NasCodecError {
	#[error("failed to decode NAS PDU")]
	Decode,
	#[error("failed to encode NAS PDU")]
	Encode,
	#[error("integrity check failed")]
	IntegrityCheckFailed,
}

/// Security context a `NasCodec` needs to apply integrity/ciphering
/// before handoff to SCTP (spec §6: "Integrity and ciphering are applied
/// at a well-defined boundary before handoff to SCTP").
#[derive(Debug, Clone)]
pub struct NasSecurityContext {
	pub eea: u8,
	pub eia: u8,
	pub knas_enc: Vec<u8>,
	pub knas_int: Vec<u8>,
	pub ul_count: u32,
	pub dl_count: u32,
}

/// Which protocol a decoded uplink NAS PDU belongs to (3GPP TS 24.007's
/// "EPS Mobility Management messages"/"EPS Session Management messages"
/// protocol discriminator), so `mme_app::s1ap_adaptor` can route a
/// decoded Uplink NAS Transport to the EMM or ESM task without inspecting
/// message internals itself.
#[derive(Debug)]
pub enum UplinkNas {
	Emm(EmmMessage),
	Esm(EsmMessage),
}

/// External collaborator for NAS bit-level encode/decode (Non-goal, spec
/// §1/§4.8's "ASN.1 PER codec ... NAS message encode/decode ... treated as
/// opaque"). A concrete implementation lives outside this crate; only the
/// contract is specified here.
pub trait NasCodec: Send + Sync + 'static {
	fn decode_emm(
		&self,
		bytes: &[u8],
		security: Option<&NasSecurityContext>,
	) -> Result<EmmMessage, NasCodecError>;

	fn encode_emm(
		&self,
		message: &EmmMessage,
		security: Option<&NasSecurityContext>,
	) -> Result<Vec<u8>, NasCodecError>;

	fn decode_esm(
		&self,
		bytes: &[u8],
	) -> Result<EsmMessage, NasCodecError>;

	fn encode_esm(
		&self,
		message: &EsmMessage,
	) -> Result<Vec<u8>, NasCodecError>;

	/// Decodes a PDU whose protocol discriminator is not known up front
	/// (every Initial UE Message / Uplink NAS Transport, which can carry
	/// either an EMM message or a standalone ESM message such as a PDN
	/// Connectivity Request sent outside Attach). The default reads the
	/// discriminator `decode_emm`/`decode_esm` themselves would otherwise
	/// each have to re-derive, by attempting EMM first (the common case)
	/// and falling back to ESM.
	fn decode_uplink(
		&self,
		bytes: &[u8],
		security: Option<&NasSecurityContext>,
	) -> Result<UplinkNas, NasCodecError> {
		if let Ok(emm) = self.decode_emm(bytes, security) {
			return Ok(UplinkNas::Emm(emm));
		}
		self.decode_esm(bytes).map(UplinkNas::Esm)
	}
}

/// A runnable stand-in for the real bit-level codec (Non-goal), the NAS
/// equivalent of `gtp::UdpJsonTransport`: wraps already-decoded messages in
/// `serde_json` rather than 3GPP TS 24.301's packed IE encoding, ignoring
/// `NasSecurityContext` entirely (there is no ciphering/integrity to apply
/// to JSON). Useful to bring an `Engine` up end to end without a real
/// ASN.1/NAS codec plugged in.
#[derive(Debug, Default)]
pub struct JsonNasCodec;

impl NasCodec for JsonNasCodec {
	fn decode_emm(
		&self,
		bytes: &[u8],
		_security: Option<&NasSecurityContext>,
	) -> Result<EmmMessage, NasCodecError> {
		serde_json::from_slice(bytes).map_err(|_| NasCodecError::Decode)
	}

	fn encode_emm(
		&self,
		message: &EmmMessage,
		_security: Option<&NasSecurityContext>,
	) -> Result<Vec<u8>, NasCodecError> {
		serde_json::to_vec(message).map_err(|_| NasCodecError::Encode)
	}

	fn decode_esm(
		&self,
		bytes: &[u8],
	) -> Result<EsmMessage, NasCodecError> {
		serde_json::from_slice(bytes).map_err(|_| NasCodecError::Decode)
	}

	fn encode_esm(
		&self,
		message: &EsmMessage,
	) -> Result<Vec<u8>, NasCodecError> {
		serde_json::to_vec(message).map_err(|_| NasCodecError::Encode)
	}
}
