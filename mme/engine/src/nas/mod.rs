//! NAS message boundary (spec §4.8/§6): decoded EMM/ESM message types and
//! the `NasCodec` trait seam to the external encode/decode collaborator.

pub mod codec;
pub mod messages;

pub use codec::{JsonNasCodec, NasCodec, NasCodecError, NasSecurityContext, UplinkNas};
pub use messages::{EmmMessage, EpsAttachType, EsmMessage};
