//! The session/bearer data model (spec §3): UE context, session pool, PDN
//! context, bearer context, and the procedure records the EMM/ESM engines
//! hang off them.
//!
//! Ownership rules follow spec §3 verbatim: a UE context exclusively owns
//! its EMM data context, session pool, and procedures; a session pool
//! exclusively owns its PDN contexts; a PDN context exclusively owns its
//! bearers. Index maps (`store::UeContextStore`) hold non-owning keys only.

pub mod bearer_context;
pub mod emm_data;
pub mod ids;
pub mod pdn_context;
pub mod procedure;
pub mod session_pool;
pub mod ue_context;

pub use bearer_context::{BearerContext, BearerFlags, EsmEbrState};
pub use emm_data::EmmDataContext;
pub use ids::{Ecgi, EnbS1apIdKey, Guti, Imsi, MmeUeS1apId, PlmnId, Tai};
pub use pdn_context::PdnContext;
pub use procedure::{Procedure, ProcedureId};
pub use session_pool::SessionPool;
pub use ue_context::{EcmState, EmmState, ReleaseCause, UeContext};
