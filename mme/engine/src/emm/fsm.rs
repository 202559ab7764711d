//! Explicit EMM state-machine transition function (spec §5, redesigned per
//! spec §9's own note: "a tagged variant plus a `match` on it replaces
//! dynamic dispatch through a state-pattern trait object" — `EmmState`
//! itself, defined on `UeContext`, is the tagged variant; this module is
//! the `match`).
//!
//! `EmmState` carries exactly the four top-level states 3GPP TS 24.301
//! Annex C.2 defines for the network side: `DEREGISTERED`,
//! `COMMON-PROCEDURE-INITIATED`, `REGISTERED`, `DEREGISTERED-INITIATED`.
//! Attach/TAU/Service-Request do not get their own top state — they run as
//! `Procedure` records while the top state stays `Deregistered`/
//! `Registered`; only a *nested* common procedure (Authentication,
//! Security Mode Control, Identification, GUTI Reallocation) bumps the
//! top state, and only for its own duration.

use crate::model::ue_context::EmmState;

#[derive(Debug, thiserror::Error)]
#[error("cannot {action} while EMM state is {state:?}")]
pub struct EmmFsmError {
	pub state: EmmState,
	pub action: &'static str,
}

fn requires(
	state: EmmState,
	expected: EmmState,
	action: &'static str,
) -> Result<(), EmmFsmError> {
	if state == expected { Ok(()) } else { Err(EmmFsmError { state, action }) }
}

/// An Attach Request is only accepted from `Deregistered` (spec §8
/// scenario 1's Attach collision table: an Attach Request while another
/// Attach is already running for the same UE is handled by the procedure
/// layer re-using the existing record, not by the FSM).
pub fn can_start_attach(state: EmmState) -> Result<(), EmmFsmError> {
	requires(state, EmmState::Deregistered, "start Attach")
}

pub fn on_attach_accepted() -> EmmState {
	EmmState::Registered
}

pub fn on_attach_rejected() -> EmmState {
	EmmState::Deregistered
}

/// UE- or network-initiated Detach may be requested from `Registered` or,
/// for a network-initiated implicit detach cleanup, from
/// `Deregistered`/`CommonProcedureInitiated` too (spec §8's implicit
/// detach on exhausted retries can fire mid common-procedure).
pub fn can_start_detach(state: EmmState) -> Result<(), EmmFsmError> {
	match state {
		EmmState::Registered | EmmState::Deregistered | EmmState::CommonProcedureInitiated => Ok(()),
		EmmState::DeregisteredInitiated => Err(EmmFsmError { state, action: "start Detach" }),
	}
}

pub fn on_detach_initiated() -> EmmState {
	EmmState::DeregisteredInitiated
}

pub fn on_detach_completed() -> EmmState {
	EmmState::Deregistered
}

/// Exhausting a retransmission budget (Attach T3450, or NAS-count
/// overflow) drives an immediate local cleanup rather than running the
/// full Detach exchange (spec §8).
pub fn on_implicit_detach() -> EmmState {
	EmmState::Deregistered
}

pub fn can_start_tau(state: EmmState) -> Result<(), EmmFsmError> {
	requires(state, EmmState::Registered, "start Tracking Area Update")
}

pub fn can_start_service_request(state: EmmState) -> Result<(), EmmFsmError> {
	requires(state, EmmState::Registered, "start Service Request")
}

/// A common procedure (Authentication/SMC/Identification/GUTI
/// Reallocation) may be started as a child of Attach, TAU, Service
/// Request, or Detach while any of those are in flight — i.e. from any
/// state except already being in one (spec §5: common procedures do not
/// nest inside each other).
pub fn begin_common_procedure(current: EmmState) -> Result<(EmmState, EmmState), EmmFsmError> {
	if current == EmmState::CommonProcedureInitiated {
		return Err(EmmFsmError { state: current, action: "start a nested common procedure" });
	}
	Ok((EmmState::CommonProcedureInitiated, current))
}

/// Restores whatever state `begin_common_procedure` recorded as
/// `previous_emm_fsm_state` on the procedure record (spec §3's "restored
/// on abort/timeout if the FSM transitioned speculatively").
pub fn end_common_procedure(previous: EmmState) -> EmmState {
	previous
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn attach_only_starts_from_deregistered() {
		assert!(can_start_attach(EmmState::Deregistered).is_ok());
		assert!(can_start_attach(EmmState::Registered).is_err());
	}

	#[test]
	fn common_procedure_round_trips_through_previous_state() {
		let (next, previous) = begin_common_procedure(EmmState::Registered).unwrap();
		assert_eq!(next, EmmState::CommonProcedureInitiated);
		assert_eq!(end_common_procedure(previous), EmmState::Registered);
	}

	#[test]
	fn nested_common_procedure_is_rejected() {
		assert!(begin_common_procedure(EmmState::CommonProcedureInitiated).is_err());
	}
}
