//! ESM EBR (EPS Bearer Resource) sub-state transitions (SPEC_FULL.md §C,
//! grounded on `original_source/esm_ebr.c`'s `esm_ebr_set_status`): every
//! bearer moves through this table rather than having its
//! `model::bearer_context::EsmEbrState` field assigned freely.
//!
//! Also carries the ESM procedure correlation discriminator (spec §4.6's
//! redesign flag, resolved in SPEC_FULL.md open question 4): a network
//! triggered bearer procedure is identified by `Direction::NetworkTriggered
//! { ebi }`, a UE-triggered one by `Direction::UeTriggered { pti }`, never by
//! inspecting whether a PTI value happens to be zero.

use crate::model::bearer_context::EsmEbrState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	UeTriggered { pti: u8 },
	NetworkTriggered { ebi: u8 },
}

#[derive(Debug, thiserror::Error)]
#[error("illegal ESM EBR transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
	pub from: EsmEbrState,
	pub to: EsmEbrState,
}

/// Validates and returns the requested transition, mirroring
/// `esm_ebr_set_status`'s return-code contract: only the five transitions
/// the original enforces are legal, every other pair is rejected.
pub fn transition(
	current: EsmEbrState,
	requested: EsmEbrState,
) -> Result<EsmEbrState, IllegalTransition> {
	use EsmEbrState::*;
	let legal = matches!(
		(current, requested),
		(Inactive, ActivePending)
			| (ActivePending, Active)
			| (ActivePending, Inactive)
			| (Active, InactivePending)
			| (InactivePending, Inactive)
			| (Active, ModifyPending)
			| (ModifyPending, Active)
			| (ModifyPending, InactivePending)
	);
	if legal {
		Ok(requested)
	} else {
		Err(IllegalTransition { from: current, to: requested })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn activation_walks_inactive_through_active() {
		assert_eq!(transition(EsmEbrState::Inactive, EsmEbrState::ActivePending).unwrap(), EsmEbrState::ActivePending);
		assert_eq!(transition(EsmEbrState::ActivePending, EsmEbrState::Active).unwrap(), EsmEbrState::Active);
	}

	#[test]
	fn cannot_skip_pending_state() {
		assert!(transition(EsmEbrState::Inactive, EsmEbrState::Active).is_err());
	}

	#[test]
	fn modify_pending_only_leaves_active() {
		assert!(transition(EsmEbrState::Inactive, EsmEbrState::ModifyPending).is_err());
		assert_eq!(transition(EsmEbrState::Active, EsmEbrState::ModifyPending).unwrap(), EsmEbrState::ModifyPending);
	}
}
