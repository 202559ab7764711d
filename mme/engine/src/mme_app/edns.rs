//! eDNS/WRR peer selection (spec §4.7, SPEC_FULL.md §C supplemented
//! feature): picks which SGW/MME peer a session-management round trip goes
//! to, given the UE's current TAC and (for SGW selection) the requested
//! APN. Grounded on `original_source/mme_app_edns_emulation.c`'s TAC/APN
//! lookup and `mme_app_wrr_selection.c`'s weighted-round-robin candidate
//! pick.
//!
//! `mme_app_wrr_selection.c` draws its candidate with a seeded PRNG; no
//! `rand` crate is part of this workspace's dependency stack, so selection
//! here is a deterministic weighted round robin instead: a process-wide
//! counter advances through each entry's candidates in proportion to their
//! configured weight. Over many selections the distribution matches the
//! configured weights exactly rather than approximately, which is a
//! reasonable trade for losing call-to-call randomness.

use std::net::SocketAddr;

use counter::CounterU64;
use mme_config::{EdnsConfig, EdnsEntry, WeightedPeer};

/// One process-wide WRR cursor per `EdnsConfig`; `mme_app::MmeAppServices`
/// holds one for SGW selection and one for MME (S10) selection.
#[derive(Debug, Default)]
pub struct WrrCursor {
	counter: CounterU64,
}

impl WrrCursor {
	pub fn new() -> Self {
		Self { counter: CounterU64::new() }
	}

	/// Picks the entry matching `tac` (and, if the entry restricts it, the
	/// given `apn`), then walks its weighted candidate list.
	pub fn select<'a>(
		&self,
		entries: &'a [EdnsEntry],
		tac: u16,
		apn: Option<&str>,
	) -> Option<SocketAddr> {
		let entry = entries.iter().find(|entry| entry.tac == tac && apn_matches(entry, apn))?;
		let peer = self.pick_weighted(&entry.candidates)?;
		Some(SocketAddr::new(peer.address, peer.port))
	}

	fn pick_weighted<'a>(
		&self,
		candidates: impl IntoIterator<Item = &'a WeightedPeer>,
	) -> Option<&'a WeightedPeer> {
		let candidates: Vec<&WeightedPeer> = candidates.into_iter().collect();
		let total_weight: u64 = candidates.iter().map(|peer| peer.weight as u64).sum();
		if total_weight == 0 {
			return candidates.into_iter().next();
		}
		let mut cursor = self.counter.increment() % total_weight;
		for peer in &candidates {
			let weight = peer.weight as u64;
			if cursor < weight {
				return Some(peer);
			}
			cursor -= weight;
		}
		candidates.into_iter().last()
	}
}

fn apn_matches(
	entry: &EdnsEntry,
	apn: Option<&str>,
) -> bool {
	match (&entry.apn, apn) {
		(Some(entry_apn), Some(requested)) => entry_apn == requested,
		(Some(_), None) => false,
		(None, _) => true,
	}
}

/// Selects an SGW peer for a new or ongoing session (spec §4.7's S11
/// Create Session Request destination).
pub fn select_sgw_peer(
	config: &EdnsConfig,
	cursor: &WrrCursor,
	tac: u16,
	apn: &str,
) -> Option<SocketAddr> {
	cursor.select(&config.sgw_entries, tac, Some(apn))
}

/// Selects a peer MME for an S10 inter-MME procedure (spec §4.7,
/// handover/TAU-with-old-MME).
pub fn select_mme_peer(
	config: &EdnsConfig,
	cursor: &WrrCursor,
	tac: u16,
) -> Option<SocketAddr> {
	cursor.select(&config.mme_entries, tac, None)
}

#[cfg(test)]
mod tests {
	use nonempty::NonEmpty;

	use super::*;

	fn entry(tac: u16, weights: &[u8]) -> EdnsEntry {
		let mut candidates: Vec<WeightedPeer> = weights
			.iter()
			.enumerate()
			.map(|(i, weight)| WeightedPeer { address: format!("127.0.0.{}", i + 1).parse().unwrap(), port: 2123, weight: *weight })
			.collect();
		let first = candidates.remove(0);
		EdnsEntry { tac, apn: None, candidates: NonEmpty::from((first, candidates)) }
	}

	#[test]
	fn selection_respects_weight_proportions() {
		let cursor = WrrCursor::new();
		let entries = vec![entry(100, &[3, 1])];
		let mut heavy = 0;
		let mut light = 0;
		for _ in 0..40 {
			let peer = cursor.select(&entries, 100, None).unwrap();
			if peer.port() == 2123 && peer.ip().to_string() == "127.0.0.1" {
				heavy += 1;
			} else {
				light += 1;
			}
		}
		assert_eq!(heavy, 30);
		assert_eq!(light, 10);
	}

	#[test]
	fn no_entry_for_tac_returns_none() {
		let cursor = WrrCursor::new();
		let entries = vec![entry(100, &[1])];
		assert!(cursor.select(&entries, 200, None).is_none());
	}

	#[test]
	fn apn_restricted_entry_only_matches_its_apn() {
		let cursor = WrrCursor::new();
		let mut restricted = entry(100, &[1]);
		restricted.apn = Some("internet".to_string());
		let entries = vec![restricted];
		assert!(cursor.select(&entries, 100, Some("ims")).is_none());
		assert!(cursor.select(&entries, 100, Some("internet")).is_some());
	}
}
