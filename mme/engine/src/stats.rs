//! Process-wide counters (SPEC_FULL.md §C supplemented feature, grounded on
//! the `nb_ue_attached_since_last_stat`/`nb_ue_connected_since_last_stat`/...
//! periodic counters
//! `original_source/component/oai-mme/src/mme_app/mme_app_defs.h` declares):
//! plain relaxed atomics rather than a metrics-backend integration, since
//! observability backends are carried only as far as `tracing` (ambient
//! stack), not as a full metrics pipeline (Non-goal).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
	pub attach_attempts: AtomicU64,
	pub attach_successes: AtomicU64,
	pub attach_failures: AtomicU64,
	pub detach_procedures: AtomicU64,
	pub tau_procedures: AtomicU64,
	pub service_requests: AtomicU64,
	pub pdn_connectivity_successes: AtomicU64,
	pub pdn_connectivity_failures: AtomicU64,
	pub active_ue_contexts: AtomicU64,
	pub s1ap_signalling_connections: AtomicU64,
}

impl EngineStats {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_attach_attempt(&self) {
		self.attach_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_attach_outcome(
		&self,
		success: bool,
	) {
		if success {
			self.attach_successes.fetch_add(1, Ordering::Relaxed);
		} else {
			self.attach_failures.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_detach(&self) {
		self.detach_procedures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_tau(&self) {
		self.tau_procedures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_service_request(&self) {
		self.service_requests.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_pdn_connectivity_outcome(
		&self,
		success: bool,
	) {
		if success {
			self.pdn_connectivity_successes.fetch_add(1, Ordering::Relaxed);
		} else {
			self.pdn_connectivity_failures.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_ue_context_created(&self) {
		self.active_ue_contexts.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_ue_context_removed(&self) {
		self.active_ue_contexts.fetch_sub(1, Ordering::Relaxed);
	}

	pub fn record_s1ap_connection_established(&self) {
		self.s1ap_signalling_connections.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_s1ap_connection_released(&self) {
		self.s1ap_signalling_connections.fetch_sub(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> EngineStatsSnapshot {
		EngineStatsSnapshot {
			attach_attempts: self.attach_attempts.load(Ordering::Relaxed),
			attach_successes: self.attach_successes.load(Ordering::Relaxed),
			attach_failures: self.attach_failures.load(Ordering::Relaxed),
			detach_procedures: self.detach_procedures.load(Ordering::Relaxed),
			tau_procedures: self.tau_procedures.load(Ordering::Relaxed),
			service_requests: self.service_requests.load(Ordering::Relaxed),
			pdn_connectivity_successes: self.pdn_connectivity_successes.load(Ordering::Relaxed),
			pdn_connectivity_failures: self.pdn_connectivity_failures.load(Ordering::Relaxed),
			active_ue_contexts: self.active_ue_contexts.load(Ordering::Relaxed),
			s1ap_signalling_connections: self.s1ap_signalling_connections.load(Ordering::Relaxed),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EngineStatsSnapshot {
	pub attach_attempts: u64,
	pub attach_successes: u64,
	pub attach_failures: u64,
	pub detach_procedures: u64,
	pub tau_procedures: u64,
	pub service_requests: u64,
	pub pdn_connectivity_successes: u64,
	pub pdn_connectivity_failures: u64,
	pub active_ue_contexts: u64,
	pub s1ap_signalling_connections: u64,
}
