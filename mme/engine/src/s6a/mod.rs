//! S6a interface contracts (spec §6): the HSS Diameter client is an
//! external collaborator (Non-goal); this module specifies the
//! request/answer shapes the EMM CN-triggered procedures
//! (`emm::cn_triggered`) drive against it, grounded on the teacher's
//! `client::nrf_client` request/response pairing style adapted to
//! Diameter's ULA/AIA/CLR/RSR/NOA exchange instead of SBI.

use crate::model::{emm_data::AuthenticationVector, ids::Imsi};

pub const MAX_EPS_AUTH_VECTORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberStatus {
	Operative,
	Barred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAccessMode {
	PacketAndCircuit,
	OnlyPacket,
}

/// One entry of `subscription_data.apn_config_profile` (spec §6).
#[derive(Debug, Clone)]
pub struct ApnConfig {
	pub context_id: u8,
	pub apn: String,
	pub pdn_type: gtp::PdnType,
	pub is_default: bool,
	pub subscribed_apn_ambr_ul_kbps: u64,
	pub subscribed_apn_ambr_dl_kbps: u64,
	pub subscribed_qci: u8,
	pub static_ip: Option<std::net::IpAddr>,
}

/// Returned by Update Location Answer (spec §6).
#[derive(Debug, Clone)]
pub struct SubscriptionData {
	pub subscriber_status: SubscriberStatus,
	pub network_access_mode: NetworkAccessMode,
	pub rau_tau_timer_secs: u32,
	pub apn_config_profile: Vec<ApnConfig>,
	pub subscribed_ue_ambr_ul_kbps: u64,
	pub subscribed_ue_ambr_dl_kbps: u64,
}

#[derive(Debug, Clone)]
pub struct UpdateLocationRequest {
	pub imsi: Imsi,
	pub visited_plmn_id: mme_config::PlmnId,
}

#[derive(Debug, Clone)]
pub struct UpdateLocationAnswer {
	pub subscription_data: SubscriptionData,
}

#[derive(Debug, Clone)]
pub struct AuthenticationInformationRequest {
	pub imsi: Imsi,
	pub visited_plmn_id: mme_config::PlmnId,
	pub requested_vectors: u8,
}

#[derive(Debug, Clone)]
pub struct AuthenticationInformationAnswer {
	pub vectors: Vec<AuthenticationVector>,
}

#[derive(Debug, Clone)]
pub struct CancelLocationRequest {
	pub imsi: Imsi,
	pub cancellation_type: CancellationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationType {
	MmeUpdateProcedure,
	SubscriptionWithdrawal,
}

#[derive(Debug, Clone)]
pub struct ResetRequest {
	pub affected_imsis: Vec<Imsi>,
}

#[derive(Debug, Clone)]
pub struct NotifyRequest {
	pub imsi: Imsi,
}

#[derive(Debug, thiserror::Error)]
pub enum S6aError {
	#[error("HSS reported diameter experimental result code {0}")]
	DiameterError(u32),
	#[error("HSS unreachable")]
	Unreachable,
}

/// External collaborator (Non-goal: "the HSS Diameter client"); only the
/// contract this core drives is specified here.
#[async_trait::async_trait]
pub trait HssClient: Send + Sync + 'static {
	async fn update_location(
		&self,
		request: UpdateLocationRequest,
	) -> Result<UpdateLocationAnswer, S6aError>;

	async fn authentication_information(
		&self,
		request: AuthenticationInformationRequest,
	) -> Result<AuthenticationInformationAnswer, S6aError>;

	async fn notify(
		&self,
		request: NotifyRequest,
	) -> Result<(), S6aError>;
}

/// A runnable stand-in (Non-goal: the HSS Diameter client) backed by an
/// in-memory subscriber table, fixed at construction time, the S6a
/// equivalent of `gtp::UdpJsonTransport`: enough to drive Attach/TAU
/// end-to-end against a known set of test subscribers without a real
/// Diameter peer.
#[derive(Debug, Default)]
pub struct StaticHssClient {
	subscribers: scc::HashMap<String, SubscriptionData, rustc_hash::FxBuildHasher>,
}

impl StaticHssClient {
	pub fn new() -> Self {
		Self { subscribers: scc::HashMap::with_hasher(rustc_hash::FxBuildHasher::default()) }
	}

	pub async fn provision(
		&self,
		imsi: Imsi,
		data: SubscriptionData,
	) {
		let _ = self.subscribers.upsert_async(imsi.as_str().to_owned(), data).await;
	}
}

#[async_trait::async_trait]
impl HssClient for StaticHssClient {
	async fn update_location(
		&self,
		request: UpdateLocationRequest,
	) -> Result<UpdateLocationAnswer, S6aError> {
		let subscription_data = self
			.subscribers
			.get_async(request.imsi.as_str())
			.await
			.map(|entry| entry.get().clone())
			.ok_or(S6aError::DiameterError(5001))?; // DIAMETER_ERROR_USER_UNKNOWN
		Ok(UpdateLocationAnswer { subscription_data })
	}

	async fn authentication_information(
		&self,
		_request: AuthenticationInformationRequest,
	) -> Result<AuthenticationInformationAnswer, S6aError> {
		Ok(AuthenticationInformationAnswer { vectors: Vec::new() })
	}

	async fn notify(
		&self,
		_request: NotifyRequest,
	) -> Result<(), S6aError> {
		Ok(())
	}
}
