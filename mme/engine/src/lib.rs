//! The LTE/EPC MME core (spec §2): wires the EMM/ESM state machines, the
//! UE context store, mme_app's S1AP/S11/S10 orchestration, and the
//! GTPv2-C transaction layers into one runnable [`Engine`].
//!
//! Grounded on the teacher's `omnipath-app` crate shape: a thin `lib.rs`
//! declaring the subsystem modules and implementing the core lifecycle
//! trait on a single top-level struct, with the actual wiring kept in
//! `builder.rs` rather than inline here.

pub mod builder;
pub mod emm;
pub mod error;
pub mod esm;
pub mod messages;
pub mod mme_app;
pub mod model;
pub mod nas;
pub mod s1ap;
pub mod s6a;
pub mod stats;
pub mod store;

use std::sync::Arc;

use itti::TaskReceiver;
use runtime_base::CoreInstance;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
	error::EngineError,
	messages::AppMessage,
	mme_app::gtp_ulp::GtpLayer,
	stats::EngineStats,
	store::UeContextStore,
};

/// A fully wired but not-yet-running MME core. Everything that can be
/// built without `.await` happens in [`Engine::initialize`] (delegated to
/// `builder::wire`); [`Engine::start`] binds the S11/S10 sockets, spawns
/// one task per bus consumer (spec §4.1: "one task per subsystem"), and
/// runs until `shutdown` fires.
pub struct Engine {
	store: Arc<UeContextStore>,
	receivers: Mutex<Option<Vec<TaskReceiver<AppMessage>>>>,
	emm_services: emm::EmmServices,
	esm_services: esm::EsmServices,
	mme_app_services: mme_app::MmeAppServices,
	s1ap_transport: Arc<dyn s1ap::S1apTransport>,
	s11_layer: Arc<GtpLayer>,
	s10_layer: Arc<GtpLayer>,
	s11_transport: Arc<dyn gtp::GtpTransport>,
	s10_transport: Arc<dyn gtp::GtpTransport>,
	config: Arc<mme_config::MmeConfig>,
	stats: Arc<EngineStats>,
	shutdown: CancellationToken,
}

impl CoreInstance for Engine {
	type Config = mme_config::MmeConfig;
	type Error = EngineError;

	fn initialize(
		cfg: Self::Config,
		shutdown: CancellationToken,
	) -> Result<Self, Self::Error> {
		builder::wire(cfg, shutdown)
	}

	async fn start(&self) -> Result<(), Self::Error> {
		builder::run(self).await
	}
}
