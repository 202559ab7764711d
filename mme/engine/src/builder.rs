//! Engine construction (spec §2's component wiring): builds the UE context
//! store, message bus, timer services, the two GTPv2-C transaction layers,
//! and the per-task `XxxServices` bundles every procedure handler closes
//! over, then drives the spawned task loop for each (spec §4.1: "one task
//! per subsystem").
//!
//! Grounded on the teacher's `omnipath-app::builder` module (construction
//! kept out of the thin `lib.rs` lifecycle impl) and on `mme_app::gtp_ulp`'s
//! `GtpUlp::new`/`bind` two-step, needed because a `UlpCallback` must exist
//! before the `TransactionLayer` it serves, which must exist before the
//! `UlpCallback` can reach it back.

use std::{net::SocketAddr, sync::Arc};

use itti::{Body, Bus, BusTimerSink, TaskId, TaskReceiver};
use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;
use scheduler::TimerService;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
	Engine,
	emm::{self, EmmServices},
	error::EngineError,
	esm::{self, EsmServices},
	messages::{AppMessage, S1apBusMessage},
	mme_app::{
		self, MmeAppServices,
		gtp_ulp::{GtpLayer, GtpUlp, Interface},
	},
	nas::JsonNasCodec,
	s1ap::LoggingS1apTransport,
	s6a::StaticHssClient,
	stats::EngineStats,
	store::UeContextStore,
};

type PendingIncoming = Arc<SccHashMap<u32, gtp::GtpMessage, FxBuildHasher>>;

struct GtpSide {
	ulp: Arc<GtpUlp>,
	layer: Arc<GtpLayer>,
	transport: Arc<dyn gtp::GtpTransport>,
	pending_incoming: PendingIncoming,
}

/// Binds one UDP socket and builds its `GtpUlp`/`TransactionLayer` pair.
/// Must run inside a Tokio runtime.
async fn build_gtp_side(
	interface: Interface,
	bind_addr: SocketAddr,
	bus: Bus<AppMessage>,
	store: Arc<UeContextStore>,
) -> Result<GtpSide, gtp::TransportError> {
	let pending_incoming: PendingIncoming = Arc::new(SccHashMap::with_hasher(FxBuildHasher::default()));
	let ulp = Arc::new(GtpUlp::new(interface, bus, store, pending_incoming.clone()));
	let transport: Arc<dyn gtp::GtpTransport> = Arc::new(gtp::UdpJsonTransport::bind(bind_addr).await?);
	let ulp_dyn: Arc<dyn gtp::UlpCallback> = ulp.clone();
	// `GtpLayer`'s `T`/`U` params are themselves `Arc<dyn _>`; the layer's
	// own `Arc<T>`/`Arc<U>` fields add the outer layer of indirection.
	let layer = Arc::new(gtp::TransactionLayer::new(Arc::new(transport.clone()), Arc::new(ulp_dyn), gtp::RetransmissionPolicy::default()));
	ulp.bind(layer.clone());
	Ok(GtpSide { ulp, layer, transport, pending_incoming })
}

/// Builds a fully wired, not-yet-running [`Engine`]. The S11/S10 socket
/// binds are the one piece of construction that is unavoidably async
/// (`tokio::net::UdpSocket::bind`); since `CoreInstance::initialize` is
/// synchronous, they run on a short-lived current-thread runtime created
/// and torn down for this purpose alone.
pub fn wire(
	cfg: mme_config::MmeConfig,
	shutdown: CancellationToken,
) -> Result<Engine, EngineError> {
	let config = Arc::new(cfg);
	let store = Arc::new(UeContextStore::new());
	let stats = Arc::new(EngineStats::new());
	let (bus, receivers) = Bus::new(&[TaskId::Emm, TaskId::Esm, TaskId::MmeApp, TaskId::S1ap]);

	let nas_codec: Arc<dyn crate::nas::NasCodec> = Arc::new(JsonNasCodec);
	let hss: Arc<dyn crate::s6a::HssClient> = Arc::new(StaticHssClient::new());
	let s1ap_transport: Arc<dyn crate::s1ap::S1apTransport> = Arc::new(LoggingS1apTransport);

	let emm_timers = Arc::new(TimerService::new(BusTimerSink::new(bus.clone(), TaskId::Emm)));
	let esm_timers = Arc::new(TimerService::new(BusTimerSink::new(bus.clone(), TaskId::Esm)));

	let s11_addr = SocketAddr::new(
		*config
			.configuration
			.s11
			.addresses
			.first()
			.expect("serde_valid: s11.addresses has at least one entry"),
		config.configuration.s11.port,
	);
	let s10_addr = SocketAddr::new(
		*config
			.configuration
			.s10
			.addresses
			.first()
			.expect("serde_valid: s10.addresses has at least one entry"),
		config.configuration.s10.port,
	);

	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.map_err(EngineError::Runtime)?;
	let (s11, s10) = runtime.block_on(async {
		let s11 = build_gtp_side(Interface::S11, s11_addr, bus.clone(), store.clone())
			.await
			.map_err(EngineError::S11Bind)?;
		let s10 = build_gtp_side(Interface::S10, s10_addr, bus.clone(), store.clone())
			.await
			.map_err(EngineError::S10Bind)?;
		Ok::<_, EngineError>((s11, s10))
	})?;
	// The runtime was only ever needed to drive the two binds above; the
	// sockets and spawned tasks it created outlive it.
	drop(runtime);
	// mme_app originates Forward Relocation Request on S10 directly through
	// `s10.layer` (see `mme_app::on_handover_required`); acting as the
	// *target* of an inbound S10 procedure remains reduced scope (see
	// DESIGN.md), so `s10.ulp`/pending-incoming map stay alive only inside
	// `s10.layer`'s own callback handle.
	drop(s10.ulp);
	drop(s10.pending_incoming);
	drop(s11.ulp);

	info!(mme_name = %config.configuration.mme_name, "wired MME engine");

	let emm_services =
		EmmServices { bus: bus.clone(), nas_codec: nas_codec.clone(), timers: emm_timers, hss, config: config.clone(), stats: stats.clone() };
	let esm_services = EsmServices { bus: bus.clone(), nas_codec: nas_codec.clone(), timers: esm_timers, config: config.clone(), stats: stats.clone() };
	let mme_app_services =
		MmeAppServices::new(bus, nas_codec, s11.layer.clone(), s10.layer.clone(), config.clone(), stats.clone(), s11.pending_incoming);

	Ok(Engine {
		store,
		receivers: Mutex::new(Some(receivers)),
		emm_services,
		esm_services,
		mme_app_services,
		s1ap_transport,
		s11_layer: s11.layer,
		s10_layer: s10.layer,
		s11_transport: s11.transport,
		s10_transport: s10.transport,
		config,
		stats,
		shutdown,
	})
}

/// Drains every bus queue and both GTP transports on their own tasks until
/// `shutdown` fires (spec §4.1: each task is a single logical consumer).
pub async fn run(engine: &Engine) -> Result<(), EngineError> {
	let receivers = engine
		.receivers
		.lock()
		.await
		.take()
		.expect("Engine::start called more than once");

	let mut handles = Vec::with_capacity(receivers.len() + 2);
	for receiver in receivers {
		handles.push(spawn_task_consumer(engine, receiver));
	}
	handles.push(spawn_gtp_recv_loop("S11", engine.s11_transport.clone(), engine.s11_layer.clone()));
	handles.push(spawn_gtp_recv_loop("S10", engine.s10_transport.clone(), engine.s10_layer.clone()));

	info!(
		active_ues = engine.stats.snapshot().active_ue_contexts,
		"MME engine started"
	);
	engine.shutdown.cancelled().await;
	info!("shutdown requested, stopping MME engine");
	for handle in handles {
		handle.abort();
	}
	Ok(())
}

fn spawn_task_consumer(
	engine: &Engine,
	mut receiver: TaskReceiver<AppMessage>,
) -> tokio::task::JoinHandle<()> {
	let store = engine.store.clone();
	match receiver.id {
		TaskId::Emm => {
			let services = engine.emm_services.clone();
			tokio::spawn(async move {
				while let Some(message) = receiver.recv().await {
					let Body::Data(AppMessage::Emm(body)) = message.body else { break };
					if let Err(err) = emm::handle(&store, &services, body).await {
						warn!(%err, "emm task error");
					}
				}
			})
		}
		TaskId::Esm => {
			let services = engine.esm_services.clone();
			tokio::spawn(async move {
				while let Some(message) = receiver.recv().await {
					let Body::Data(AppMessage::Esm(body)) = message.body else { break };
					if let Err(err) = esm::handle(&store, &services, body).await {
						warn!(%err, "esm task error");
					}
				}
			})
		}
		TaskId::MmeApp => {
			let services = engine.mme_app_services.clone();
			tokio::spawn(async move {
				while let Some(message) = receiver.recv().await {
					let Body::Data(AppMessage::MmeApp(body)) = message.body else { break };
					if let Err(err) = mme_app::handle(&store, &services, body).await {
						warn!(%err, "mme_app task error");
					}
				}
			})
		}
		TaskId::S1ap => {
			let transport = engine.s1ap_transport.clone();
			tokio::spawn(async move {
				while let Some(message) = receiver.recv().await {
					let Body::Data(AppMessage::S1ap(S1apBusMessage::Outgoing(action))) = message.body else { break };
					if let Err(err) = transport.send(action).await {
						warn!(%err, "failed to send S1AP action");
					}
				}
			})
		}
		other => tokio::spawn(async move {
			warn!(?other, "no consumer wired for this task id, queue will back up");
		}),
	}
}

fn spawn_gtp_recv_loop(
	name: &'static str,
	transport: Arc<dyn gtp::GtpTransport>,
	layer: Arc<GtpLayer>,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match transport.recv_from().await {
				Ok((message, peer)) => layer.handle_incoming(message, peer).await,
				Err(err) => warn!(interface = name, %err, "GTP transport receive error"),
			}
		}
	})
}
