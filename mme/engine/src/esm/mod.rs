//! ESM (EPS Session Management) engine (spec §4.6 + §5.2): PDN
//! Connectivity/Disconnect, dedicated bearer activation/modification/
//! deactivation, and the Bearer Resource Command pass-through.
//!
//! Grounded on
//! `original_source/component/oai-mme/src/nas/esm/esm_main.c`'s procedure
//! dispatch and on
//! `emm::mod`'s task-level shape (`XxxServices` bundle + top-level `handle`
//! dispatcher routing through the UE's exclusive queue), which this module
//! mirrors so EMM and ESM read as the same kind of task even though they
//! answer different message families.

pub mod apn_selection;
pub mod bearer_activation;
pub mod bearer_deactivation;
pub mod bearer_modification;
pub mod bearer_resource_command;
pub mod bearer_state;
pub mod pdn_connectivity;
pub mod pdn_disconnect;

use std::sync::Arc;

use itti::{BusTimerSink, Priority, TaskId};
use scheduler::{TimerHandle, TimerKind, TimerService};
use tracing::warn;

use crate::{
	error::EngineError,
	messages::{
		AppMessage, EmmBusMessage, EsmBusMessage, EsmSessionRequest, MmeAppBusMessage, NetworkTriggeredEsmRequest, S1apBusMessage,
		TimerArg, TimerOwner,
	},
	model::{
		ids::MmeUeS1apId,
		procedure::{ProcedureId, ProcedureKind},
		ue_context::UeContext,
	},
	nas::{EsmMessage, NasCodec},
	s1ap::messages::S1apAction,
	stats::EngineStats,
	store::UeContextStore,
};

/// The collaborators every ESM procedure handler needs (spec §4.6), the
/// same bundling shape `emm::EmmServices` uses.
#[derive(Clone)]
pub struct EsmServices {
	pub bus: itti::Bus<AppMessage>,
	pub nas_codec: Arc<dyn NasCodec>,
	pub timers: Arc<TimerService<BusTimerSink<AppMessage>>>,
	pub config: Arc<mme_config::MmeConfig>,
	pub stats: Arc<EngineStats>,
}

impl EsmServices {
	pub fn send_downlink_nas(
		&self,
		enb_key: crate::model::ids::EnbS1apIdKey,
		ue_id: MmeUeS1apId,
		message: &EsmMessage,
	) {
		match self.nas_codec.encode_esm(message) {
			Ok(nas_pdu) => {
				let action = S1apAction::DownlinkNasTransport { enb_key, mme_ue_s1ap_id: ue_id, nas_pdu };
				if let Err(err) = self.bus.send(
					TaskId::Esm,
					TaskId::S1ap,
					0,
					Priority::Normal,
					AppMessage::S1ap(S1apBusMessage::Outgoing(action)),
				) {
					warn!(%err, "failed to enqueue downlink NAS transport");
				}
			}
			Err(err) => warn!(?err, "failed to encode ESM downlink message"),
		}
	}

	/// Forwards an already-translated GTPv2-C payload (or response) to
	/// mme_app's session orchestration (spec §4.7: ESM never speaks S11
	/// directly).
	pub fn request_session(
		&self,
		ue_id: MmeUeS1apId,
		procedure_id: ProcedureId,
		request: EsmSessionRequest,
	) {
		if let Err(err) = self.bus.send(
			TaskId::Esm,
			TaskId::MmeApp,
			0,
			Priority::Normal,
			AppMessage::MmeApp(MmeAppBusMessage::EsmSessionRequest { ue_id, procedure_id, request }),
		) {
			warn!(%err, "failed to enqueue ESM session request to mme_app");
		}
	}

	pub async fn start_timer(
		&self,
		duration: (u64, u32),
		ue_id: MmeUeS1apId,
		procedure_id: ProcedureId,
	) -> TimerHandle {
		self.timers
			.create(duration, TimerKind::OneShot, TimerArg { owner: TimerOwner::Esm, ue_id, procedure_id })
			.await
	}

	pub async fn cancel_timer(
		&self,
		handle: TimerHandle,
	) {
		self.timers.remove(handle).await;
	}
}

/// Answers an ESM exchange either as a downlink NAS transport of its own
/// (a standalone procedure) or, if it is answering an embedded Attach/TAU
/// ESM container, by handing the message back to EMM as
/// `EmmBusMessage::EsmContainerReady` (spec §4.1).
pub(crate) async fn reply(
	ue: &UeContext,
	services: &EsmServices,
	emm_trigger: Option<ProcedureId>,
	message: EsmMessage,
) {
	if let Some(trigger) = emm_trigger {
		if let Err(err) = services.bus.send(
			TaskId::Esm,
			TaskId::Emm,
			0,
			Priority::Normal,
			AppMessage::Emm(EmmBusMessage::EsmContainerReady { ue_id: ue.mme_ue_s1ap_id, procedure_id: trigger, esm_message: message }),
		) {
			warn!(%err, "failed to answer EMM's embedded ESM container");
		}
	} else if let Some(enb_key) = ue.enb_key {
		services.send_downlink_nas(enb_key, ue.mme_ue_s1ap_id, &message);
	} else {
		warn!(ue_id = %ue.mme_ue_s1ap_id, "cannot answer a standalone ESM procedure with no eNB association");
	}
}

/// Top-level ESM task entry point (spec §4.4: "mutated only through its
/// own queue").
pub async fn handle(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	message: EsmBusMessage,
) -> Result<(), EngineError> {
	match message {
		EsmBusMessage::UplinkMessage { ue_id, message } => dispatch_uplink(store, services, ue_id, message).await,
		EsmBusMessage::EmmTriggered { ue_id, procedure_id, esm_message } => {
			dispatch_emm_triggered(store, services, ue_id, procedure_id, esm_message).await
		}
		EsmBusMessage::NetworkTriggered { ue_id, request } => dispatch_network_triggered(store, services, ue_id, request).await,
		EsmBusMessage::SessionOutcome { ue_id, procedure_id, event } => {
			dispatch_session_outcome(store, services, ue_id, procedure_id, event).await
		}
		EsmBusMessage::TimerExpired(arg) => dispatch_timeout(store, services, arg).await,
	}
	Ok(())
}

async fn dispatch_uplink(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	ue_id: MmeUeS1apId,
	message: EsmMessage,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "uplink ESM message for unknown UE context");
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| Box::pin(async move { route_uplink(ue, &services, message).await }))
		.await;
}

async fn route_uplink(
	ue: &mut UeContext,
	services: &EsmServices,
	message: EsmMessage,
) {
	match message {
		EsmMessage::PdnConnectivityRequest { .. } => pdn_connectivity::on_request(ue, services, message).await,
		EsmMessage::PdnDisconnectRequest { .. } => pdn_disconnect::on_request(ue, services, message).await,
		EsmMessage::BearerResourceAllocationRequest { .. } => bearer_resource_command::on_request(ue, services, message).await,
		EsmMessage::ActivateDefaultEpsBearerContextAccept { ebi } => {
			pdn_connectivity::on_activate_default_accept(ue, services, ebi).await
		}
		EsmMessage::ActivateDefaultEpsBearerContextReject { ebi, cause } => {
			pdn_connectivity::on_activate_default_reject(ue, services, ebi, cause).await
		}
		EsmMessage::ActivateDedicatedEpsBearerContextAccept { ebi } => bearer_activation::on_accept(ue, services, ebi).await,
		EsmMessage::ActivateDedicatedEpsBearerContextReject { ebi, cause } => {
			bearer_activation::on_reject(ue, services, ebi, cause).await
		}
		EsmMessage::ModifyEpsBearerContextAccept { ebi } => bearer_modification::on_accept(ue, services, ebi).await,
		EsmMessage::ModifyEpsBearerContextReject { ebi, cause } => bearer_modification::on_reject(ue, services, ebi, cause).await,
		EsmMessage::DeactivateEpsBearerContextAccept { ebi } => {
			let awaiting_disconnect =
				ue.procedures.iter().any(|p| p.kind == ProcedureKind::PdnDisconnect && p.ebi == Some(ebi) && !p.is_terminal());
			if awaiting_disconnect {
				pdn_disconnect::on_deactivate_accept(ue, services, ebi).await;
			} else {
				bearer_deactivation::on_accept(ue, services, ebi).await;
			}
		}
		EsmMessage::EsmStatus { pti, cause } => {
			warn!(ue_id = %ue.mme_ue_s1ap_id, pti, cause, "peer reported ESM status");
		}
		other => {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ?other, "unexpected downlink-only ESM message received as uplink, ignoring");
		}
	}
}

async fn dispatch_emm_triggered(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	ue_id: MmeUeS1apId,
	procedure_id: ProcedureId,
	esm_message: EsmMessage,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "EMM-triggered ESM container for unknown UE context");
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				match esm_message {
					EsmMessage::PdnConnectivityRequest { .. } => {
						pdn_connectivity::on_emm_triggered(ue, &services, procedure_id, esm_message).await
					}
					other => warn!(ue_id = %ue.mme_ue_s1ap_id, ?other, "unexpected embedded ESM container kind"),
				}
			})
		})
		.await;
}

async fn dispatch_network_triggered(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	ue_id: MmeUeS1apId,
	request: NetworkTriggeredEsmRequest,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "network-triggered ESM request for unknown UE context");
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				match request {
					NetworkTriggeredEsmRequest::CreateBearer(req) => bearer_activation::on_network_triggered(ue, &services, req).await,
					NetworkTriggeredEsmRequest::UpdateBearer(req) => bearer_modification::on_network_triggered(ue, &services, req).await,
					NetworkTriggeredEsmRequest::DeleteBearer(req) => {
						bearer_deactivation::on_network_triggered(ue, &services, req.ebis).await
					}
					NetworkTriggeredEsmRequest::DeleteBearerCommand(cmd) => {
						bearer_deactivation::on_network_triggered(ue, &services, cmd.ebis).await
					}
				}
			})
		})
		.await;
}

async fn dispatch_session_outcome(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	ue_id: MmeUeS1apId,
	procedure_id: ProcedureId,
	event: crate::messages::GtpSessionEvent,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				let Some(procedure) = ue.procedure(procedure_id) else {
					return;
				};
				match procedure.kind {
					ProcedureKind::PdnConnectivity => pdn_connectivity::on_session_outcome(ue, &services, procedure_id, event).await,
					ProcedureKind::PdnDisconnect => pdn_disconnect::on_session_outcome(ue, &services, procedure_id, event).await,
					_ => {}
				}
			})
		})
		.await;
}

async fn dispatch_timeout(
	store: &Arc<UeContextStore>,
	services: &EsmServices,
	arg: TimerArg,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(arg.ue_id).await else {
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				let Some(procedure) = ue.procedure(arg.procedure_id) else {
					return;
				};
				match procedure.kind {
					ProcedureKind::PdnConnectivity => pdn_connectivity::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::PdnDisconnect => pdn_disconnect::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::BearerActivation => bearer_activation::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::BearerModification => bearer_modification::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::BearerDeactivation => bearer_deactivation::on_timeout(ue, &services, arg.procedure_id).await,
					_ => {}
				}
			})
		})
		.await;
}
