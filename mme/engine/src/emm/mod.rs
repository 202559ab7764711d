//! EMM (EPS Mobility Management) engine (spec §4.5 + §5): Attach, Detach,
//! Tracking Area Update, Service Request, and the four common procedures
//! they nest (Authentication, Security Mode Control, Identification, GUTI
//! Reallocation), plus CN-triggered (S6a/S10) procedures.
//!
//! Grounded on
//! `original_source/component/oai-mme/src/nas/emm/nas_emm_proc.h`/
//! `nas_emm_procedures.h` for the procedure catalog, and on the teacher's
//! per-task dispatch shape
//! (`omnipath`'s NGAP/NAS handler lookup by message discriminant) adapted
//! to route through `model::procedure::Procedure` records instead of a
//! handler-object table.

pub mod attach;
pub mod cn_triggered;
pub mod common;
pub mod detach;
pub mod fsm;
pub mod service_request;
pub mod tau;

use std::sync::Arc;

use itti::{BusTimerSink, Priority, TaskId};
use scheduler::{TimerHandle, TimerKind, TimerService};
use tracing::warn;

use crate::{
	error::EngineError,
	messages::{AppMessage, EmmBusMessage, S1apBusMessage, TimerArg, TimerOwner},
	model::{
		ids::{EnbS1apIdKey, MmeUeS1apId},
		procedure::ProcedureKind,
		ue_context::UeContext,
	},
	nas::{EmmMessage, NasCodec},
	s1ap::messages::S1apAction,
	s6a::HssClient,
	stats::EngineStats,
	store::UeContextStore,
};

/// The collaborators every EMM procedure handler needs, bundled so
/// handler signatures stay `(ue, services, ...)` instead of growing a new
/// parameter each time one more external seam is needed.
#[derive(Clone)]
pub struct EmmServices {
	pub bus: itti::Bus<AppMessage>,
	pub nas_codec: Arc<dyn NasCodec>,
	pub timers: Arc<TimerService<BusTimerSink<AppMessage>>>,
	pub hss: Arc<dyn HssClient>,
	pub config: Arc<mme_config::MmeConfig>,
	pub stats: Arc<EngineStats>,
}

impl EmmServices {
	/// Encodes `message` and enqueues a `DownlinkNasTransport` for the
	/// S1AP task (spec §4.8: every NAS downlink leaves through S1AP).
	pub fn send_downlink_nas(
		&self,
		enb_key: EnbS1apIdKey,
		ue_id: MmeUeS1apId,
		message: &EmmMessage,
	) {
		match self.nas_codec.encode_emm(message, None) {
			Ok(nas_pdu) => {
				let action = S1apAction::DownlinkNasTransport { enb_key, mme_ue_s1ap_id: ue_id, nas_pdu };
				if let Err(err) = self.bus.send(
					TaskId::Emm,
					TaskId::S1ap,
					0,
					Priority::Normal,
					AppMessage::S1ap(S1apBusMessage::Outgoing(action)),
				) {
					warn!(%err, "failed to enqueue downlink NAS transport");
				}
			}
			Err(err) => warn!(?err, "failed to encode EMM downlink message"),
		}
	}

	pub async fn start_timer(
		&self,
		duration: (u64, u32),
		ue_id: MmeUeS1apId,
		procedure_id: crate::model::procedure::ProcedureId,
	) -> TimerHandle {
		self.timers
			.create(duration, TimerKind::OneShot, TimerArg { owner: TimerOwner::Emm, ue_id, procedure_id })
			.await
	}

	pub async fn cancel_timer(
		&self,
		handle: TimerHandle,
	) {
		self.timers.remove(handle).await;
	}
}

/// Top-level EMM task entry point: routes one bus message to the handler
/// for whatever procedure it belongs to, acquiring the UE's exclusive
/// queue for the duration (spec §4.4: "mutated only through its own
/// queue").
pub async fn handle(
	store: &Arc<UeContextStore>,
	services: &EmmServices,
	message: EmmBusMessage,
) -> Result<(), EngineError> {
	match message {
		EmmBusMessage::UplinkMessage { ue_id, message } => {
			dispatch_uplink(store, services, ue_id, message).await;
		}
		EmmBusMessage::EsmContainerReady { ue_id, procedure_id, esm_message } => {
			dispatch_esm_container_ready(store, services, ue_id, procedure_id, esm_message).await;
		}
		EmmBusMessage::TimerExpired(arg) => {
			dispatch_timeout(store, services, arg).await;
		}
	}
	Ok(())
}

async fn dispatch_esm_container_ready(
	store: &Arc<UeContextStore>,
	services: &EmmServices,
	ue_id: MmeUeS1apId,
	procedure_id: crate::model::procedure::ProcedureId,
	esm_message: crate::nas::EsmMessage,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "ESM container ready for unknown UE context");
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				attach::on_esm_container_ready(ue, &services, procedure_id, esm_message).await;
			})
		})
		.await;
}

async fn dispatch_uplink(
	store: &Arc<UeContextStore>,
	services: &EmmServices,
	ue_id: MmeUeS1apId,
	message: EmmMessage,
) {
	let Some(queue) = store.by_mme_ue_s1ap_id(ue_id).await else {
		warn!(%ue_id, "uplink EMM message for unknown UE context");
		return;
	};
	let services = services.clone();
	queue
		.clone()
		.schedule_and_wait(move |ue: &mut UeContext| {
			Box::pin(async move {
				route_uplink(ue, &services, message).await;
			})
		})
		.await;
}

async fn route_uplink(
	ue: &mut UeContext,
	services: &EmmServices,
	message: EmmMessage,
) {
	match message {
		EmmMessage::AttachRequest { .. } => attach::on_attach_request(ue, services, message).await,
		EmmMessage::AttachComplete => attach::on_attach_complete(ue, services).await,
		EmmMessage::DetachRequest { switch_off } => detach::on_detach_request(ue, services, switch_off).await,
		EmmMessage::DetachAccept => detach::on_detach_accept(ue, services).await,
		EmmMessage::TrackingAreaUpdateRequest { guti, active_flag, has_security_context } => {
			tau::on_tau_request(ue, services, guti, active_flag, has_security_context).await
		}
		EmmMessage::TrackingAreaUpdateComplete => tau::on_tau_complete(ue, services).await,
		EmmMessage::ServiceRequest { guti } => service_request::on_service_request(ue, services, guti).await,
		EmmMessage::IdentityResponse { imsi } => common::identification::on_identity_response(ue, services, imsi).await,
		EmmMessage::AuthenticationResponse { res } => {
			common::authentication::on_authentication_response(ue, services, res).await
		}
		EmmMessage::AuthenticationFailure { cause } => {
			common::authentication::on_authentication_failure(ue, services, cause).await
		}
		EmmMessage::SecurityModeComplete => common::security_mode_control::on_security_mode_complete(ue, services).await,
		EmmMessage::SecurityModeReject { cause } => {
			common::security_mode_control::on_security_mode_reject(ue, services, cause).await
		}
		EmmMessage::GutiReallocationComplete => common::guti_reallocation::on_complete(ue, services).await,
		EmmMessage::EmmStatus { cause } => {
			warn!(ue_id = %ue.mme_ue_s1ap_id, cause, "peer reported EMM status, aborting active procedures");
			ue.procedures.clear();
		}
		other => {
			warn!(ue_id = %ue.mme_ue_s1ap_id, ?other, "unexpected downlink-only EMM message received as uplink, ignoring");
		}
	}
}

async fn dispatch_timeout(
	store: &Arc<UeContextStore>,
	services: &EmmServices,
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
					ProcedureKind::Attach => attach::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::Detach => detach::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::TrackingAreaUpdate => tau::on_timeout(ue, &services, arg.procedure_id).await,
					ProcedureKind::Authentication => {
						common::authentication::on_timeout(ue, &services, arg.procedure_id).await
					}
					ProcedureKind::SecurityModeControl => {
						common::security_mode_control::on_timeout(ue, &services, arg.procedure_id).await
					}
					ProcedureKind::Identification => {
						common::identification::on_timeout(ue, &services, arg.procedure_id).await
					}
					ProcedureKind::GutiReallocation => {
						common::guti_reallocation::on_timeout(ue, &services, arg.procedure_id).await
					}
					ProcedureKind::CnTriggered => cn_triggered::on_timeout(ue, &services, arg.procedure_id).await,
					_ => {}
				}
			})
		})
		.await;
}
