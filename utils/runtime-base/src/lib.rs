use std::{error, fmt};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;

/// Lifecycle contract shared by every long-running core instance.
///
/// Mirrors the shape of an NF's `initialize`/`start` split in the wider
/// workspace, minus the SBI registration steps an EPC control-plane node has
/// no use for: the MME registers nowhere, it is configured with static
/// peers.
pub trait CoreInstance: Sized {
	type Config: DeserializeOwned + fmt::Debug + CoreConfig;
	type Error: error::Error + Send + Sync + 'static;

	fn initialize(
		cfg: Self::Config,
		shutdown: CancellationToken,
	) -> Result<Self, Self::Error>;

	async fn start(&self) -> Result<(), Self::Error>;
}

pub trait CoreConfig {
	fn get_log_config(&self) -> &LoggingConfig;
	fn get_runtime_config(&self) -> &RuntimeConfig;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
	pub enable: bool,
	pub level: String,
	pub report_caller: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
	#[serde(rename = "type")]
	pub rt_type: RuntimeType,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
	#[serde(rename = "single")]
	Single,
	#[serde(rename = "multi")]
	Multi,
}
