//! APN selection (SPEC_FULL.md §C, grounded on
//! `original_source/mme_app_apn_selection.c`): when a PDN Connectivity
//! Request carries no explicit APN, the MME falls back to the subscriber's
//! default APN rather than rejecting the request outright.

use crate::s6a::{ApnConfig, SubscriptionData};

#[derive(Debug, thiserror::Error)]
pub enum ApnSelectionError {
	#[error("no subscription data cached for this UE")]
	NoSubscriptionData,
	#[error("requested APN {0:?} is not in the subscriber's APN configuration profile")]
	NotSubscribed(String),
	#[error("subscriber has no default APN configured")]
	NoDefaultApn,
}

/// Resolves the `ApnConfig` a PDN Connectivity Request should be served
/// against: the explicitly requested APN if the subscriber is provisioned
/// for it, otherwise the profile's default entry (the first one flagged
/// `is_default`, or the sole entry if there is exactly one).
pub fn select<'a>(
	subscription_data: Option<&'a SubscriptionData>,
	requested_apn: Option<&str>,
) -> Result<&'a ApnConfig, ApnSelectionError> {
	let subscription_data = subscription_data.ok_or(ApnSelectionError::NoSubscriptionData)?;

	if let Some(requested) = requested_apn {
		return subscription_data
			.apn_config_profile
			.iter()
			.find(|entry| entry.apn.eq_ignore_ascii_case(requested))
			.ok_or_else(|| ApnSelectionError::NotSubscribed(requested.to_owned()));
	}

	if let Some(default) = subscription_data.apn_config_profile.iter().find(|entry| entry.is_default) {
		return Ok(default);
	}
	if subscription_data.apn_config_profile.len() == 1 {
		return Ok(&subscription_data.apn_config_profile[0]);
	}
	Err(ApnSelectionError::NoDefaultApn)
}

#[cfg(test)]
mod tests {
	use gtp::PdnType;

	use super::*;
	use crate::s6a::{NetworkAccessMode, SubscriberStatus};

	fn profile(entries: Vec<ApnConfig>) -> SubscriptionData {
		SubscriptionData {
			subscriber_status: SubscriberStatus::Operative,
			network_access_mode: NetworkAccessMode::PacketAndCircuit,
			rau_tau_timer_secs: 720,
			apn_config_profile: entries,
			subscribed_ue_ambr_ul_kbps: 50_000,
			subscribed_ue_ambr_dl_kbps: 100_000,
		}
	}

	fn apn(
		name: &str,
		is_default: bool,
	) -> ApnConfig {
		ApnConfig {
			context_id: 0,
			apn: name.to_owned(),
			pdn_type: PdnType::Ipv4,
			is_default,
			subscribed_apn_ambr_ul_kbps: 1000,
			subscribed_apn_ambr_dl_kbps: 2000,
			subscribed_qci: 9,
			static_ip: None,
		}
	}

	#[test]
	fn falls_back_to_default_when_no_apn_requested() {
		let data = profile(vec![apn("ims", false), apn("internet", true)]);
		let selected = select(Some(&data), None).unwrap();
		assert_eq!(selected.apn, "internet");
	}

	#[test]
	fn sole_entry_is_default_even_without_the_flag() {
		let data = profile(vec![apn("internet", false)]);
		let selected = select(Some(&data), None).unwrap();
		assert_eq!(selected.apn, "internet");
	}

	#[test]
	fn explicit_request_is_case_insensitive() {
		let data = profile(vec![apn("Internet", true)]);
		let selected = select(Some(&data), Some("INTERNET")).unwrap();
		assert_eq!(selected.apn, "Internet");
	}

	#[test]
	fn unsubscribed_apn_is_rejected() {
		let data = profile(vec![apn("internet", true)]);
		assert!(matches!(select(Some(&data), Some("ims")), Err(ApnSelectionError::NotSubscribed(_))));
	}
}
