//! UE context store (spec §4.4): one authoritative map of `UeContext`,
//! keyed by MME UE S1AP Id, plus four non-owning secondary indexes.
//!
//! Grounded on the teacher's `omnipath/ngap/manager/context_manager.rs`
//! (`ContextManager` itself, reused verbatim from `gtp`) and on the
//! `mme_ue_s1ap_id`/IMSI/GUTI/eNB-key/S11-TEID accessor signatures declared
//! across `original_source/component/oai-mme/src/mme_app/mme_app_defs.h`,
//! which this store keeps as five hash tables: by mme_ue_s1ap_id
//! (authoritative), by IMSI, by GUTI, by `(enb_ue_s1ap_id, sctp_assoc_id)`,
//! and by S11/S10 local TEID. Every secondary index stores only the primary
//! key; reads always resolve through the authoritative map.

use std::sync::Arc;

use gtp::ContextQueue;
use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;

use crate::model::{
	ids::{EnbS1apIdKey, Guti, Imsi, MmeUeS1apId},
	ue_context::{UeContext, UeContextManager},
};

/// Snapshot of a UE context's indexed fields, used to atomically re-key the
/// secondary indexes after any field they cover changes. `mme_teid_s11` is
/// set once at creation and never changes in practice, but is modeled the
/// same way as the others for uniformity.
#[derive(Debug, Clone, Default)]
pub struct IndexKeys {
	pub imsi: Option<Imsi>,
	pub guti: Option<Guti>,
	pub enb_key: Option<EnbS1apIdKey>,
	pub mme_teid_s11: Option<u32>,
	pub mme_teid_s10: Option<u32>,
}

impl IndexKeys {
	pub fn from_context(ue: &UeContext) -> Self {
		Self {
			imsi: ue.imsi.clone(),
			guti: ue.emm_data.guti.clone(),
			enb_key: ue.enb_key,
			// `0` means "no S11 tunnel established yet" (mme_app defers
			// allocating the real value until the first Create Session
			// Request goes out) — an unindexed sentinel, same convention as
			// `MmeUeS1apId::INVALID`.
			mme_teid_s11: (ue.session_pool.mme_teid_s11 != 0).then_some(ue.session_pool.mme_teid_s11),
			mme_teid_s10: ue.mme_teid_s10,
		}
	}
}

pub struct UeContextStore {
	contexts: UeContextManager,
	by_imsi: SccHashMap<Imsi, MmeUeS1apId, FxBuildHasher>,
	by_guti: SccHashMap<Guti, MmeUeS1apId, FxBuildHasher>,
	by_enb_key: SccHashMap<EnbS1apIdKey, MmeUeS1apId, FxBuildHasher>,
	by_mme_teid_s11: SccHashMap<u32, MmeUeS1apId, FxBuildHasher>,
	by_mme_teid_s10: SccHashMap<u32, MmeUeS1apId, FxBuildHasher>,
}

impl Default for UeContextStore {
	fn default() -> Self {
		Self::new()
	}
}

impl UeContextStore {
	pub fn new() -> Self {
		Self {
			contexts: UeContextManager::new(),
			by_imsi: SccHashMap::with_hasher(FxBuildHasher::default()),
			by_guti: SccHashMap::with_hasher(FxBuildHasher::default()),
			by_enb_key: SccHashMap::with_hasher(FxBuildHasher::default()),
			by_mme_teid_s11: SccHashMap::with_hasher(FxBuildHasher::default()),
			by_mme_teid_s10: SccHashMap::with_hasher(FxBuildHasher::default()),
		}
	}

	/// Inserts a freshly created UE context and indexes its initial S11
	/// TEID. Returns the exclusive queue the caller should use for every
	/// subsequent access.
	pub async fn insert(
		&self,
		ue: UeContext,
	) -> Arc<ContextQueue<UeContext>> {
		let keys = IndexKeys::from_context(&ue);
		let mme_ue_s1ap_id = ue.mme_ue_s1ap_id;
		let queue = self.contexts.insert(ue).await;
		self.apply_keys(mme_ue_s1ap_id, &IndexKeys::default(), &keys).await;
		queue
	}

	pub async fn by_mme_ue_s1ap_id(
		&self,
		id: MmeUeS1apId,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		self.contexts.get(&id).await
	}

	pub async fn by_imsi(
		&self,
		imsi: &Imsi,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		let id = self.by_imsi.get_async(imsi).await.map(|e| *e.get())?;
		self.contexts.get(&id).await
	}

	pub async fn by_guti(
		&self,
		guti: &Guti,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		let id = self.by_guti.get_async(guti).await.map(|e| *e.get())?;
		self.contexts.get(&id).await
	}

	pub async fn by_enb_key(
		&self,
		key: &EnbS1apIdKey,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		let id = self.by_enb_key.get_async(key).await.map(|e| *e.get())?;
		self.contexts.get(&id).await
	}

	pub async fn by_mme_teid_s11(
		&self,
		teid: u32,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		let id = self.by_mme_teid_s11.get_async(&teid).await.map(|e| *e.get())?;
		self.contexts.get(&id).await
	}

	pub async fn by_mme_teid_s10(
		&self,
		teid: u32,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		let id = self.by_mme_teid_s10.get_async(&teid).await.map(|e| *e.get())?;
		self.contexts.get(&id).await
	}

	/// Atomically re-keys every secondary index that changed between `old`
	/// and `new`: each covered index removes its old entry (if any) before
	/// inserting the new one (if any), so a reader never observes both the
	/// stale and fresh mapping for the same UE at once, nor a window with
	/// neither.
	pub async fn update_collection_keys(
		&self,
		id: MmeUeS1apId,
		old: &IndexKeys,
		new: &IndexKeys,
	) {
		self.apply_keys(id, old, new).await;
	}

	async fn apply_keys(
		&self,
		id: MmeUeS1apId,
		old: &IndexKeys,
		new: &IndexKeys,
	) {
		reindex(&self.by_imsi, &old.imsi, &new.imsi, id).await;
		reindex(&self.by_guti, &old.guti, &new.guti, id).await;
		reindex(&self.by_enb_key, &old.enb_key, &new.enb_key, id).await;
		reindex(&self.by_mme_teid_s11, &old.mme_teid_s11, &new.mme_teid_s11, id).await;
		reindex(&self.by_mme_teid_s10, &old.mme_teid_s10, &new.mme_teid_s10, id).await;
	}

	/// Removes a UE context entirely: the caller supplies the index
	/// snapshot it last applied (typically read under the context's own
	/// queue immediately before removal) so every secondary index can be
	/// cleared along with the authoritative entry.
	pub async fn remove(
		&self,
		id: MmeUeS1apId,
		keys: &IndexKeys,
	) -> Option<Arc<ContextQueue<UeContext>>> {
		self.apply_keys(id, keys, &IndexKeys::default()).await;
		self.contexts.remove(&id).await
	}

	pub async fn len(&self) -> usize {
		self.contexts.len().await
	}
}

async fn reindex<K>(
	map: &SccHashMap<K, MmeUeS1apId, FxBuildHasher>,
	old: &Option<K>,
	new: &Option<K>,
	id: MmeUeS1apId,
) where
	K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
{
	if let Some(old_key) = old {
		map.remove_async(old_key).await;
	}
	if let Some(new_key) = new {
		let _ = map.upsert_async(new_key.clone(), id).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_then_lookup_by_mme_teid_s11() {
		let store = UeContextStore::new();
		let ue = UeContext::new(MmeUeS1apId(1), 42);
		store.insert(ue).await;
		assert!(store.by_mme_teid_s11(42).await.is_some());
		assert!(store.by_mme_ue_s1ap_id(MmeUeS1apId(1)).await.is_some());
	}

	#[tokio::test]
	async fn guti_reindex_replaces_old_mapping() {
		let store = UeContextStore::new();
		let ue = UeContext::new(MmeUeS1apId(1), 42);
		store.insert(ue).await;

		let old_keys = IndexKeys { mme_teid_s11: Some(42), ..Default::default() };
		let guti = Guti {
			plmn_id: mme_config::PlmnId { mcc: "001".into(), mnc: "01".into() },
			mme_group_id: 1,
			mme_code: 1,
			m_tmsi: std::num::NonZeroU32::new(5).unwrap(),
		};
		let new_keys = IndexKeys { guti: Some(guti.clone()), mme_teid_s11: Some(42), ..Default::default() };
		store.update_collection_keys(MmeUeS1apId(1), &old_keys, &new_keys).await;

		assert!(store.by_guti(&guti).await.is_some());
	}

	#[tokio::test]
	async fn remove_clears_every_secondary_index() {
		let store = UeContextStore::new();
		let ue = UeContext::new(MmeUeS1apId(1), 42);
		store.insert(ue).await;
		let keys = IndexKeys { mme_teid_s11: Some(42), ..Default::default() };
		store.remove(MmeUeS1apId(1), &keys).await;
		assert!(store.by_mme_teid_s11(42).await.is_none());
		assert!(store.by_mme_ue_s1ap_id(MmeUeS1apId(1)).await.is_none());
	}
}
