use std::{hash::Hash, sync::Arc};

use rustc_hash::FxBuildHasher;
use scc::HashMap as SccHashMap;

use crate::context_queue::ContextQueue;

/// A context that carries its own lookup key, so a `ContextManager` can be
/// handed a bare value and know where to file it.
pub trait Identifiable {
	type Key: Eq + Hash + Clone + Send + Sync + 'static;

	fn key(&self) -> Self::Key;
}

/// A concurrent registry of [`ContextQueue`]s keyed by `T::Key`. Every entry
/// serializes operations on its own context independently of every other
/// entry: two different keys never contend, and operations on the same key
/// always run in submission order.
///
/// This generalizes the teacher's per-association `ContextQueue` (one queue
/// per SCTP association) to an arbitrary keyed population — here, one queue
/// per GTPv2-C tunnel endpoint, and, in `mme-engine`, one per UE context.
pub struct ContextManager<T>
where
	T: Identifiable + Send + Sync + 'static,
{
	entries: SccHashMap<T::Key, Arc<ContextQueue<T>>, FxBuildHasher>,
}

impl<T> Default for ContextManager<T>
where
	T: Identifiable + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T> ContextManager<T>
where
	T: Identifiable + Send + Sync + 'static,
{
	pub fn new() -> Self {
		Self { entries: SccHashMap::with_hasher(FxBuildHasher::default()) }
	}

	/// Inserts a new context. Returns the existing queue, unreplaced, if the
	/// key is already present.
	pub async fn insert(
		&self,
		context: T,
	) -> Arc<ContextQueue<T>> {
		let key = context.key();
		let queue = Arc::new(ContextQueue::new(context));
		match self.entries.entry_async(key).await {
			scc::hash_map::Entry::Occupied(entry) => entry.get().clone(),
			scc::hash_map::Entry::Vacant(entry) => {
				entry.insert_entry(queue.clone());
				queue
			}
		}
	}

	/// Looks up the queue for `key`, if the context is still present.
	pub async fn get(
		&self,
		key: &T::Key,
	) -> Option<Arc<ContextQueue<T>>> {
		self.entries.get_async(key).await.map(|entry| entry.get().clone())
	}

	/// Removes and returns the queue for `key`. Any operation already
	/// enqueued on it still runs to completion; only new lookups stop
	/// finding it.
	pub async fn remove(
		&self,
		key: &T::Key,
	) -> Option<Arc<ContextQueue<T>>> {
		self.entries.remove_async(key).await.map(|(_, queue)| queue)
	}

	pub async fn len(&self) -> usize {
		self.entries.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Tunnel {
		teid: u32,
		peer_teid: Option<u32>,
	}

	impl Identifiable for Tunnel {
		type Key = u32;

		fn key(&self) -> u32 {
			self.teid
		}
	}

	#[tokio::test]
	async fn insert_then_get_round_trips() {
		let manager: ContextManager<Tunnel> = ContextManager::new();
		manager.insert(Tunnel { teid: 7, peer_teid: None }).await;
		let queue = manager.get(&7).await.expect("present");
		let peer = queue.schedule_and_wait(|ctx| Box::pin(async move { ctx.peer_teid })).await;
		assert_eq!(peer, None);
	}

	#[tokio::test]
	async fn remove_drops_future_lookups() {
		let manager: ContextManager<Tunnel> = ContextManager::new();
		manager.insert(Tunnel { teid: 1, peer_teid: None }).await;
		assert!(manager.remove(&1).await.is_some());
		assert!(manager.get(&1).await.is_none());
	}
}
