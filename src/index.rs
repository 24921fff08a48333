//! Fingerprint-keyed knowledge store.
//!
//! Holds one immutable [`KnowledgeIndex`] snapshot per fingerprint, shared
//! as `Arc`. Rebuilds swap the snapshot atomically — readers see either
//! the old complete index or the new one, never a mix. Builds are
//! single-flight per fingerprint: concurrent ingests of the same content
//! serialize on a per-fingerprint async lock, and late arrivals find the
//! published snapshot instead of duplicating work. A cancelled build
//! publishes nothing; its in-progress marker is cleaned up on drop.
//!
//! Capacity is bounded: publishing beyond `capacity` evicts the
//! least-recently-queried fingerprint wholly. Evicted fingerprints are
//! remembered so callers get a re-ingest hint instead of "not found".
//! Recency is a monotonic counter, not wall-clock time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::{RepoLensError, Result};
use crate::models::{IndexStatus, KnowledgeIndex};

/// Shared counters for an in-flight build, surfaced by `status`.
#[derive(Debug, Default)]
pub struct BuildProgress {
    pub embedded: AtomicUsize,
    pub total: AtomicUsize,
}

struct Entry {
    index: Arc<KnowledgeIndex>,
    last_queried: u64,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, Entry>,
    building: HashMap<String, Arc<BuildProgress>>,
    evicted: HashSet<String>,
    build_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    clock: u64,
}

pub struct IndexStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
}

impl IndexStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// The per-fingerprint build lock. Hold it for the whole ingest
    /// attempt to get single-flight semantics.
    pub fn build_lock(&self, fingerprint: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .build_locks
            .entry(fingerprint.to_string())
            .or_default()
            .clone()
    }

    /// Fetch a snapshot for a query, updating its recency.
    pub fn get(&self, fingerprint: &str) -> Result<Arc<KnowledgeIndex>> {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        if let Some(entry) = inner.entries.get_mut(fingerprint) {
            entry.last_queried = clock;
            return Ok(Arc::clone(&entry.index));
        }
        if inner.evicted.contains(fingerprint) {
            return Err(RepoLensError::Evicted(fingerprint.to_string()));
        }
        Err(RepoLensError::NotIndexed(fingerprint.to_string()))
    }

    /// Fetch without touching recency; used for the re-ingest no-op check.
    pub fn peek(&self, fingerprint: &str) -> Option<Arc<KnowledgeIndex>> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(fingerprint).map(|e| Arc::clone(&e.index))
    }

    pub fn status(&self, fingerprint: &str) -> IndexStatus {
        let inner = self.inner.lock().unwrap();
        if let Some(progress) = inner.building.get(fingerprint) {
            return IndexStatus::Building {
                embedded: progress.embedded.load(Ordering::Relaxed),
                total: progress.total.load(Ordering::Relaxed),
            };
        }
        if let Some(entry) = inner.entries.get(fingerprint) {
            return if entry.index.is_partial() {
                IndexStatus::Partial
            } else {
                IndexStatus::Ready
            };
        }
        if inner.evicted.contains(fingerprint) {
            return IndexStatus::Evicted;
        }
        IndexStatus::NotFound
    }

    /// Mark a build in flight. The returned guard unregisters the marker
    /// when dropped without publishing, so a cancelled or failed build
    /// leaves the fingerprint "not indexed" rather than stuck building.
    pub fn begin_build(self: &Arc<Self>, fingerprint: &str, total_chunks: usize) -> BuildGuard {
        let progress = Arc::new(BuildProgress::default());
        progress.total.store(total_chunks, Ordering::Relaxed);
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .building
                .insert(fingerprint.to_string(), Arc::clone(&progress));
        }
        BuildGuard {
            store: Arc::clone(self),
            fingerprint: fingerprint.to_string(),
            progress,
        }
    }

    fn publish(&self, fingerprint: &str, index: KnowledgeIndex) -> Arc<KnowledgeIndex> {
        let shared = Arc::new(index);
        let mut inner = self.inner.lock().unwrap();
        inner.building.remove(fingerprint);
        inner.evicted.remove(fingerprint);
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.insert(
            fingerprint.to_string(),
            Entry {
                index: Arc::clone(&shared),
                last_queried: clock,
            },
        );

        while inner.entries.len() > self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_queried)
                .map(|(fp, _)| fp.clone());
            let Some(victim) = victim else { break };
            inner.entries.remove(&victim);
            // The victim's build lock stays: an ingest already holding it
            // must keep excluding others if the fingerprint is rebuilt.
            inner.evicted.insert(victim.clone());
            info!(fingerprint = %victim, "evicted least-recently-queried index");
        }

        shared
    }
}

/// In-flight build marker. Publish to install the snapshot; dropping the
/// guard without publishing unregisters the build.
pub struct BuildGuard {
    store: Arc<IndexStore>,
    fingerprint: String,
    progress: Arc<BuildProgress>,
}

impl BuildGuard {
    pub fn progress(&self) -> Arc<BuildProgress> {
        Arc::clone(&self.progress)
    }

    /// Atomically swap the finished snapshot into the store.
    pub fn publish(self, index: KnowledgeIndex) -> Arc<KnowledgeIndex> {
        self.store.publish(&self.fingerprint, index)
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        let mut inner = self.store.inner.lock().unwrap();
        inner.building.remove(&self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    use crate::models::HierarchyNode;

    fn snapshot(fingerprint: &str) -> KnowledgeIndex {
        KnowledgeIndex {
            fingerprint: fingerprint.to_string(),
            files: Vec::new(),
            hierarchy: HierarchyNode {
                name: String::new(),
                path: String::new(),
                is_dir: true,
                children: Vec::new(),
            },
            dependencies: Vec::new(),
            chunks: Vec::new(),
            embeddings: Vec::new(),
            language_stats: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_then_get() {
        let store = Arc::new(IndexStore::new(4));
        let guard = store.begin_build("fp1", 0);
        assert_eq!(
            store.status("fp1"),
            IndexStatus::Building {
                embedded: 0,
                total: 0
            }
        );
        guard.publish(snapshot("fp1"));

        assert_eq!(store.status("fp1"), IndexStatus::Ready);
        assert!(store.get("fp1").is_ok());
        assert!(matches!(
            store.get("missing"),
            Err(RepoLensError::NotIndexed(_))
        ));
    }

    #[test]
    fn test_dropped_guard_publishes_nothing() {
        let store = Arc::new(IndexStore::new(4));
        {
            let _guard = store.begin_build("fp1", 10);
            assert!(matches!(store.status("fp1"), IndexStatus::Building { .. }));
        }
        assert_eq!(store.status("fp1"), IndexStatus::NotFound);
        assert!(store.get("fp1").is_err());
    }

    #[test]
    fn test_lru_eviction_by_query_recency() {
        let store = Arc::new(IndexStore::new(2));
        store.begin_build("a", 0).publish(snapshot("a"));
        store.begin_build("b", 0).publish(snapshot("b"));

        // Touch "a" so "b" is the least recently queried.
        store.get("a").unwrap();

        store.begin_build("c", 0).publish(snapshot("c"));

        assert_eq!(store.status("b"), IndexStatus::Evicted);
        assert!(matches!(store.get("b"), Err(RepoLensError::Evicted(_))));
        assert!(store.get("a").is_ok());
        assert!(store.get("c").is_ok());
    }

    #[test]
    fn test_republish_after_eviction_clears_hint() {
        let store = Arc::new(IndexStore::new(1));
        store.begin_build("a", 0).publish(snapshot("a"));
        store.begin_build("b", 0).publish(snapshot("b"));
        assert_eq!(store.status("a"), IndexStatus::Evicted);

        store.begin_build("a", 0).publish(snapshot("a"));
        assert_eq!(store.status("a"), IndexStatus::Ready);
    }

    #[tokio::test]
    async fn test_build_lock_is_shared_per_fingerprint() {
        let store = Arc::new(IndexStore::new(4));
        let l1 = store.build_lock("fp");
        let l2 = store.build_lock("fp");
        assert!(Arc::ptr_eq(&l1, &l2));

        let guard = l1.lock().await;
        assert!(l2.try_lock().is_err());
        drop(guard);
        assert!(l2.try_lock().is_ok());
    }
}
