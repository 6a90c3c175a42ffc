//! Remote repository cache with single-flight creation.
//!
//! One abstraction serves both topologies: peer clusters use a bounded LRU
//! with a TTL, federation keeps every entry for the life of the cache. A key
//! is created remotely at most once while its entry is live, even when many
//! units race on it.

use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use crate::error::{ReplError, ReplResult};
use crate::model::{ClusterInfo, RepositoryDetail};

/// Eviction policy of a [`RemoteRepoCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// At most `capacity` entries, each living at most `ttl`.
    Bounded {
        /// Maximum live entries.
        capacity: usize,
        /// Entry lifetime.
        ttl: Duration,
    },
    /// Keep everything; for small fixed peer sets.
    Unbounded,
}

/// Cache key of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoCacheKey {
    /// Cluster identity.
    pub cluster: String,
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
}

impl RepoCacheKey {
    /// Build the key for a repository on `cluster`.
    pub fn new(cluster: &ClusterInfo, project_id: &str, repo_name: &str) -> Self {
        Self {
            cluster: cluster.identity(),
            project_id: project_id.to_string(),
            repo_name: repo_name.to_string(),
        }
    }
}

struct Slot<V> {
    cell: Arc<OnceCell<V>>,
    inserted_at: Instant,
}

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            inserted_at: self.inserted_at,
        }
    }
}

enum Slots<K: Hash + Eq, V> {
    Bounded { lru: LruCache<K, Slot<V>>, ttl: Duration },
    Unbounded(HashMap<K, Slot<V>>),
}

/// Hit/miss counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a live entry.
    pub hits: u64,
    /// Lookups that had to run the loader.
    pub misses: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
}

/// Single-flight async cache parameterised by [`EvictionPolicy`].
pub struct SingleFlightCache<K: Hash + Eq, V> {
    slots: Mutex<Slots<K, V>>,
    stats: Mutex<CacheStats>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache with the given policy.
    pub fn new(policy: EvictionPolicy) -> Self {
        let slots = match policy {
            EvictionPolicy::Bounded { capacity, ttl } => {
                let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
                Slots::Bounded {
                    lru: LruCache::new(capacity),
                    ttl,
                }
            }
            EvictionPolicy::Unbounded => Slots::Unbounded(HashMap::new()),
        };
        Self {
            slots: Mutex::new(slots),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    fn slot_for(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *slots {
            Slots::Bounded { lru, ttl } => {
                if let Some(slot) = lru.get(key) {
                    if slot.inserted_at.elapsed() <= *ttl {
                        return slot.clone();
                    }
                    lru.pop(key);
                    self.bump(|s| s.expirations += 1);
                }
                let slot = Slot {
                    cell: Arc::new(OnceCell::new()),
                    inserted_at: Instant::now(),
                };
                lru.push(key.clone(), slot.clone());
                slot
            }
            Slots::Unbounded(map) => map
                .entry(key.clone())
                .or_insert_with(|| Slot {
                    cell: Arc::new(OnceCell::new()),
                    inserted_at: Instant::now(),
                })
                .clone(),
        }
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }

    /// Return the cached value or run `load` once for all concurrent callers.
    ///
    /// A failed load leaves the entry empty so the next caller retries it.
    pub async fn get_or_try_load<F, Fut>(&self, key: K, load: F) -> ReplResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReplResult<V>>,
    {
        let slot = self.slot_for(&key);
        if let Some(value) = slot.cell.get() {
            self.bump(|s| s.hits += 1);
            return Ok(value.clone());
        }
        let mut loaded = false;
        let value = slot
            .cell
            .get_or_try_init(|| {
                loaded = true;
                load()
            })
            .await?;
        if loaded {
            self.bump(|s| s.misses += 1);
        } else {
            self.bump(|s| s.hits += 1);
        }
        Ok(value.clone())
    }

    /// Cached value without loading.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = match &mut *slots {
            Slots::Bounded { lru, ttl } => lru
                .get(key)
                .filter(|s| s.inserted_at.elapsed() <= *ttl)
                .cloned(),
            Slots::Unbounded(map) => map.get(key).cloned(),
        };
        slot.and_then(|s| s.cell.get().cloned())
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *slots {
            Slots::Bounded { lru, .. } => {
                lru.pop(key);
            }
            Slots::Unbounded(map) => {
                map.remove(key);
            }
        }
    }

    /// Number of entries, loaded or in flight.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match &*slots {
            Slots::Bounded { lru, .. } => lru.len(),
            Slots::Unbounded(map) => map.len(),
        }
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Cache of repositories created on remote clusters.
pub type RemoteRepoCache = SingleFlightCache<RepoCacheKey, RepositoryDetail>;

impl RemoteRepoCache {
    /// Fetch `key`, creating the repository remotely on a miss.
    ///
    /// A remote repository whose type differs from `expected` aborts the run.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: RepoCacheKey,
        expected: crate::model::RepositoryType,
        create: F,
    ) -> ReplResult<RepositoryDetail>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ReplResult<RepositoryDetail>>,
    {
        let detail = self
            .get_or_try_load(key.clone(), || async move {
                let detail = create().await?;
                if detail.repo_type != expected {
                    return Err(ReplError::RepoTypeConflict {
                        project_id: key.project_id.clone(),
                        repo_name: key.repo_name.clone(),
                        expected: expected.to_string(),
                        actual: detail.repo_type.to_string(),
                    });
                }
                Ok(detail)
            })
            .await?;
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusterType, RepositoryCategory, RepositoryType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn detail(name: &str, repo_type: RepositoryType) -> RepositoryDetail {
        RepositoryDetail {
            project_id: "proj".into(),
            name: name.into(),
            repo_type,
            category: RepositoryCategory::Local,
            public: false,
            description: None,
            configuration: serde_json::Value::Null,
            storage_key: None,
            created_by: "admin".into(),
        }
    }

    fn key(repo: &str) -> RepoCacheKey {
        let cluster = ClusterInfo::new("c1", "peer", "http://peer", ClusterType::Standalone);
        RepoCacheKey::new(&cluster, "proj", repo)
    }

    #[tokio::test]
    async fn test_single_load_per_key() {
        let cache = RemoteRepoCache::new(EvictionPolicy::Unbounded);
        let calls = AtomicUsize::new(0);

        for _ in 0..10 {
            let repo = cache
                .get_or_create(key("generic-local"), RepositoryType::Generic, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(detail("generic-local", RepositoryType::Generic))
                })
                .await
                .unwrap();
            assert_eq!(repo.name, "generic-local");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 9);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let cache = Arc::new(RemoteRepoCache::new(EvictionPolicy::Bounded {
            capacity: 50,
            ttl: Duration::from_secs(60),
        }));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create(key("shared"), RepositoryType::Generic, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok(detail("shared", RepositoryType::Generic))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache = RemoteRepoCache::new(EvictionPolicy::Unbounded);
        let first = cache
            .get_or_create(key("r"), RepositoryType::Generic, || async {
                Err(ReplError::remote("connection reset"))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_create(key("r"), RepositoryType::Generic, || async {
                Ok(detail("r", RepositoryType::Generic))
            })
            .await;
        assert!(second.is_ok());
        assert!(cache.get(&key("r")).is_some());
    }

    #[tokio::test]
    async fn test_type_conflict_is_fatal() {
        let cache = RemoteRepoCache::new(EvictionPolicy::Unbounded);
        let err = cache
            .get_or_create(key("r"), RepositoryType::Generic, || async {
                Ok(detail("r", RepositoryType::Maven))
            })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(cache.get(&key("r")).is_none());
    }

    #[tokio::test]
    async fn test_bounded_capacity_evicts_lru() {
        let cache = RemoteRepoCache::new(EvictionPolicy::Bounded {
            capacity: 2,
            ttl: Duration::from_secs(60),
        });
        for name in ["a", "b", "c"] {
            cache
                .get_or_create(key(name), RepositoryType::Generic, || async move {
                    Ok(detail(name, RepositoryType::Generic))
                })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[tokio::test]
    async fn test_bounded_ttl_expires() {
        let cache = RemoteRepoCache::new(EvictionPolicy::Bounded {
            capacity: 10,
            ttl: Duration::ZERO,
        });
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_create(key("r"), RepositoryType::Generic, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(detail("r", RepositoryType::Generic))
                })
                .await
                .unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_invalidate() {
        let cache: SingleFlightCache<String, u32> = SingleFlightCache::new(EvictionPolicy::Unbounded);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            cache
                .get_or_try_load("k".to_string(), || async { Ok(7) })
                .await
                .unwrap();
        });
        assert_eq!(cache.get(&"k".to_string()), Some(7));
        cache.invalidate(&"k".to_string());
        assert!(cache.is_empty());
    }
}
