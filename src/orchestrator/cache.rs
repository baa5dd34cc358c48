//! Process-wide cache of state managers keyed by subject.
//!
//! Each subject gets one `tokio::sync::Mutex`-guarded manager, so two runs
//! for the same subject inside this process are serialized. Entries are
//! evicted least-recently-used past `capacity`, and after `idle_ttl`
//! without access. Entries whose handle is still held elsewhere are never
//! evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::manager::WorkflowStateManager;
use super::store::StateStore;
use crate::errors::StoreError;

pub type ManagerHandle = Arc<Mutex<WorkflowStateManager>>;

struct Entry {
    manager: ManagerHandle,
    last_access: Instant,
    tick: u64,
}

impl Entry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.manager) > 1
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    clock: u64,
}

pub struct ManagerCache {
    store: Arc<dyn StateStore>,
    capacity: usize,
    idle_ttl: Duration,
    entries: StdMutex<Entries>,
}

impl ManagerCache {
    pub fn new(store: Arc<dyn StateStore>, capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            idle_ttl,
            entries: StdMutex::new(Entries::default()),
        }
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Cached manager for `subject_id`, loading it from the store on a miss.
    pub fn get_or_load(&self, subject_id: &str) -> Result<ManagerHandle, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        Self::expire(&mut entries, now, self.idle_ttl);

        entries.clock += 1;
        let tick = entries.clock;
        if let Some(entry) = entries.map.get_mut(subject_id) {
            entry.last_access = now;
            entry.tick = tick;
            return Ok(Arc::clone(&entry.manager));
        }

        let manager = WorkflowStateManager::load(subject_id, Arc::clone(&self.store))?;
        let handle = Arc::new(Mutex::new(manager));
        while entries.map.len() >= self.capacity {
            if !Self::evict_lru(&mut entries) {
                break;
            }
        }
        entries.map.insert(
            subject_id.to_string(),
            Entry {
                manager: Arc::clone(&handle),
                last_access: now,
                tick,
            },
        );
        Ok(handle)
    }

    /// Drop the cached manager for `subject_id`. Returns whether one was cached.
    pub fn evict(&self, subject_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.map.remove(subject_id).is_some()
    }

    /// Drop every idle entry older than the TTL; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::expire(&mut entries, Instant::now(), self.idle_ttl)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .contains_key(subject_id)
    }

    fn expire(entries: &mut Entries, now: Instant, ttl: Duration) -> usize {
        let before = entries.map.len();
        entries
            .map
            .retain(|_, e| e.in_use() || now.duration_since(e.last_access) < ttl);
        let dropped = before - entries.map.len();
        if dropped > 0 {
            debug!(dropped, "expired idle state managers");
        }
        dropped
    }

    fn evict_lru(entries: &mut Entries) -> bool {
        let victim = entries
            .map
            .iter()
            .filter(|(_, e)| !e.in_use())
            .min_by_key(|(_, e)| e.tick)
            .map(|(k, _)| k.clone());
        match victim {
            Some(subject) => {
                debug!(%subject, "evicting least recently used state manager");
                entries.map.remove(&subject);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::store::FileStore;
    use tempfile::TempDir;

    fn cache(capacity: usize, ttl: Duration) -> (ManagerCache, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store = Arc::new(FileStore::under(dir.path()));
        (ManagerCache::new(store, capacity, ttl), dir)
    }

    #[test]
    fn test_same_subject_shares_manager() {
        let (cache, _dir) = cache(4, Duration::from_secs(60));
        let a = cache.get_or_load("u1").unwrap();
        let b = cache.get_or_load("u1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (cache, _dir) = cache(2, Duration::from_secs(60));
        drop(cache.get_or_load("a").unwrap());
        drop(cache.get_or_load("b").unwrap());
        drop(cache.get_or_load("a").unwrap());
        drop(cache.get_or_load("c").unwrap());
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_held_handles_survive_eviction() {
        let (cache, _dir) = cache(1, Duration::ZERO);
        let held = cache.get_or_load("a").unwrap();
        drop(cache.get_or_load("b").unwrap());
        assert!(cache.contains("a"));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains("a"));
        drop(held);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_removes_entry() {
        let (cache, _dir) = cache(4, Duration::from_secs(60));
        drop(cache.get_or_load("u1").unwrap());
        assert!(cache.evict("u1"));
        assert!(!cache.evict("u1"));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_detected() {
        let (cache, _dir) = cache(4, Duration::from_secs(60));
        let handle = cache.get_or_load("u1").unwrap();
        let _guard = handle.lock().await;
        let again = cache.get_or_load("u1").unwrap();
        assert!(again.try_lock().is_err());
    }
}
