//! Resource caches and the process-wide context that owns them.
//!
//! There is exactly one [`ResourceCache`] and at most one [`ResourceWatcher`] per
//! resource kind. Both live in a [`ResourceContext`] that is created once at startup
//! and handed to every service client, instead of being hidden in statics.

#![warn(clippy::all, rust_2018_idioms)]

use super::resource_info::{ResourceInfo, ResourceKind, ResourceMap};
use super::service_client::ServiceClient;
use super::watcher::ResourceWatcher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

// ============================================================================
// ResourceCache
// ============================================================================

/// Name -> resource map for one resource kind.
///
/// The map is held behind an `Arc` and replaced wholesale, so a reader always sees
/// a complete snapshot: either the map before a swap or the map after it.
#[derive(Debug)]
pub struct ResourceCache {
    kind: ResourceKind,
    map: RwLock<Arc<ResourceMap>>,
}

impl ResourceCache {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            map: RwLock::new(Arc::new(ResourceMap::new())),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<ResourceInfo> {
        self.snapshot().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// The current map. Later swaps do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Arc<ResourceMap> {
        match self.map.read() {
            Ok(map) => Arc::clone(&map),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole map.
    pub fn swap(&self, new_map: ResourceMap) {
        let new_map = Arc::new(new_map);
        match self.map.write() {
            Ok(mut map) => *map = new_map,
            Err(poisoned) => *poisoned.into_inner() = new_map,
        }
    }

    /// Insert or replace one entry, publishing a new snapshot.
    pub fn insert(&self, info: ResourceInfo) {
        self.update(|map| {
            map.insert(info.name.clone(), info);
        });
    }

    pub fn remove(&self, name: &str) -> Option<ResourceInfo> {
        let mut removed = None;
        self.update(|map| removed = map.remove(name));
        removed
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn update<F: FnOnce(&mut ResourceMap)>(&self, f: F) {
        let mut guard = match self.map.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Copy-on-write: readers holding the old Arc keep their snapshot
        f(Arc::make_mut(&mut guard));
    }
}

// ============================================================================
// ResourceContext
// ============================================================================

/// Process-scoped owner of the per-kind caches and watchers.
#[derive(Default)]
pub struct ResourceContext {
    caches: Mutex<HashMap<ResourceKind, Arc<ResourceCache>>>,
    watchers: Mutex<HashMap<ResourceKind, Arc<ResourceWatcher>>>,
}

impl ResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache for `kind`, created on first use.
    pub fn cache_for(&self, kind: ResourceKind) -> Arc<ResourceCache> {
        let mut caches = match self.caches.lock() {
            Ok(caches) => caches,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            caches
                .entry(kind)
                .or_insert_with(|| Arc::new(ResourceCache::new(kind))),
        )
    }

    /// The watcher for `kind`. The first caller's client and interval win; later
    /// callers get the existing instance.
    pub fn watcher_for(
        &self,
        kind: ResourceKind,
        client: &Arc<ServiceClient>,
        interval_secs: i64,
    ) -> Arc<ResourceWatcher> {
        let mut watchers = match self.watchers.lock() {
            Ok(watchers) => watchers,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            watchers
                .entry(kind)
                .or_insert_with(|| Arc::new(ResourceWatcher::start(client, interval_secs))),
        )
    }

    pub fn existing_watcher(&self, kind: ResourceKind) -> Option<Arc<ResourceWatcher>> {
        match self.watchers.lock() {
            Ok(watchers) => watchers.get(&kind).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&kind).cloned(),
        }
    }

    /// Stop every watcher. Caches are kept; they are only ever replaced.
    pub fn dispose(&self) {
        let watchers: Vec<Arc<ResourceWatcher>> = {
            let mut watchers = match self.watchers.lock() {
                Ok(watchers) => watchers,
                Err(poisoned) => poisoned.into_inner(),
            };
            watchers.drain().map(|(_, w)| w).collect()
        };
        for watcher in watchers {
            watcher.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(name: &str) -> ResourceInfo {
        ResourceInfo::new(ResourceKind::Queue, name).with_arn(format!("arn:aws:sqs:r:1:{}", name))
    }

    #[test]
    fn test_insert_get_remove() {
        let cache = ResourceCache::new(ResourceKind::Queue);
        assert!(cache.is_empty());

        cache.insert(queue("orders"));
        assert!(cache.contains("orders"));
        assert_eq!(cache.get("orders").unwrap().name, "orders");

        assert!(cache.remove("orders").is_some());
        assert!(cache.remove("orders").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let cache = ResourceCache::new(ResourceKind::Queue);
        cache.insert(queue("a"));
        let before = cache.snapshot();

        cache.insert(queue("b"));
        let mut replacement = ResourceMap::new();
        replacement.insert("c".into(), queue("c"));
        cache.swap(replacement);

        assert_eq!(before.len(), 1);
        assert!(before.contains_key("a"));
        let after = cache.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.contains_key("c"));
    }

    #[test]
    fn test_context_hands_out_one_cache_per_kind() {
        let context = ResourceContext::new();
        let a = context.cache_for(ResourceKind::Topic);
        let b = context.cache_for(ResourceKind::Topic);
        let c = context.cache_for(ResourceKind::Queue);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.kind(), ResourceKind::Queue);
    }

    #[test]
    fn test_dispose_without_watchers_is_noop() {
        let context = ResourceContext::new();
        context.dispose();
        context.dispose();
        assert!(context.existing_watcher(ResourceKind::Queue).is_none());
    }
}
