//! # Registry Module
//!
//! A concurrent keyed map used for the function catalog, correlation
//! sinks, and other per-key resources. Reads are common; writes are bursty
//! at startup and per-call, so a reader/writer lock fits the access
//! pattern.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

/// Thread-safe map with cloned-value reads.
#[derive(Debug)]
pub struct SafeRegistry<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SafeRegistry<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SafeRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the value for a key, replacing any existing entry.
    pub fn store(&self, key: K, value: V) {
        self.write().insert(key, value);
    }

    /// Returns a clone of the value stored for a key.
    pub fn load(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    /// Deletes the value for a key, returning it if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    /// Returns the existing value for the key if present, otherwise stores
    /// and returns the given value.
    pub fn load_or_store(&self, key: K, value: V) -> V {
        let mut guard = self.write();
        guard.entry(key).or_insert(value).clone()
    }

    /// Calls `visit` for each entry; returning `false` stops the walk.
    pub fn for_each(&self, mut visit: impl FnMut(&K, &V) -> bool) {
        for (key, value) in self.read().iter() {
            if !visit(key, value) {
                break;
            }
        }
    }

    /// Snapshot of all values.
    pub fn values(&self) -> Vec<V> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<K, V>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_remove() {
        let map: SafeRegistry<String, u32> = SafeRegistry::new();
        map.store("a".into(), 1);
        assert_eq!(map.load(&"a".to_string()), Some(1));
        assert_eq!(map.remove(&"a".to_string()), Some(1));
        assert_eq!(map.load(&"a".to_string()), None);
    }

    #[test]
    fn load_or_store_keeps_existing() {
        let map: SafeRegistry<String, u32> = SafeRegistry::new();
        assert_eq!(map.load_or_store("k".into(), 1), 1);
        assert_eq!(map.load_or_store("k".into(), 2), 1);
    }

    #[test]
    fn for_each_stops_on_false() {
        let map: SafeRegistry<u32, u32> = SafeRegistry::new();
        for i in 0..10 {
            map.store(i, i);
        }
        let mut seen = 0;
        map.for_each(|_, _| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn concurrent_access() {
        use std::sync::Arc;
        let map: Arc<SafeRegistry<u32, u32>> = Arc::new(SafeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        map.store(i * 100 + j, j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 800);
    }
}
