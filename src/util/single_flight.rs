//! Keyed memoization with per-key single flight
//!
//! The map lock is held only to find or create a key's cell, never while a
//! value is being computed. Concurrent callers for the same key wait on that
//! key's cell and share the first successful result; failures are not stored.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

pub struct OnceMap<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<OnceCell<V>>>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cell(&self, key: K) -> Arc<OnceCell<V>> {
        self.lock()
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Returns the stored value without computing anything.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Returns the stored value or runs `init` to produce it.
    ///
    /// An existing value is authoritative and is returned as is.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key.clone());
        let result = cell.get_or_try_init(init).await.cloned();
        if result.is_err() {
            self.forget_failed(&key, &cell);
        }
        result
    }

    /// Drops an empty cell once no other caller is waiting on it.
    fn forget_failed(&self, key: &K, cell: &Arc<OnceCell<V>>) {
        let mut cells = self.lock();
        let idle = cells.get(key).is_some_and(|stored| {
            Arc::ptr_eq(stored, cell) && !stored.initialized() && Arc::strong_count(stored) == 2
        });
        if idle {
            cells.remove(key);
        }
    }

    /// Stores `value` unless the key already has one; returns the stored value.
    pub fn insert(&self, key: K, value: V) -> V {
        let cell = self.cell(key);
        match cell.set(value.clone()) {
            Ok(()) => value,
            Err(_) => cell.get().cloned().unwrap_or(value),
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_value_is_computed_once() {
        let map: OnceMap<String, u32> = OnceMap::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = map
                .get_or_try_init("k".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let map: OnceMap<&'static str, u32> = OnceMap::new();

        let first = map.get_or_try_init("k", || async { Err::<u32, _>("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert!(map.get(&"k").is_none());
        assert!(map.is_empty());

        let second = map.get_or_try_init("k", || async { Ok::<_, &str>(3) }).await;
        assert_eq!(second, Ok(3));
    }

    #[tokio::test]
    async fn test_failed_keys_leave_no_cells_behind() {
        let map: OnceMap<u32, u32> = OnceMap::new();

        for key in 0..10 {
            let result = map.get_or_try_init(key, || async { Err::<u32, _>("missing") }).await;
            assert!(result.is_err());
        }

        assert!(map.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let map: Arc<OnceMap<String, u32>> = Arc::new(OnceMap::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let map = map.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                map.get_or_try_init("same".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, ()>(42)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_insert_keeps_first_value() {
        let map: OnceMap<u8, &'static str> = OnceMap::new();
        assert_eq!(map.insert(1, "first"), "first");
        assert_eq!(map.insert(1, "second"), "first");
        assert_eq!(map.get(&1), Some("first"));
    }
}
