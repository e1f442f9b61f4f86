use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A mutex that allows locking based on a key (e.g., user ID).
/// This prevents global locking when only user-scoped synchronization is needed.
#[derive(Debug, Clone)]
pub struct KeyedMutex {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Acquires a lock for the given key.
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        mutex.lock_owned().await
    }

    /// Removes locks that are not currently held by any task.
    pub fn cleanup(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for KeyedMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serialises() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock("user-1").await;

        let contender = mutex.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.lock("user-1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let mutex = KeyedMutex::new();
        let _a = mutex.lock("user-1").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), mutex.lock("user-2"))
            .await
            .expect("distinct keys must not contend");
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_locks() {
        let mutex = KeyedMutex::new();
        {
            let _guard = mutex.lock("user-1").await;
            mutex.cleanup();
            assert_eq!(mutex.len(), 1);
        }
        mutex.cleanup();
        assert!(mutex.is_empty());
    }
}
