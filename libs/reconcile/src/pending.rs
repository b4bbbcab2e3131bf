//! Deletion costs decided locally but not yet visible through list queries.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::RwLock;

/// Process-local record of in-flight assignments.
///
/// An entry is written as soon as a cost is chosen for a pod and removed once
/// the pod is observed carrying its annotation (or the write is known to have
/// been rejected). Sibling allocations consult it so a cost that is still in
/// flight is not handed out twice.
///
/// Nothing is persisted. After a restart the in-use set is rebuilt from pod
/// annotations alone.
#[derive(Debug)]
pub struct PendingAssignments<K, V = i32> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for PendingAssignments<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PendingAssignments<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Values for the keys that have an entry, in key order. Missing keys are
    /// skipped.
    pub async fn get_all<'a, I>(&self, keys: I) -> Vec<V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let entries = self.entries.read().await;
        keys.into_iter()
            .filter_map(|key| entries.get(key).cloned())
            .collect()
    }

    /// Record an assignment, replacing any previous one for the key.
    pub async fn set(&self, key: K, value: V) {
        self.entries.write().await.insert(key, value);
    }

    /// Remove an assignment. Returns the value that was recorded, if any.
    pub async fn delete(&self, key: &K) -> Option<V> {
        self.entries.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_basic_operations() {
        let pending = PendingAssignments::<String>::new();

        pending.set("a".to_string(), 1).await;
        assert_eq!(pending.get(&"a".to_string()).await, Some(1));
        assert!(pending.contains(&"a".to_string()).await);
        assert!(!pending.contains(&"b".to_string()).await);

        pending.set("b".to_string(), 2).await;
        pending.set("c".to_string(), 3).await;
        let keys = ["a".to_string(), "b".to_string(), "x".to_string()];
        assert_eq!(pending.get_all(keys.iter()).await, vec![1, 2]);

        assert_eq!(pending.delete(&"a".to_string()).await, Some(1));
        assert_eq!(pending.get(&"a".to_string()).await, None);
        assert_eq!(pending.delete(&"a".to_string()).await, None);
        assert_eq!(pending.len().await, 2);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let pending = PendingAssignments::<u32>::new();
        pending.set(7, 10).await;
        pending.set(7, 11).await;
        assert_eq!(pending.get(&7).await, Some(11));
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_all_empty() {
        let pending = PendingAssignments::<u32>::new();
        assert!(pending.get_all([1, 2, 3].iter()).await.is_empty());
        assert!(pending.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access() {
        let pending = Arc::new(PendingAssignments::<u32, String>::new());
        let n = 1000;

        let mut handles = Vec::with_capacity(n * 2);
        for i in 0..n as u32 {
            let writer = Arc::clone(&pending);
            handles.push(tokio::spawn(async move {
                writer.set(i, format!("val{i}")).await;
            }));
            let reader = Arc::clone(&pending);
            handles.push(tokio::spawn(async move {
                let _ = reader.get(&i).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..n as u32 {
            assert_eq!(pending.get(&i).await, Some(format!("val{i}")));
        }
    }
}
