//! In-memory store used by tests and dry runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Result, Store};

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// A `Store` backed by process memory.
///
/// Semantics mirror the Redis adapter closely enough for pipeline tests:
/// sorted set iteration, trailing-`*` pattern matching, and last-write-wins
/// string values. Per-key expiry is accepted but not enforced (tests never
/// sleep past a TTL).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<()> {
        self.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.strings.remove(key);
        inner.lists.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.lists.keys())
            .chain(inner.sets.keys())
            .filter(|k| matches(pattern, k))
            .cloned()
            .collect();
        // Deterministic order for reproducible tests
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .lists
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_add(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(value);
            if set.is_empty() {
                inner.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_all(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_delete() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_preserves_append_order() {
        let store = InMemoryStore::new();
        store.list_append("l", "a").await.unwrap();
        store.list_append("l", "b").await.unwrap();
        store.list_append("l", "a").await.unwrap();
        assert_eq!(store.list_all("l").await.unwrap(), vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn set_deduplicates_and_removes() {
        let store = InMemoryStore::new();
        store.set_add("s", "x").await.unwrap();
        store.set_add("s", "x").await.unwrap();
        store.set_add("s", "y").await.unwrap();
        assert_eq!(store.set_all("s").await.unwrap(), vec!["x", "y"]);

        store.set_remove("s", "x").await.unwrap();
        assert_eq!(store.set_all("s").await.unwrap(), vec!["y"]);

        // Removing a missing member is a no-op
        store.set_remove("s", "z").await.unwrap();
        assert_eq!(store.set_all("s").await.unwrap(), vec!["y"]);
    }

    #[tokio::test]
    async fn keys_matching_trailing_glob() {
        let store = InMemoryStore::new();
        store.set("relay:postComment_1", "{}").await.unwrap();
        store.set("relay:rooms", "[]").await.unwrap();
        store.set("other:key", "{}").await.unwrap();
        store.list_append("relay:handled", "k").await.unwrap();

        let keys = store.keys_matching("relay:*").await.unwrap();
        assert_eq!(
            keys,
            vec!["relay:handled", "relay:postComment_1", "relay:rooms"]
        );
    }

    #[tokio::test]
    async fn delete_clears_all_kinds() {
        let store = InMemoryStore::new();
        store.list_append("k", "a").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.list_all("k").await.unwrap().is_empty());
    }
}
