use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tokio::sync::RwLock;

use crate::types::MetaStore;

/// Process-local store with the same revision semantics as etcd.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetaStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    kv: BTreeMap<String, (Vec<u8>, u64)>,
}

impl Inner {
    fn next_revision(&mut self) -> u64 {
        self.revision = self.revision.saturating_add(1);
        self.revision
    }

    fn current_revision(&self, key: &str) -> u64 {
        self.kv.get(key).map(|(_, rev)| *rev).unwrap_or(0)
    }

    fn insert(&mut self, key: &str, value: Vec<u8>) -> u64 {
        let rev = self.next_revision();
        self.kv.insert(key.to_string(), (value, rev));
        rev
    }
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MetaStore for MemoryMetaStore {
    async fn put(&self, key: &str, value: Vec<u8>, _ttl_ms: Option<u64>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        Ok(inner.insert(key, value))
    }

    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        Ok(inner.kv.get(key).map(|(v, rev)| (v.clone(), *rev)))
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.kv.remove(key);
        Ok(inner.next_revision())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        let out = inner
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (v, rev))| (k.clone(), v.clone(), *rev))
            .collect();
        Ok(out)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)> {
        let mut inner = self.inner.write().await;
        let current_rev = inner.current_revision(key);
        if current_rev != expected_revision {
            return Ok((false, current_rev));
        }
        Ok((true, inner.insert(key, value)))
    }

    async fn compare_and_delete(&self, key: &str, expected_revision: u64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.kv.contains_key(key) || inner.current_revision(key) != expected_revision {
            return Ok(false);
        }
        inner.kv.remove(key);
        inner.next_revision();
        Ok(true)
    }

    async fn put_guarded(
        &self,
        guard_key: &str,
        guard_revision: u64,
        key: &str,
        value: Vec<u8>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.current_revision(guard_key) != guard_revision {
            return Ok(false);
        }
        inner.insert(key, value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_and_swap_creates_only_when_absent() {
        let store = MemoryMetaStore::new();

        let (ok, rev) = store.compare_and_swap("/k", 0, b"a".to_vec()).await.unwrap();
        assert!(ok);

        let (ok, current) = store.compare_and_swap("/k", 0, b"b".to_vec()).await.unwrap();
        assert!(!ok);
        assert_eq!(current, rev);

        let (value, _) = store.get("/k").await.unwrap().unwrap();
        assert_eq!(value, b"a".to_vec());
    }

    #[tokio::test]
    async fn test_compare_and_delete_checks_revision() {
        let store = MemoryMetaStore::new();
        let rev = store.put("/k", b"a".to_vec(), None).await.unwrap();

        assert!(!store.compare_and_delete("/k", rev + 1).await.unwrap());
        assert!(store.compare_and_delete("/k", rev).await.unwrap());
        assert!(store.get("/k").await.unwrap().is_none());
        assert!(!store.compare_and_delete("/k", rev).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_guarded_follows_guard_key() {
        let store = MemoryMetaStore::new();
        let guard = store.put("/lock", b"me".to_vec(), None).await.unwrap();

        assert!(store.put_guarded("/lock", guard, "/row", b"1".to_vec()).await.unwrap());

        // Re-acquired by someone else: the old guard revision no longer matches.
        store.delete("/lock").await.unwrap();
        store.put("/lock", b"other".to_vec(), None).await.unwrap();
        assert!(!store.put_guarded("/lock", guard, "/row", b"2".to_vec()).await.unwrap());

        let (value, _) = store.get("/row").await.unwrap().unwrap();
        assert_eq!(value, b"1".to_vec());
    }

    #[tokio::test]
    async fn test_list_prefix_is_bounded() {
        let store = MemoryMetaStore::new();
        store.put("/a/1", vec![], None).await.unwrap();
        store.put("/a/2", vec![], None).await.unwrap();
        store.put("/b/1", vec![], None).await.unwrap();

        let keys: Vec<String> = store
            .list_prefix("/a/")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _, _)| k)
            .collect();
        assert_eq!(keys, vec!["/a/1".to_string(), "/a/2".to_string()]);
    }
}
