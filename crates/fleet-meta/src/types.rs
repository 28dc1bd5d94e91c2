use anyhow::Result;
use async_trait::async_trait;

/// Revisioned key/value storage shared by every supervisor instance.
///
/// Revisions are store-wide and strictly increasing. A missing key reports
/// revision 0, so a compare against 0 means "create if absent".
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>, ttl_ms: Option<u64>) -> Result<u64>;
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>>;
    async fn delete(&self, key: &str) -> Result<u64>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>>;

    /// Write `value` only if `key` is still at `expected_revision`.
    /// Returns whether the write happened and the revision now current for `key`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)>;

    /// Delete `key` only if it is still at `expected_revision`.
    async fn compare_and_delete(&self, key: &str, expected_revision: u64) -> Result<bool>;

    /// Write `key` only while `guard_key` is still at `guard_revision`.
    async fn put_guarded(
        &self,
        guard_key: &str,
        guard_revision: u64,
        key: &str,
        value: Vec<u8>,
    ) -> Result<bool>;
}
