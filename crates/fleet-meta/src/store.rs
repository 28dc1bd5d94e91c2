use std::collections::HashSet;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use fleet_common::{
    new_id, now_ms, Cluster, ClusterFilter, ClusterInstallation, ClusterInstallationFilter,
    Installation, InstallationFilter,
};

use crate::error::StoreError;
use crate::types::MetaStore;

const INSTALLATIONS: &str = "/installations/";
const CLUSTERS: &str = "/clusters/";
const CLUSTER_INSTALLATIONS: &str = "/cluster_installations/";
const INSTALLATION_LOCKS: &str = "/locks/installations/";
const CLUSTER_LOCKS: &str = "/locks/clusters/";

pub type StoreResult<T> = Result<T, StoreError>;

/// Value stored at a lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub locker_id: String,
    pub acquired_at_ms: u64,
}

/// Proof of a held lock: the revision its record was written at.
///
/// Writes made on behalf of a lock holder are conditioned on the record still
/// being at this revision, so a lock that was force-released (or released and
/// re-acquired) can no longer be written through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub locker_id: String,
    pub revision: u64,
}

/// Typed persistence for installations, clusters and cluster installations
/// on top of a [`MetaStore`].
#[derive(Debug, Clone, Default)]
pub struct FleetStore<M> {
    meta: M,
}

impl<M: MetaStore> FleetStore<M> {
    pub fn new(meta: M) -> Self {
        Self { meta }
    }

    // ── installations ───────────────────────────────────────────────

    /// Store a new installation, assigning an id and creation time when unset.
    pub async fn create_installation(
        &self,
        mut installation: Installation,
    ) -> StoreResult<Installation> {
        if installation.id.is_empty() {
            installation.id = new_id();
        }
        installation.create_at_ms = now_ms();
        let key = format!("{INSTALLATIONS}{}", installation.id);
        self.create(&key, "installation", &installation.id, &installation)
            .await?;
        Ok(installation)
    }

    pub async fn get_installation(&self, id: &str) -> StoreResult<Option<Installation>> {
        self.fetch(&format!("{INSTALLATIONS}{id}")).await
    }

    pub async fn get_installations(
        &self,
        filter: &InstallationFilter,
    ) -> StoreResult<Vec<Installation>> {
        let rows: Vec<Installation> = self.list(INSTALLATIONS).await?;
        let rows = rows.into_iter().filter(|i| filter.matches(i)).collect();
        Ok(filter.paging.apply(rows))
    }

    pub async fn update_installation(
        &self,
        installation: &Installation,
        lock: &LockToken,
    ) -> StoreResult<()> {
        let key = format!("{INSTALLATIONS}{}", installation.id);
        self.write_guarded(&key, installation, lock).await
    }

    /// Installations whose state asks for supervisor work and that nobody holds
    /// a lock on, in identity order.
    pub async fn get_unlocked_installations_pending_work(&self) -> StoreResult<Vec<Installation>> {
        let locked: HashSet<String> = self
            .meta
            .list_prefix(INSTALLATION_LOCKS)
            .await?
            .into_iter()
            .filter_map(|(k, _, _)| k.strip_prefix(INSTALLATION_LOCKS).map(str::to_string))
            .collect();

        let rows: Vec<Installation> = self.list(INSTALLATIONS).await?;
        Ok(rows
            .into_iter()
            .filter(|i| i.state.is_pending_work() && !locked.contains(&i.id))
            .collect())
    }

    pub async fn lock_installation(
        &self,
        id: &str,
        locker_id: &str,
    ) -> StoreResult<Option<LockToken>> {
        self.lock(&format!("{INSTALLATION_LOCKS}{id}"), locker_id).await
    }

    pub async fn unlock_installation(
        &self,
        id: &str,
        locker_id: &str,
        force: bool,
    ) -> StoreResult<bool> {
        self.unlock(&format!("{INSTALLATION_LOCKS}{id}"), locker_id, force)
            .await
    }

    // ── clusters ────────────────────────────────────────────────────

    pub async fn create_cluster(&self, mut cluster: Cluster) -> StoreResult<Cluster> {
        if cluster.id.is_empty() {
            cluster.id = new_id();
        }
        cluster.create_at_ms = now_ms();
        let key = format!("{CLUSTERS}{}", cluster.id);
        self.create(&key, "cluster", &cluster.id, &cluster).await?;
        Ok(cluster)
    }

    pub async fn get_cluster(&self, id: &str) -> StoreResult<Option<Cluster>> {
        self.fetch(&format!("{CLUSTERS}{id}")).await
    }

    pub async fn get_clusters(&self, filter: &ClusterFilter) -> StoreResult<Vec<Cluster>> {
        let rows: Vec<Cluster> = self.list(CLUSTERS).await?;
        let rows = rows.into_iter().filter(|c| filter.matches(c)).collect();
        Ok(filter.paging.apply(rows))
    }

    /// Clusters are owned by their own reconciler, so updates are not lock-guarded here.
    pub async fn update_cluster(&self, cluster: &Cluster) -> StoreResult<()> {
        let key = format!("{CLUSTERS}{}", cluster.id);
        self.meta.put(&key, encode(&key, cluster)?, None).await?;
        Ok(())
    }

    pub async fn lock_cluster(&self, id: &str, locker_id: &str) -> StoreResult<Option<LockToken>> {
        self.lock(&format!("{CLUSTER_LOCKS}{id}"), locker_id).await
    }

    pub async fn unlock_cluster(&self, id: &str, locker_id: &str, force: bool) -> StoreResult<bool> {
        self.unlock(&format!("{CLUSTER_LOCKS}{id}"), locker_id, force)
            .await
    }

    // ── cluster installations ───────────────────────────────────────

    /// Store a new cluster installation. When `lock` is given the write only
    /// lands while that lock is still held.
    pub async fn create_cluster_installation(
        &self,
        mut ci: ClusterInstallation,
        lock: Option<&LockToken>,
    ) -> StoreResult<ClusterInstallation> {
        if ci.id.is_empty() {
            ci.id = new_id();
        }
        ci.create_at_ms = now_ms();
        let key = format!("{CLUSTER_INSTALLATIONS}{}", ci.id);
        match lock {
            Some(lock) => self.write_guarded(&key, &ci, lock).await?,
            None => self.create(&key, "cluster installation", &ci.id, &ci).await?,
        }
        Ok(ci)
    }

    pub async fn get_cluster_installation(
        &self,
        id: &str,
    ) -> StoreResult<Option<ClusterInstallation>> {
        self.fetch(&format!("{CLUSTER_INSTALLATIONS}{id}")).await
    }

    pub async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> StoreResult<Vec<ClusterInstallation>> {
        let kvs = self.meta.list_prefix(CLUSTER_INSTALLATIONS).await?;
        let mut rows = Vec::with_capacity(kvs.len());
        for (key, bytes, _) in kvs {
            match decode::<ClusterInstallation>(&key, &bytes) {
                Ok(ci) if filter.matches(&ci) => rows.push(ci),
                Ok(_) => {}
                // A row the filter may select must not silently drop out.
                Err(e) if row_may_match(filter, &bytes) => return Err(e),
                Err(e) => tracing::warn!(%key, error=%e, "skipping undecodable record"),
            }
        }
        Ok(filter.paging.apply(rows))
    }

    pub async fn update_cluster_installation(
        &self,
        ci: &ClusterInstallation,
        lock: &LockToken,
    ) -> StoreResult<()> {
        let key = format!("{CLUSTER_INSTALLATIONS}{}", ci.id);
        self.write_guarded(&key, ci, lock).await
    }

    // ── locks ───────────────────────────────────────────────────────

    /// Release the exact lock `token` proves. A lock that was revoked and then
    /// re-acquired, even by the same locker, is left alone.
    pub async fn release_lock(&self, token: &LockToken) -> StoreResult<bool> {
        Ok(self.meta.compare_and_delete(&token.key, token.revision).await?)
    }

    // ── plumbing ────────────────────────────────────────────────────

    async fn create<T: Serialize>(
        &self,
        key: &str,
        kind: &'static str,
        id: &str,
        value: &T,
    ) -> StoreResult<()> {
        let (created, _) = self.meta.compare_and_swap(key, 0, encode(key, value)?).await?;
        if !created {
            return Err(StoreError::AlreadyExists {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.meta.get(key).await? {
            Some((bytes, _)) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Every decodable row under `prefix`. Undecodable rows are logged and skipped
    /// so one corrupt record cannot stall the whole fleet.
    async fn list<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<T>> {
        let kvs = self.meta.list_prefix(prefix).await?;
        let mut out = Vec::with_capacity(kvs.len());
        for (key, bytes, _) in kvs {
            match decode(&key, &bytes) {
                Ok(row) => out.push(row),
                Err(e) => tracing::warn!(%key, error=%e, "skipping undecodable record"),
            }
        }
        Ok(out)
    }

    async fn write_guarded<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        lock: &LockToken,
    ) -> StoreResult<()> {
        let written = self
            .meta
            .put_guarded(&lock.key, lock.revision, key, encode(key, value)?)
            .await?;
        if !written {
            return Err(StoreError::LockLost {
                key: lock.key.clone(),
            });
        }
        Ok(())
    }

    async fn lock(&self, key: &str, locker_id: &str) -> StoreResult<Option<LockToken>> {
        let record = LockRecord {
            locker_id: locker_id.to_string(),
            acquired_at_ms: now_ms(),
        };
        let (acquired, revision) = self
            .meta
            .compare_and_swap(key, 0, encode(key, &record)?)
            .await?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(LockToken {
            key: key.to_string(),
            locker_id: locker_id.to_string(),
            revision,
        }))
    }

    async fn unlock(&self, key: &str, locker_id: &str, force: bool) -> StoreResult<bool> {
        let Some((bytes, revision)) = self.meta.get(key).await? else {
            return Ok(false);
        };
        let record: LockRecord = decode(key, &bytes)?;
        if record.locker_id != locker_id && !force {
            return Ok(false);
        }
        Ok(self.meta.compare_and_delete(key, revision).await?)
    }
}

/// Ownership fields of a cluster installation row, readable even when the
/// rest of the row is not.
#[derive(Deserialize)]
struct RowOwners {
    installation_id: Option<String>,
    cluster_id: Option<String>,
}

fn row_may_match(filter: &ClusterInstallationFilter, bytes: &[u8]) -> bool {
    let Ok(owners) = serde_json::from_slice::<RowOwners>(bytes) else {
        return true;
    };
    let differs = |wanted: &Option<String>, found: &Option<String>| match (wanted, found) {
        (Some(wanted), Some(found)) => wanted != found,
        _ => false,
    };
    !differs(&filter.installation_id, &owners.installation_id)
        && !differs(&filter.cluster_id, &owners.cluster_id)
}

fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use fleet_common::{
        Affinity, ClusterInstallationState, ClusterState, DatabaseKind, FilestoreKind,
        InstallationState, Paging,
    };

    use super::*;
    use crate::memory::MemoryMetaStore;

    fn make_installation(state: InstallationState) -> Installation {
        Installation {
            id: String::new(),
            owner_id: new_id(),
            version: "version".to_string(),
            dns: "dns.example.com".to_string(),
            size: "100users".to_string(),
            license: None,
            affinity: Affinity::Isolated,
            group_id: Some(new_id()),
            state,
            filestore: FilestoreKind::MinioOperator,
            database: DatabaseKind::MysqlOperator,
            create_at_ms: 0,
            delete_at_ms: 0,
        }
    }

    fn make_store() -> FleetStore<MemoryMetaStore> {
        FleetStore::new(MemoryMetaStore::new())
    }

    #[tokio::test]
    async fn test_create_and_get_installation() {
        let store = make_store();
        let created = store
            .create_installation(make_installation(InstallationState::CreationRequested))
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        assert!(created.create_at_ms > 0);

        let fetched = store.get_installation(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get_installation("missing").await.unwrap().is_none());

        let err = store.create_installation(created).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_pending_work_skips_locked_and_settled() {
        let store = make_store();
        let pending = store
            .create_installation(make_installation(InstallationState::CreationRequested))
            .await
            .unwrap();
        let deleting = store
            .create_installation(make_installation(InstallationState::DeletionInProgress))
            .await
            .unwrap();
        store
            .create_installation(make_installation(InstallationState::Stable))
            .await
            .unwrap();

        let mut ids: Vec<String> = store
            .get_unlocked_installations_pending_work()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        ids.sort();
        let mut expected = vec![pending.id.clone(), deleting.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        store.lock_installation(&pending.id, "a").await.unwrap().unwrap();
        let ids: Vec<String> = store
            .get_unlocked_installations_pending_work()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![deleting.id]);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_owned() {
        let store = make_store();

        let token = store.lock_installation("i1", "a").await.unwrap();
        assert!(token.is_some());
        assert!(store.lock_installation("i1", "b").await.unwrap().is_none());

        assert!(!store.unlock_installation("i1", "b", false).await.unwrap());
        assert!(store.unlock_installation("i1", "a", false).await.unwrap());
        assert!(!store.unlock_installation("i1", "a", false).await.unwrap());

        store.lock_installation("i1", "a").await.unwrap().unwrap();
        assert!(store.unlock_installation("i1", "sweeper", true).await.unwrap());
        assert!(store.lock_installation("i1", "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guarded_update_fails_after_forced_unlock() {
        let store = make_store();
        let mut installation = store
            .create_installation(make_installation(InstallationState::DeletionRequested))
            .await
            .unwrap();

        let token = store
            .lock_installation(&installation.id, "a")
            .await
            .unwrap()
            .unwrap();
        installation.state = InstallationState::DeletionInProgress;
        store.update_installation(&installation, &token).await.unwrap();

        store
            .unlock_installation(&installation.id, "sweeper", true)
            .await
            .unwrap();
        installation.state = InstallationState::Deleted;
        let err = store
            .update_installation(&installation, &token)
            .await
            .unwrap_err();
        assert!(err.is_lock_lost());

        let stored = store.get_installation(&installation.id).await.unwrap().unwrap();
        assert_eq!(stored.state, InstallationState::DeletionInProgress);
    }

    #[tokio::test]
    async fn test_cluster_installation_filters() {
        let store = make_store();
        let cluster = store
            .create_cluster(Cluster::new("", ClusterState::Stable))
            .await
            .unwrap();

        for state in [ClusterInstallationState::Stable, ClusterInstallationState::Deleted] {
            store
                .create_cluster_installation(
                    ClusterInstallation {
                        id: String::new(),
                        cluster_id: cluster.id.clone(),
                        installation_id: "inst".to_string(),
                        namespace: "inst".to_string(),
                        state,
                        create_at_ms: 0,
                        delete_at_ms: 0,
                    },
                    None,
                )
                .await
                .unwrap();
        }

        let all = store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation("inst"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let live = store
            .get_cluster_installations(&ClusterInstallationFilter::live_on_cluster(&cluster.id))
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].state, ClusterInstallationState::Stable);

        let first_page = store
            .get_cluster_installations(&ClusterInstallationFilter {
                installation_id: Some("inst".to_string()),
                paging: Paging::Page { page: 0, per_page: 1 },
                include_deleted: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first_page.len(), 1);

        let other = store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation("other"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_get_clusters_hides_deleted_by_default() {
        let store = make_store();
        store
            .create_cluster(Cluster::new("", ClusterState::Stable))
            .await
            .unwrap();
        let mut gone = store
            .create_cluster(Cluster::new("", ClusterState::Stable))
            .await
            .unwrap();
        gone.state = ClusterState::Deleted;
        store.update_cluster(&gone).await.unwrap();

        assert_eq!(store.get_clusters(&ClusterFilter::all()).await.unwrap().len(), 1);
        let everything = ClusterFilter {
            include_deleted: true,
            ..ClusterFilter::all()
        };
        assert_eq!(store.get_clusters(&everything).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_installations_by_owner_and_page() {
        let store = make_store();
        let mut owned = Vec::new();
        for _ in 0..3 {
            let mut installation = make_installation(InstallationState::Stable);
            installation.owner_id = "owner-a".to_string();
            owned.push(store.create_installation(installation).await.unwrap());
        }
        let mut deleted = make_installation(InstallationState::Deleted);
        deleted.owner_id = "owner-a".to_string();
        store.create_installation(deleted).await.unwrap();
        store
            .create_installation(make_installation(InstallationState::Stable))
            .await
            .unwrap();

        let filter = InstallationFilter {
            owner_id: Some("owner-a".to_string()),
            ..InstallationFilter::default()
        };
        assert_eq!(store.get_installations(&filter).await.unwrap().len(), 3);

        let with_deleted = InstallationFilter {
            include_deleted: true,
            ..filter.clone()
        };
        assert_eq!(store.get_installations(&with_deleted).await.unwrap().len(), 4);

        let second_page = InstallationFilter {
            paging: Paging::Page {
                page: 1,
                per_page: 2,
            },
            ..filter
        };
        assert_eq!(store.get_installations(&second_page).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_child_row_fails_its_listing() {
        let meta = MemoryMetaStore::new();
        let store = FleetStore::new(meta.clone());
        meta.put(
            "/cluster_installations/odd",
            br#"{"id":"odd","cluster_id":"c1","installation_id":"inst-a","namespace":"inst-a","state":"hibernating"}"#.to_vec(),
            None,
        )
        .await
        .unwrap();
        meta.put("/cluster_installations/junk", b"not json".to_vec(), None)
            .await
            .unwrap();

        let err = store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation("inst-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec { .. }));

        let err = store
            .get_cluster_installations(&ClusterInstallationFilter::live_on_cluster("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec { .. }));

        // Rows with unreadable ownership count against every filter.
        meta.delete("/cluster_installations/odd").await.unwrap();
        assert!(store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation("inst-b"))
            .await
            .is_err());

        meta.delete("/cluster_installations/junk").await.unwrap();
        meta.put(
            "/cluster_installations/odd",
            br#"{"id":"odd","cluster_id":"c1","installation_id":"inst-a","state":"hibernating"}"#.to_vec(),
            None,
        )
        .await
        .unwrap();
        let other = store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation("inst-b"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_stale_token_cannot_release_a_newer_lock() {
        let store = make_store();
        let stale = store.lock_installation("inst", "s1").await.unwrap().unwrap();
        assert!(store.unlock_installation("inst", "operator", true).await.unwrap());
        let fresh = store.lock_installation("inst", "s1").await.unwrap().unwrap();
        assert_ne!(stale.revision, fresh.revision);

        assert!(!store.release_lock(&stale).await.unwrap());
        assert!(store.lock_installation("inst", "s2").await.unwrap().is_none());

        assert!(store.release_lock(&fresh).await.unwrap());
        assert!(store.lock_installation("inst", "s2").await.unwrap().is_some());
    }
}
