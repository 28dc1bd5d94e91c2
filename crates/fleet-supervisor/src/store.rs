use async_trait::async_trait;

use fleet_common::{Cluster, ClusterFilter, ClusterInstallation, ClusterInstallationFilter, Installation};
use fleet_meta::{FleetStore, LockToken, MetaStore, StoreResult};

/// The persistence the installation supervisor consumes.
///
/// Every write takes the [`LockToken`] of the installation lock it is made
/// under; implementations must reject the write with
/// [`fleet_meta::StoreError::LockLost`] once that lock is gone.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    async fn get_unlocked_installations_pending_work(&self) -> StoreResult<Vec<Installation>>;
    async fn get_installation(&self, id: &str) -> StoreResult<Option<Installation>>;
    async fn update_installation(&self, installation: &Installation, lock: &LockToken)
        -> StoreResult<()>;
    async fn lock_installation(&self, id: &str, locker_id: &str) -> StoreResult<Option<LockToken>>;

    async fn get_cluster(&self, id: &str) -> StoreResult<Option<Cluster>>;
    async fn get_clusters(&self, filter: &ClusterFilter) -> StoreResult<Vec<Cluster>>;
    async fn lock_cluster(&self, id: &str, locker_id: &str) -> StoreResult<Option<LockToken>>;

    /// Release the lock `token` was issued for, and only that acquisition of it.
    async fn release_lock(&self, token: &LockToken) -> StoreResult<bool>;

    async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> StoreResult<Vec<ClusterInstallation>>;
    async fn create_cluster_installation(
        &self,
        ci: ClusterInstallation,
        lock: &LockToken,
    ) -> StoreResult<ClusterInstallation>;
    async fn update_cluster_installation(
        &self,
        ci: &ClusterInstallation,
        lock: &LockToken,
    ) -> StoreResult<()>;
}

#[async_trait]
impl<M: MetaStore> InstallationStore for FleetStore<M> {
    async fn get_unlocked_installations_pending_work(&self) -> StoreResult<Vec<Installation>> {
        FleetStore::get_unlocked_installations_pending_work(self).await
    }

    async fn get_installation(&self, id: &str) -> StoreResult<Option<Installation>> {
        FleetStore::get_installation(self, id).await
    }

    async fn update_installation(
        &self,
        installation: &Installation,
        lock: &LockToken,
    ) -> StoreResult<()> {
        FleetStore::update_installation(self, installation, lock).await
    }

    async fn lock_installation(&self, id: &str, locker_id: &str) -> StoreResult<Option<LockToken>> {
        FleetStore::lock_installation(self, id, locker_id).await
    }

    async fn get_cluster(&self, id: &str) -> StoreResult<Option<Cluster>> {
        FleetStore::get_cluster(self, id).await
    }

    async fn get_clusters(&self, filter: &ClusterFilter) -> StoreResult<Vec<Cluster>> {
        FleetStore::get_clusters(self, filter).await
    }

    async fn lock_cluster(&self, id: &str, locker_id: &str) -> StoreResult<Option<LockToken>> {
        FleetStore::lock_cluster(self, id, locker_id).await
    }

    async fn release_lock(&self, token: &LockToken) -> StoreResult<bool> {
        FleetStore::release_lock(self, token).await
    }

    async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> StoreResult<Vec<ClusterInstallation>> {
        FleetStore::get_cluster_installations(self, filter).await
    }

    async fn create_cluster_installation(
        &self,
        ci: ClusterInstallation,
        lock: &LockToken,
    ) -> StoreResult<ClusterInstallation> {
        FleetStore::create_cluster_installation(self, ci, Some(lock)).await
    }

    async fn update_cluster_installation(
        &self,
        ci: &ClusterInstallation,
        lock: &LockToken,
    ) -> StoreResult<()> {
        FleetStore::update_cluster_installation(self, ci, lock).await
    }
}
