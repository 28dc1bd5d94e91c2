//! The installation supervisor.
//!
//! Each [`InstallationSupervisor::tick`] lists installations pending work that
//! nobody has locked and supervises them with bounded concurrency. Supervising
//! one installation happens under its store-backed lock: evaluate the state
//! machine over the stored rows, run the decided child actions through the
//! provisioner, and persist the results with writes guarded by that lock.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, FutureExt, StreamExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

use fleet_common::{
    now_ms, Affinity, ClusterFilter, ClusterInstallation, ClusterInstallationFilter,
    ClusterInstallationState, Installation, InstallationState,
};
use fleet_meta::{LockToken, StoreResult};

use crate::error::SupervisorError;
use crate::machine::{evaluate, ChildAction, Verdict};
use crate::metrics::SharedMetrics;
use crate::placement::{is_eligible, select_cluster, ClusterCandidate};
use crate::provisioner::InstallationProvisioner;
use crate::store::InstallationStore;

pub const DEFAULT_PARALLELISM: usize = 4;

/// Tries at a locked cluster before a placement pass gives up on it.
const CLUSTER_LOCK_TRIES: usize = 3;
const CLUSTER_LOCK_BACKOFF: Duration = Duration::from_millis(50);

pub struct InstallationSupervisor<S, P> {
    store: Arc<S>,
    provisioner: Arc<P>,
    instance_id: String,
    parallelism: usize,
    metrics: Arc<SharedMetrics>,
}

enum Placement {
    Created(ClusterInstallation),
    Rejected,
    /// The cluster stayed locked by someone else; still a candidate next pass.
    Contended,
}

impl<S: InstallationStore, P: InstallationProvisioner> InstallationSupervisor<S, P> {
    pub fn new(
        store: Arc<S>,
        provisioner: Arc<P>,
        instance_id: impl Into<String>,
        metrics: Arc<SharedMetrics>,
    ) -> Self {
        Self {
            store,
            provisioner,
            instance_id: instance_id.into(),
            parallelism: DEFAULT_PARALLELISM,
            metrics,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Supervise every unlocked installation pending work.
    ///
    /// Only a failure to list pending work is returned; problems with single
    /// installations are logged and counted.
    pub async fn tick(&self) -> Result<(), SupervisorError> {
        SharedMetrics::incr(&self.metrics.ticks_total);
        let pending = self
            .store
            .get_unlocked_installations_pending_work()
            .await
            .map_err(SupervisorError::ListPendingWork)?;

        if pending.is_empty() {
            debug!("no installations pending work");
            return Ok(());
        }
        info!(count = pending.len(), "supervising installations pending work");

        stream::iter(pending)
            .for_each_concurrent(self.parallelism, |installation| async move {
                self.supervise(&installation).await;
            })
            .await;
        Ok(())
    }

    /// Supervise one installation under its lock. Skips it when another
    /// supervisor holds the lock.
    pub async fn supervise(&self, installation: &Installation) {
        let span = info_span!(
            "supervise",
            installation = %installation.id,
            instance = %self.instance_id
        );
        self.supervise_locked(&installation.id).instrument(span).await
    }

    async fn supervise_locked(&self, id: &str) {
        let lock = match self.store.lock_installation(id, &self.instance_id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                SharedMetrics::incr(&self.metrics.lock_contention_total);
                debug!("installation is locked by another supervisor; skipping");
                return;
            }
            Err(e) => {
                SharedMetrics::incr(&self.metrics.attempt_errors_total);
                warn!(error = %e, "failed to lock installation");
                return;
            }
        };
        SharedMetrics::incr(&self.metrics.attempts_total);

        match AssertUnwindSafe(self.attempt(id, &lock)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_lock_lost() => {
                SharedMetrics::incr(&self.metrics.lock_lost_total);
                warn!(error = %e, "installation lock lost; abandoning attempt");
            }
            Ok(Err(e)) => {
                SharedMetrics::incr(&self.metrics.attempt_errors_total);
                warn!(error = %e, "supervision attempt failed");
            }
            Err(_) => {
                SharedMetrics::incr(&self.metrics.attempt_errors_total);
                error!("supervision attempt panicked");
            }
        }

        match self.store.release_lock(&lock).await {
            Ok(true) => {}
            Ok(false) => warn!("installation lock was no longer held at release"),
            Err(e) => warn!(error = %e, "failed to unlock installation"),
        }
    }

    async fn attempt(&self, id: &str, lock: &LockToken) -> StoreResult<()> {
        // The listed row may be stale by the time the lock is held.
        let Some(installation) = self.store.get_installation(id).await? else {
            warn!("installation no longer exists");
            return Ok(());
        };
        let children = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation(id))
            .await?;
        let states: Vec<ClusterInstallationState> = children.iter().map(|ci| ci.state).collect();

        let evaluation = evaluate(&installation.state, &states);
        match evaluation.verdict {
            Verdict::Unexpected => {
                SharedMetrics::incr(&self.metrics.unexpected_state_total);
                warn!(
                    state = %installation.state,
                    children = ?states,
                    "installation is in an unexpected state"
                );
                return Ok(());
            }
            Verdict::Settled => {
                debug!(state = %installation.state, "nothing to do");
                return Ok(());
            }
            Verdict::Progress => {}
        }

        if evaluation.assign_cluster {
            return self.assign_cluster(&installation, lock).await;
        }

        for ci in children {
            if let Some(action) = evaluation.action_for(ci.state) {
                self.run_child_action(&installation, ci, action, lock).await?;
            }
        }

        if evaluation.changes_state(&installation.state) {
            let mut updated = installation.clone();
            updated.state = evaluation.next.clone();
            if updated.state == InstallationState::Deleted {
                updated.delete_at_ms = now_ms();
            }
            self.store.update_installation(&updated, lock).await?;
            SharedMetrics::incr(&self.metrics.installations_transitioned_total);
            info!(from = %installation.state, to = %updated.state, "installation state changed");
        }
        Ok(())
    }

    async fn run_child_action(
        &self,
        installation: &Installation,
        mut ci: ClusterInstallation,
        action: ChildAction,
        lock: &LockToken,
    ) -> StoreResult<()> {
        let succeeded = match self.store.get_cluster(&ci.cluster_id).await? {
            Some(cluster) => {
                let result = match action {
                    ChildAction::Provision => {
                        self.provisioner
                            .create_cluster_installation(&cluster, installation, &ci)
                            .await
                    }
                    ChildAction::RequestDeletion | ChildAction::ConfirmDeletion => {
                        self.provisioner
                            .delete_cluster_installation(&cluster, installation, &ci)
                            .await
                    }
                };
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        SharedMetrics::incr(&self.metrics.provisioner_failures_total);
                        warn!(
                            cluster_installation = %ci.id,
                            cluster = %cluster.id,
                            ?action,
                            error = %e,
                            "provisioner call failed"
                        );
                        false
                    }
                }
            }
            None => {
                warn!(cluster_installation = %ci.id, cluster = %ci.cluster_id, "cluster not found");
                false
            }
        };

        let next = if succeeded {
            action.on_success()
        } else {
            action.on_failure()
        };
        if next == ci.state {
            return Ok(());
        }

        let from = ci.state;
        ci.state = next;
        if next == ClusterInstallationState::Deleted {
            ci.delete_at_ms = now_ms();
        }
        self.store.update_cluster_installation(&ci, lock).await?;
        info!(cluster_installation = %ci.id, %from, to = %next, "cluster installation state changed");
        Ok(())
    }

    /// Place the installation on one eligible cluster by creating its first
    /// cluster installation. Provisioning happens on a later attempt.
    async fn assign_cluster(&self, installation: &Installation, lock: &LockToken) -> StoreResult<()> {
        let clusters = self.store.get_clusters(&ClusterFilter::all()).await?;
        let mut candidates = Vec::with_capacity(clusters.len());
        for cluster in clusters.into_iter().filter(|c| c.state.is_schedulable()) {
            let hosted = self.hosted_affinities(&cluster.id).await?;
            candidates.push(ClusterCandidate::new(cluster, hosted));
        }

        let mut contended = Vec::new();
        while let Some(cluster) = select_cluster(installation, &candidates) {
            let cluster_id = cluster.id.clone();
            match self.place_on(installation, &cluster_id, lock).await? {
                Placement::Created(ci) => {
                    SharedMetrics::incr(&self.metrics.clusters_assigned_total);
                    info!(cluster = %cluster_id, cluster_installation = %ci.id, "assigned installation to cluster");
                    return Ok(());
                }
                Placement::Rejected => {}
                Placement::Contended => contended.push(cluster_id.clone()),
            }
            candidates.retain(|c| c.cluster.id != cluster_id);
        }

        if contended.is_empty() {
            info!("no eligible cluster for installation; will retry");
        } else {
            info!(clusters = ?contended, "eligible clusters were locked by another supervisor; will retry");
        }
        Ok(())
    }

    async fn place_on(
        &self,
        installation: &Installation,
        cluster_id: &str,
        lock: &LockToken,
    ) -> StoreResult<Placement> {
        let mut cluster_lock = None;
        for try_no in 1..=CLUSTER_LOCK_TRIES {
            cluster_lock = self.store.lock_cluster(cluster_id, &self.instance_id).await?;
            if cluster_lock.is_some() {
                break;
            }
            SharedMetrics::incr(&self.metrics.cluster_lock_contention_total);
            debug!(cluster = %cluster_id, try_no, "cluster is locked by another supervisor");
            if try_no < CLUSTER_LOCK_TRIES {
                tokio::time::sleep(CLUSTER_LOCK_BACKOFF).await;
            }
        }
        let Some(cluster_lock) = cluster_lock else {
            return Ok(Placement::Contended);
        };

        let placed = self.place_locked(installation, cluster_id, lock).await;

        match self.store.release_lock(&cluster_lock).await {
            Ok(true) => {}
            Ok(false) => warn!(cluster = %cluster_id, "cluster lock was no longer held at release"),
            Err(e) => warn!(cluster = %cluster_id, error = %e, "failed to unlock cluster"),
        }
        placed
    }

    async fn place_locked(
        &self,
        installation: &Installation,
        cluster_id: &str,
        lock: &LockToken,
    ) -> StoreResult<Placement> {
        // Re-check with the cluster locked: another supervisor may have filled it.
        let Some(cluster) = self.store.get_cluster(cluster_id).await? else {
            return Ok(Placement::Rejected);
        };
        let hosted = self.hosted_affinities(cluster_id).await?;
        let candidate = ClusterCandidate::new(cluster, hosted);
        if !is_eligible(installation, &candidate) {
            debug!(cluster = %cluster_id, "cluster no longer eligible");
            return Ok(Placement::Rejected);
        }

        let ci = ClusterInstallation {
            id: String::new(),
            cluster_id: cluster_id.to_string(),
            installation_id: installation.id.clone(),
            namespace: installation.id.clone(),
            state: ClusterInstallationState::CreationRequested,
            create_at_ms: 0,
            delete_at_ms: 0,
        };
        let ci = self.store.create_cluster_installation(ci, lock).await?;
        Ok(Placement::Created(ci))
    }

    /// Affinities of the installations with live cluster installations on a
    /// cluster. A hosted installation that cannot be found counts as isolated.
    async fn hosted_affinities(&self, cluster_id: &str) -> StoreResult<Vec<Affinity>> {
        let hosted = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::live_on_cluster(cluster_id))
            .await?;
        let mut affinities = Vec::with_capacity(hosted.len());
        for ci in hosted.iter().filter(|ci| ci.state.is_live()) {
            let affinity = match self.store.get_installation(&ci.installation_id).await? {
                Some(hosted) => hosted.affinity,
                None => Affinity::Isolated,
            };
            affinities.push(affinity);
        }
        Ok(affinities)
    }
}
