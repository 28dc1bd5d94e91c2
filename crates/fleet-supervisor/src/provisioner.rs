//! Turning a cluster installation into deployed resources.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use fleet_common::{Cluster, ClusterInstallation, Installation};

use crate::applier::ManifestApplier;
use crate::backend::{CloudApi, DatabaseBackend, DatabaseSpec, FilestoreBackend, FilestoreSpec};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
    #[error("{what} kind '{kind}' is not supported by this provisioner")]
    Unsupported { what: &'static str, kind: String },

    #[error("cloud request failed: {0}")]
    Cloud(#[source] anyhow::Error),

    #[error("cloud resource {0} does not exist")]
    MissingCloudResource(String),

    #[error("unknown installation size '{0}'")]
    UnknownSize(String),

    #[error("failed to render manifest: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to apply manifest to {cluster_id}/{namespace}: {source}")]
    Apply {
        cluster_id: String,
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Creates, upgrades and deletes the resources behind a cluster installation.
///
/// The supervisor only distinguishes success from failure.
#[async_trait]
pub trait InstallationProvisioner: Send + Sync {
    async fn create_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError>;

    async fn upgrade_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError>;

    async fn delete_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError>;
}

/// Replica count for an installation size label.
pub fn replicas_for_size(size: &str) -> Option<u32> {
    match size {
        "100users" => Some(1),
        "1000users" => Some(2),
        "5000users" => Some(3),
        "10000users" => Some(4),
        "25000users" => Some(6),
        _ => None,
    }
}

/// Everything an applier needs to run one installation in one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationManifest {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub dns: String,
    pub size: String,
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub filestore: FilestoreSpec,
    pub database: DatabaseSpec,
}

/// Provisioner that prepares backends, renders an [`InstallationManifest`]
/// and hands it to a [`ManifestApplier`].
pub struct ManifestProvisioner<A> {
    applier: A,
    cloud: Option<Arc<dyn CloudApi>>,
}

impl<A: ManifestApplier> ManifestProvisioner<A> {
    pub fn new(applier: A, cloud: Option<Arc<dyn CloudApi>>) -> Self {
        Self { applier, cloud }
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    fn backends(&self, installation: &Installation) -> (FilestoreBackend, DatabaseBackend) {
        (
            FilestoreBackend::for_installation(installation, self.cloud.as_ref()),
            DatabaseBackend::for_installation(installation, self.cloud.as_ref()),
        )
    }

    async fn render(
        &self,
        installation: &Installation,
        ci: &ClusterInstallation,
        filestore: &FilestoreBackend,
        database: &DatabaseBackend,
    ) -> Result<InstallationManifest, ProvisionerError> {
        let replicas = replicas_for_size(&installation.size)
            .ok_or_else(|| ProvisionerError::UnknownSize(installation.size.clone()))?;
        Ok(InstallationManifest {
            name: installation.id.clone(),
            namespace: ci.namespace.clone(),
            version: installation.version.clone(),
            dns: installation.dns.clone(),
            size: installation.size.clone(),
            replicas,
            license: installation.license.clone(),
            filestore: filestore.generate_spec(installation, replicas)?,
            database: database.generate_spec(installation, replicas).await?,
        })
    }

    async fn apply(
        &self,
        cluster: &Cluster,
        manifest: &InstallationManifest,
    ) -> Result<(), ProvisionerError> {
        self.applier
            .apply(&cluster.id, &manifest.namespace, manifest)
            .await
            .map_err(|source| ProvisionerError::Apply {
                cluster_id: cluster.id.clone(),
                namespace: manifest.namespace.clone(),
                source,
            })
    }
}

#[async_trait]
impl<A: ManifestApplier> InstallationProvisioner for ManifestProvisioner<A> {
    async fn create_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError> {
        let (filestore, database) = self.backends(installation);
        filestore.provision(installation).await?;
        database.provision(installation).await?;

        let manifest = self.render(installation, ci, &filestore, &database).await?;
        self.apply(cluster, &manifest).await?;
        info!(cluster = %cluster.id, namespace = %ci.namespace, "cluster installation created");
        Ok(())
    }

    async fn upgrade_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError> {
        let (filestore, database) = self.backends(installation);
        let manifest = self.render(installation, ci, &filestore, &database).await?;
        self.apply(cluster, &manifest).await?;
        info!(cluster = %cluster.id, namespace = %ci.namespace, version = %installation.version, "cluster installation upgraded");
        Ok(())
    }

    async fn delete_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        ci: &ClusterInstallation,
    ) -> Result<(), ProvisionerError> {
        self.applier
            .delete(&cluster.id, &ci.namespace)
            .await
            .map_err(|source| ProvisionerError::Apply {
                cluster_id: cluster.id.clone(),
                namespace: ci.namespace.clone(),
                source,
            })?;

        let (filestore, database) = self.backends(installation);
        database.teardown(installation, false).await?;
        filestore.teardown(installation, false).await?;
        info!(cluster = %cluster.id, namespace = %ci.namespace, "cluster installation deleted");
        Ok(())
    }
}
