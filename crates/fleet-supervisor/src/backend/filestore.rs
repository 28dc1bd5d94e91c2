use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fleet_common::{FilestoreKind, Installation};

use super::{cloud_resource_name, CloudApi};
use crate::provisioner::ProvisionerError;

/// How the installation reaches its filestore, as rendered into its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilestoreSpec {
    MinioOperator { replicas: u32, storage_size: String },
    AwsS3 { bucket: String, secret_name: String },
}

pub enum FilestoreBackend {
    MinioOperator,
    AwsS3(Arc<dyn CloudApi>),
    /// A kind this supervisor cannot serve. Every operation fails.
    Unsupported(FilestoreKind),
}

impl FilestoreBackend {
    pub fn for_installation(installation: &Installation, cloud: Option<&Arc<dyn CloudApi>>) -> Self {
        match (installation.filestore, cloud) {
            (FilestoreKind::MinioOperator, _) => FilestoreBackend::MinioOperator,
            (FilestoreKind::AwsS3, Some(cloud)) => FilestoreBackend::AwsS3(Arc::clone(cloud)),
            (kind @ FilestoreKind::AwsS3, None) => FilestoreBackend::Unsupported(kind),
        }
    }

    pub async fn provision(&self, installation: &Installation) -> Result<(), ProvisionerError> {
        match self {
            FilestoreBackend::MinioOperator => {
                info!(installation = %installation.id, "MinIO operator filestore requires no pre-provisioning; skipping");
                Ok(())
            }
            FilestoreBackend::AwsS3(cloud) => {
                let bucket = cloud_resource_name(&installation.id);
                cloud
                    .ensure_bucket(&bucket)
                    .await
                    .map_err(ProvisionerError::Cloud)?;
                info!(installation = %installation.id, %bucket, "S3 filestore provisioned");
                Ok(())
            }
            FilestoreBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }

    pub async fn teardown(
        &self,
        installation: &Installation,
        keep_data: bool,
    ) -> Result<(), ProvisionerError> {
        match self {
            FilestoreBackend::MinioOperator => {
                info!(installation = %installation.id, "MinIO operator filestore requires no teardown; skipping");
                if keep_data {
                    warn!(installation = %installation.id, "data preservation was requested, but isn't possible with the MinIO operator");
                }
                Ok(())
            }
            FilestoreBackend::AwsS3(cloud) => {
                let bucket = cloud_resource_name(&installation.id);
                if keep_data {
                    info!(installation = %installation.id, %bucket, "keeping S3 bucket");
                    return Ok(());
                }
                cloud
                    .delete_bucket(&bucket)
                    .await
                    .map_err(ProvisionerError::Cloud)?;
                info!(installation = %installation.id, %bucket, "S3 filestore deleted");
                Ok(())
            }
            FilestoreBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }

    pub fn generate_spec(
        &self,
        installation: &Installation,
        replicas: u32,
    ) -> Result<FilestoreSpec, ProvisionerError> {
        match self {
            FilestoreBackend::MinioOperator => Ok(FilestoreSpec::MinioOperator {
                replicas,
                storage_size: "50Gi".to_string(),
            }),
            FilestoreBackend::AwsS3(_) => Ok(FilestoreSpec::AwsS3 {
                bucket: cloud_resource_name(&installation.id),
                secret_name: format!("{}-filestore-secret", installation.id),
            }),
            FilestoreBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }
}

fn unsupported(kind: FilestoreKind) -> ProvisionerError {
    ProvisionerError::Unsupported {
        what: "filestore",
        kind: kind.to_string(),
    }
}
