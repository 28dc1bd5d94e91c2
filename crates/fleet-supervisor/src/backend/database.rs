use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fleet_common::{DatabaseKind, Installation};

use super::{cloud_resource_name, CloudApi};
use crate::provisioner::ProvisionerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DatabaseSpec {
    MysqlOperator { replicas: u32, storage_size: String },
    AwsRds { host: String, port: u16, secret_name: String },
}

pub enum DatabaseBackend {
    MysqlOperator,
    AwsRds(Arc<dyn CloudApi>),
    Unsupported(DatabaseKind),
}

impl DatabaseBackend {
    pub fn for_installation(installation: &Installation, cloud: Option<&Arc<dyn CloudApi>>) -> Self {
        match (installation.database, cloud) {
            (DatabaseKind::MysqlOperator, _) => DatabaseBackend::MysqlOperator,
            (DatabaseKind::AwsRds, Some(cloud)) => DatabaseBackend::AwsRds(Arc::clone(cloud)),
            (kind @ DatabaseKind::AwsRds, None) => DatabaseBackend::Unsupported(kind),
        }
    }

    pub async fn provision(&self, installation: &Installation) -> Result<(), ProvisionerError> {
        match self {
            DatabaseBackend::MysqlOperator => {
                info!(installation = %installation.id, "MySQL operator database requires no pre-provisioning; skipping");
                Ok(())
            }
            DatabaseBackend::AwsRds(cloud) => {
                let name = cloud_resource_name(&installation.id);
                cloud
                    .ensure_database(&name)
                    .await
                    .map_err(ProvisionerError::Cloud)?;
                info!(installation = %installation.id, database = %name, "RDS database provisioned");
                Ok(())
            }
            DatabaseBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }

    pub async fn teardown(
        &self,
        installation: &Installation,
        keep_data: bool,
    ) -> Result<(), ProvisionerError> {
        match self {
            DatabaseBackend::MysqlOperator => {
                if keep_data {
                    warn!(installation = %installation.id, "data preservation was requested, but isn't possible with the MySQL operator");
                }
                Ok(())
            }
            DatabaseBackend::AwsRds(cloud) => {
                if keep_data {
                    return Ok(());
                }
                let name = cloud_resource_name(&installation.id);
                cloud
                    .delete_database(&name)
                    .await
                    .map_err(ProvisionerError::Cloud)?;
                info!(installation = %installation.id, database = %name, "RDS database deleted");
                Ok(())
            }
            DatabaseBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }

    pub async fn generate_spec(
        &self,
        installation: &Installation,
        replicas: u32,
    ) -> Result<DatabaseSpec, ProvisionerError> {
        match self {
            DatabaseBackend::MysqlOperator => Ok(DatabaseSpec::MysqlOperator {
                replicas,
                storage_size: "20Gi".to_string(),
            }),
            DatabaseBackend::AwsRds(cloud) => {
                let name = cloud_resource_name(&installation.id);
                let endpoint = cloud
                    .database_endpoint(&name)
                    .await
                    .map_err(ProvisionerError::Cloud)?
                    .ok_or_else(|| ProvisionerError::MissingCloudResource(name))?;
                Ok(DatabaseSpec::AwsRds {
                    host: endpoint.host,
                    port: endpoint.port,
                    secret_name: format!("{}-database-secret", installation.id),
                })
            }
            DatabaseBackend::Unsupported(kind) => Err(unsupported(*kind)),
        }
    }
}

fn unsupported(kind: DatabaseKind) -> ProvisionerError {
    ProvisionerError::Unsupported {
        what: "database",
        kind: kind.to_string(),
    }
}
