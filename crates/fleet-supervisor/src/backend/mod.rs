//! Filestore and database backends for installations.
//!
//! Backends are chosen by the installation's kind selector. In-cluster
//! operator kinds need nothing from outside the cluster; cloud kinds go through
//! a [`CloudApi`], and resolve to an unsupported backend when none is
//! configured.

pub mod database;
pub mod filestore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use database::{DatabaseBackend, DatabaseSpec};
pub use filestore::{FilestoreBackend, FilestoreSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEndpoint {
    pub host: String,
    pub port: u16,
}

/// Cloud resources owned on behalf of installations.
///
/// Implementations must be idempotent: ensuring an existing resource and
/// deleting a missing one both succeed.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn ensure_bucket(&self, name: &str) -> anyhow::Result<()>;
    async fn delete_bucket(&self, name: &str) -> anyhow::Result<()>;
    async fn ensure_database(&self, name: &str) -> anyhow::Result<()>;
    async fn database_endpoint(&self, name: &str) -> anyhow::Result<Option<DatabaseEndpoint>>;
    async fn delete_database(&self, name: &str) -> anyhow::Result<()>;
}

/// Cloud resource name for an installation, shared by its bucket and database.
pub fn cloud_resource_name(installation_id: &str) -> String {
    format!("fleet-{installation_id}")
}
