pub mod cluster;
pub mod cluster_installation;
pub mod database;
pub mod filestore;
pub mod installation;
pub mod paging;
pub mod util;

pub use cluster::{Cluster, ClusterFilter, ClusterState};
pub use cluster_installation::{
    ClusterInstallation, ClusterInstallationFilter, ClusterInstallationState,
};
pub use database::{is_supported_database, DatabaseKind};
pub use filestore::{is_supported_filestore, FilestoreKind};
pub use installation::{
    Affinity, Installation, InstallationFilter, InstallationState, DEFAULT_INSTALLATION_SIZE,
};
pub use paging::Paging;
pub use util::{new_id, now_ms};

pub mod telemetry;

/// A textual kind selector that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {what} '{value}'")]
pub struct ParseKindError {
    pub what: &'static str,
    pub value: String,
}

impl ParseKindError {
    pub fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}
