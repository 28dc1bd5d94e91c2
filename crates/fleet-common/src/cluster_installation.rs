use serde::{Deserialize, Serialize};

use crate::paging::Paging;

/// Lifecycle of one installation deployed on one cluster.
///
/// The derived ordering is only used to produce a stable, de-duplicated view of
/// a set of children; it carries no lifecycle meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterInstallationState {
    CreationRequested,
    CreationInProgress,
    CreationFailed,
    Stable,
    DeletionRequested,
    DeletionInProgress,
    DeletionFailed,
    Deleted,
}

impl ClusterInstallationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreationRequested => "creation-requested",
            Self::CreationInProgress => "creation-in-progress",
            Self::CreationFailed => "creation-failed",
            Self::Stable => "stable",
            Self::DeletionRequested => "deletion-requested",
            Self::DeletionInProgress => "deletion-in-progress",
            Self::DeletionFailed => "deletion-failed",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::CreationFailed | Self::DeletionFailed)
    }

    /// Anything but `deleted` still holds resources on its cluster.
    pub fn is_live(self) -> bool {
        self != Self::Deleted
    }

    pub fn is_deleting(self) -> bool {
        matches!(
            self,
            Self::DeletionRequested | Self::DeletionInProgress | Self::DeletionFailed
        )
    }
}

impl std::fmt::Display for ClusterInstallationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored under `/cluster_installations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInstallation {
    pub id: String,
    pub cluster_id: String,
    pub installation_id: String,
    pub namespace: String,
    pub state: ClusterInstallationState,

    #[serde(default)]
    pub create_at_ms: u64,

    #[serde(default)]
    pub delete_at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInstallationFilter {
    pub installation_id: Option<String>,
    pub cluster_id: Option<String>,
    pub paging: Paging,
    pub include_deleted: bool,
}

impl ClusterInstallationFilter {
    /// Every cluster installation of one installation, deleted ones included.
    pub fn for_installation(installation_id: &str) -> Self {
        Self {
            installation_id: Some(installation_id.to_string()),
            include_deleted: true,
            ..Self::default()
        }
    }

    /// Live cluster installations hosted on one cluster.
    pub fn live_on_cluster(cluster_id: &str) -> Self {
        Self {
            cluster_id: Some(cluster_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, ci: &ClusterInstallation) -> bool {
        if let Some(installation_id) = &self.installation_id {
            if &ci.installation_id != installation_id {
                return false;
            }
        }
        if let Some(cluster_id) = &self.cluster_id {
            if &ci.cluster_id != cluster_id {
                return false;
            }
        }
        self.include_deleted || ci.state.is_live()
    }
}
