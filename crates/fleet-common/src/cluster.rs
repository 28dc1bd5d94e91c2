use serde::{Deserialize, Serialize};

use crate::paging::Paging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    CreationRequested,
    CreationInProgress,
    CreationFailed,
    ProvisioningRequested,
    ProvisioningFailed,
    UpgradeRequested,
    UpgradeFailed,
    Stable,
    DeletionRequested,
    DeletionFailed,
    Deleted,
}

impl ClusterState {
    /// Only stable clusters accept new installations.
    pub fn is_schedulable(self) -> bool {
        self == ClusterState::Stable
    }
}

/// A kubernetes cluster that can host installations.
///
/// Stored under `/clusters/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,

    #[serde(default)]
    pub provider: String,

    /// Node sizing label, e.g. `SizeAlef500`.
    #[serde(default)]
    pub size: String,

    pub state: ClusterState,

    /// Upper bound on live cluster installations. None means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_installations: Option<u32>,

    /// Operators can fence a cluster off from new placements.
    #[serde(default = "default_allow_installations")]
    pub allow_installations: bool,

    #[serde(default)]
    pub create_at_ms: u64,
}

fn default_allow_installations() -> bool {
    true
}

impl Cluster {
    pub fn new(id: impl Into<String>, state: ClusterState) -> Self {
        Self {
            id: id.into(),
            provider: "aws".to_string(),
            size: String::new(),
            state,
            max_installations: None,
            allow_installations: true,
            create_at_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterFilter {
    pub paging: Paging,
    pub include_deleted: bool,
}

impl ClusterFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, cluster: &Cluster) -> bool {
        self.include_deleted || cluster.state != ClusterState::Deleted
    }
}
