use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::database::DatabaseKind;
use crate::filestore::FilestoreKind;
use crate::paging::Paging;

/// Lifecycle label of an installation.
///
/// Stored as its kebab-case label. A stored label outside the known set is kept
/// verbatim in `Unknown` so the supervisor can report it instead of failing to
/// decode the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstallationState {
    CreationRequested,
    CreationInProgress,
    CreationFailed,
    Stable,
    DeletionRequested,
    DeletionInProgress,
    DeletionFailed,
    Deleted,
    Unknown(String),
}

impl InstallationState {
    /// States the supervisor polls for.
    pub const PENDING_WORK: [InstallationState; 4] = [
        InstallationState::CreationRequested,
        InstallationState::CreationInProgress,
        InstallationState::DeletionRequested,
        InstallationState::DeletionInProgress,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreationRequested => "creation-requested",
            Self::CreationInProgress => "creation-in-progress",
            Self::CreationFailed => "creation-failed",
            Self::Stable => "stable",
            Self::DeletionRequested => "deletion-requested",
            Self::DeletionInProgress => "deletion-in-progress",
            Self::DeletionFailed => "deletion-failed",
            Self::Deleted => "deleted",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_pending_work(&self) -> bool {
        Self::PENDING_WORK.contains(self)
    }
}

impl From<String> for InstallationState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "creation-requested" => Self::CreationRequested,
            "creation-in-progress" => Self::CreationInProgress,
            "creation-failed" => Self::CreationFailed,
            "stable" => Self::Stable,
            "deletion-requested" => Self::DeletionRequested,
            "deletion-in-progress" => Self::DeletionInProgress,
            "deletion-failed" => Self::DeletionFailed,
            "deleted" => Self::Deleted,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<InstallationState> for String {
    fn from(state: InstallationState) -> Self {
        match state {
            InstallationState::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many clusters an installation may share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// The installation gets a cluster to itself.
    Isolated,
    /// The installation may share a cluster with other multitenant installations.
    Multitenant,
}

impl FromStr for Affinity {
    type Err = crate::ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(Self::Isolated),
            "multitenant" => Ok(Self::Multitenant),
            other => Err(crate::ParseKindError::new("affinity", other)),
        }
    }
}

/// A tenant's logical deployment.
///
/// Stored under `/installations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: String,
    pub owner_id: String,
    pub version: String,
    pub dns: String,

    /// Sizing profile handed to the provisioner, e.g. `100users`.
    #[serde(default = "default_size")]
    pub size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    pub affinity: Affinity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    pub state: InstallationState,
    pub filestore: FilestoreKind,
    pub database: DatabaseKind,

    #[serde(default)]
    pub create_at_ms: u64,

    #[serde(default)]
    pub delete_at_ms: u64,
}

pub const DEFAULT_INSTALLATION_SIZE: &str = "100users";

fn default_size() -> String {
    DEFAULT_INSTALLATION_SIZE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationFilter {
    pub owner_id: Option<String>,
    pub group_id: Option<String>,
    pub paging: Paging,
    pub include_deleted: bool,
}

impl InstallationFilter {
    pub fn matches(&self, installation: &Installation) -> bool {
        if let Some(owner_id) = &self.owner_id {
            if &installation.owner_id != owner_id {
                return false;
            }
        }
        if let Some(group_id) = &self.group_id {
            if installation.group_id.as_ref() != Some(group_id) {
                return false;
            }
        }
        self.include_deleted || installation.state != InstallationState::Deleted
    }
}
