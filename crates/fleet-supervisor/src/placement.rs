use fleet_common::{Affinity, Cluster, Installation};

/// A cluster offered for placement, with the affinities of the installations it
/// already hosts through live cluster installations.
#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub cluster: Cluster,
    pub hosted: Vec<Affinity>,
}

impl ClusterCandidate {
    pub fn new(cluster: Cluster, hosted: Vec<Affinity>) -> Self {
        Self { cluster, hosted }
    }
}

/// Whether `installation` may be placed on `candidate`.
pub fn is_eligible(installation: &Installation, candidate: &ClusterCandidate) -> bool {
    let cluster = &candidate.cluster;
    if !cluster.state.is_schedulable() || !cluster.allow_installations {
        return false;
    }

    if let Some(max) = cluster.max_installations {
        if candidate.hosted.len() >= max as usize {
            return false;
        }
    }

    match installation.affinity {
        Affinity::Isolated => candidate.hosted.is_empty(),
        Affinity::Multitenant => !candidate.hosted.contains(&Affinity::Isolated),
    }
}

/// Pick the cluster to host `installation`, or None when no candidate is
/// eligible. Ties go to the lowest cluster id.
pub fn select_cluster<'a>(
    installation: &Installation,
    candidates: &'a [ClusterCandidate],
) -> Option<&'a Cluster> {
    candidates
        .iter()
        .filter(|c| is_eligible(installation, c))
        .map(|c| &c.cluster)
        .min_by(|a, b| a.id.cmp(&b.id))
}
