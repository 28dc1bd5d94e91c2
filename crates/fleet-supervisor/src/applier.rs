use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::provisioner::InstallationManifest;

/// Puts rendered manifests onto clusters.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply(
        &self,
        cluster_id: &str,
        namespace: &str,
        manifest: &InstallationManifest,
    ) -> anyhow::Result<()>;

    /// Remove everything in `namespace`. Deleting a missing namespace succeeds.
    async fn delete(&self, cluster_id: &str, namespace: &str) -> anyhow::Result<()>;
}

pub const MANIFEST_FILE: &str = "installation.json";

/// Applier that keeps one directory per cluster and namespace under `root`,
/// for an external sync agent to pick up.
#[derive(Debug, Clone)]
pub struct DirectoryApplier {
    root: PathBuf,
}

impl DirectoryApplier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for `namespace` on `cluster_id`. Both must be a single plain
    /// path segment, so the result always stays under the root.
    pub fn namespace_dir(&self, cluster_id: &str, namespace: &str) -> anyhow::Result<PathBuf> {
        Ok(self
            .root
            .join(path_segment("cluster id", cluster_id)?)
            .join(path_segment("namespace", namespace)?))
    }

    pub fn manifest_path(&self, cluster_id: &str, namespace: &str) -> anyhow::Result<PathBuf> {
        Ok(self.namespace_dir(cluster_id, namespace)?.join(MANIFEST_FILE))
    }
}

fn path_segment<'a>(what: &str, value: &'a str) -> anyhow::Result<&'a str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == value => Ok(value),
        _ => anyhow::bail!("{what} {value:?} is not a single path segment"),
    }
}

#[async_trait]
impl ManifestApplier for DirectoryApplier {
    async fn apply(
        &self,
        cluster_id: &str,
        namespace: &str,
        manifest: &InstallationManifest,
    ) -> anyhow::Result<()> {
        let path = self.manifest_path(cluster_id, namespace)?;
        write_manifest(&path, manifest).await
    }

    async fn delete(&self, cluster_id: &str, namespace: &str) -> anyhow::Result<()> {
        let dir = self.namespace_dir(cluster_id, namespace)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_manifest(path: &Path, manifest: &InstallationManifest) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(manifest)?;
    fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DatabaseSpec, FilestoreSpec};
    use fleet_common::new_id;

    fn make_manifest() -> InstallationManifest {
        InstallationManifest {
            name: "inst1".to_string(),
            namespace: "inst1".to_string(),
            version: "9.1.0".to_string(),
            dns: "inst1.example.com".to_string(),
            size: "100users".to_string(),
            replicas: 1,
            license: None,
            filestore: FilestoreSpec::MinioOperator {
                replicas: 1,
                storage_size: "50Gi".to_string(),
            },
            database: DatabaseSpec::MysqlOperator {
                replicas: 1,
                storage_size: "20Gi".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_apply_then_delete() {
        let root = std::env::temp_dir().join(format!("fleet-applier-{}", new_id()));
        let applier = DirectoryApplier::new(&root);
        let manifest = make_manifest();

        applier.apply("c1", "inst1", &manifest).await.unwrap();
        let raw = fs::read(applier.manifest_path("c1", "inst1").unwrap()).await.unwrap();
        let stored: InstallationManifest = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored, manifest);

        applier.delete("c1", "inst1").await.unwrap();
        assert!(!applier.namespace_dir("c1", "inst1").unwrap().exists());

        // Already gone.
        applier.delete("c1", "inst1").await.unwrap();

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_ids_cannot_leave_the_root() {
        let base = std::env::temp_dir().join(format!("fleet-applier-{}", new_id()));
        let root = base.join("root");
        let applier = DirectoryApplier::new(&root);
        let manifest = make_manifest();

        for (cluster_id, namespace) in [
            ("c1", "../escape"),
            ("..", "escape"),
            ("c1", "a/b"),
            ("/abs", "inst1"),
            ("c1", ""),
            ("c1", "."),
        ] {
            assert!(applier.apply(cluster_id, namespace, &manifest).await.is_err());
            assert!(applier.delete(cluster_id, namespace).await.is_err());
        }
        assert!(!base.join("escape").exists());
        assert!(!root.exists());

        let _ = fs::remove_dir_all(&base).await;
    }
}
