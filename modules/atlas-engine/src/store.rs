//! Artifact persistence: one JSON document per work item under
//! `{data_dir}/pages/`, with an optional mirror into the analytical store
//! for query-time serving.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use atlas_common::AtlasError;

use crate::assembler::PageArtifact;
use crate::extractor::MetricsStore;

/// Seam for artifact persistence so pipeline tests can script write
/// failures.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(&self, artifact: &PageArtifact) -> Result<(), AtlasError>;
}

pub struct FileArtifactStore {
    dir: PathBuf,
    mirror: Option<Arc<dyn MetricsStore>>,
}

impl FileArtifactStore {
    pub fn open(dir: impl Into<PathBuf>, mirror: Option<Arc<dyn MetricsStore>>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create artifact dir {}", dir.display()))?;
        Ok(Self { dir, mirror })
    }

    pub fn load(&self, item_id: &str) -> Result<Option<PageArtifact>> {
        let path = self.dir.join(format!("{item_id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactStore {
    async fn persist(&self, artifact: &PageArtifact) -> Result<(), AtlasError> {
        let path = self.dir.join(format!("{}.json", artifact.item_id));
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(artifact)
            .map_err(|e| AtlasError::PersistenceFailed(e.to_string()))?;
        std::fs::write(&tmp, json)
            .map_err(|e| AtlasError::PersistenceFailed(e.to_string()))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| AtlasError::PersistenceFailed(e.to_string()))?;

        info!(item = %artifact.item_id, path = %path.display(), "Artifact persisted");

        // Mirroring is best-effort: the file copy is authoritative.
        if let Some(ref mirror) = self.mirror {
            if let Err(e) = mirror.mirror_artifact(artifact).await {
                warn!(item = %artifact.item_id, error = %e, "Artifact mirror failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_artifact;

    #[tokio::test]
    async fn persist_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path(), None).unwrap();
        let artifact = sample_artifact("bristol");
        store.persist(&artifact).await.unwrap();

        let loaded = store.load("bristol").unwrap().unwrap();
        assert_eq!(loaded.item_id, "bristol");
        assert_eq!(loaded.sections.len(), artifact.sections.len());
        assert!(store.load("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn forced_regeneration_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path(), None).unwrap();
        let mut artifact = sample_artifact("leeds");
        store.persist(&artifact).await.unwrap();
        artifact.total_words += 100;
        store.persist(&artifact).await.unwrap();
        let loaded = store.load("leeds").unwrap().unwrap();
        assert_eq!(loaded.total_words, artifact.total_words);
    }
}
