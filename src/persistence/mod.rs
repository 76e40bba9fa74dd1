use crate::error::Result;
use crate::execution::SessionSnapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// JSON file persistence for session snapshots
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never sees a half-written snapshot.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a snapshot, creating parent directories as needed
    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }

        tracing::debug!(
            path = %self.path.display(),
            ticks = snapshot.history.len(),
            trades = snapshot.ledger.len(),
            "Saved session snapshot"
        );

        Ok(())
    }

    /// Load the last saved snapshot. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<SessionSnapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&content)?;

        tracing::info!(
            path = %self.path.display(),
            ticks = snapshot.history.len(),
            trades = snapshot.ledger.len(),
            open = snapshot.position.is_some(),
            "Loaded session snapshot"
        );

        Ok(Some(snapshot))
    }
}
