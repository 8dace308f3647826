//! Storage backends for the session state

use super::dto::SessionState;
use crate::engine::Engine;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Where a session state lives between runs.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the saved state, `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<SessionState>>;

    /// Save the state, replacing whatever was there.
    async fn save(&self, state: &SessionState) -> Result<()>;
}

/// JSON file on disk (`graph_state.json`).
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `dirs::data_dir()/spectrum/graph_state.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("spectrum").join("graph_state.json"))
            .ok_or(StorageError::NoPath)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_existing(&self) -> Result<Option<SessionState>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self) -> Result<Option<SessionState>> {
        debug!(path = %self.path.display(), "[state] loading");
        let state = self.read_existing().await?;
        match &state {
            Some(s) => info!(
                nodes = s.nodes.len(),
                connections = s.connections.len(),
                "[state] loaded {}",
                self.path.display()
            ),
            None => info!("[state] no saved state at {}", self.path.display()),
        }
        Ok(state)
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        // 空のスナップショットで既存のグラフを上書きしない
        if state.is_empty() {
            match self.read_existing().await {
                Ok(Some(existing)) if !existing.is_empty() => {
                    warn!(
                        existing_nodes = existing.nodes.len(),
                        "[state] refusing to clobber non-empty graph with empty snapshot"
                    );
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "[state] existing state unreadable, overwriting"),
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        info!(
            nodes = state.nodes.len(),
            connections = state.connections.len(),
            "[state] wrote {}",
            self.path.display()
        );
        Ok(())
    }
}

/// The engine's own serialized state blob.
pub struct EngineStorage {
    engine: Arc<dyn Engine>,
}

impl EngineStorage {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Storage for EngineStorage {
    async fn load(&self) -> Result<Option<SessionState>> {
        match self.engine.load_state().await? {
            Some(blob) if !blob.trim().is_empty() => Ok(Some(serde_json::from_str(&blob)?)),
            _ => Ok(None),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        let blob = serde_json::to_string(state)?;
        self.engine.save_state(&blob).await?;
        debug!(bytes = blob.len(), "[state] saved engine blob");
        Ok(())
    }
}
