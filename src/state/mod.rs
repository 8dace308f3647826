//! Persistence Adapter - snapshot and one-shot restore of the session
//!
//! ## Responsibilities
//! - Flatten the graph, viewport and master fader into a `SessionState`
//! - Restore a saved state at most once per process
//! - Write changes through a `Storage` backend (debounced by `autosave`)

mod autosave;
mod dto;
mod restore;
mod storage;

pub use autosave::run_autosave;
pub use dto::{
    BindingRecord, ConnectionRecord, MasterState, NodeRecord, PluginRecord, SessionState,
    Viewport, STATE_VERSION,
};
pub use restore::{restore, RestoreSummary};
pub use storage::{EngineStorage, JsonFileStorage, Storage};

use crate::console::SharedConsole;
use crate::engine::Engine;
use crate::error::{StateError, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct PersistenceAdapter {
    console: SharedConsole,
    engine: Arc<dyn Engine>,
    storage: Arc<dyn Storage>,
    restored: AtomicBool,
}

impl PersistenceAdapter {
    pub fn new(console: SharedConsole, engine: Arc<dyn Engine>, storage: Arc<dyn Storage>) -> Self {
        Self {
            console,
            engine,
            storage,
            restored: AtomicBool::new(false),
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    pub fn snapshot(&self) -> SessionState {
        self.console.lock().snapshot()
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Restore `state`. A second call in the same process is refused with
    /// `AlreadyRestored` and leaves the graph alone.
    pub async fn restore(&self, state: SessionState) -> Result<RestoreSummary, StateError> {
        if self.restored.swap(true, Ordering::AcqRel) {
            warn!("[state] restore already ran in this process");
            return Err(StateError::AlreadyRestored);
        }
        restore(&self.console, self.engine.as_ref(), state).await
    }

    /// Load from storage and restore. `Ok(None)` when nothing was saved.
    pub async fn restore_saved(&self) -> Result<Option<RestoreSummary>, StateError> {
        match self.storage.load().await? {
            Some(state) => Ok(Some(self.restore(state).await?)),
            None => {
                info!("[state] nothing to restore");
                Ok(None)
            }
        }
    }

    /// Write the current state immediately.
    pub async fn persist_now(&self) -> Result<(), StorageError> {
        let state = self.snapshot();
        self.storage.save(&state).await
    }
}
