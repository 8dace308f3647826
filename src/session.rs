//! Session - wires the console, engine worker, pollers and persistence
//!
//! Everything spawned here is torn down by [`Session::shutdown`] (or, without
//! the final flush, by dropping the session).

use crate::config::ControlConfig;
use crate::console::{Console, SharedConsole};
use crate::engine::{command_channel, Engine};
use crate::error::{EngineResult, StateError, StorageError};
use crate::meters::MeterSnapshot;
use crate::poll::{run_inventory_poll, run_meter_poll};
use crate::state::{run_autosave, PersistenceAdapter, RestoreSummary, SessionState, Storage};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Session {
    console: SharedConsole,
    engine: Arc<dyn Engine>,
    persistence: PersistenceAdapter,
    meters: Arc<ArcSwap<MeterSnapshot>>,
    shutdown: broadcast::Sender<()>,
    /// Loops that stop on the shutdown signal
    loops: Vec<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn the command worker and background loops. Must be called inside
    /// a tokio runtime.
    pub fn start(engine: Arc<dyn Engine>, storage: Arc<dyn Storage>, config: &ControlConfig) -> Self {
        let (queue, worker) = command_channel();
        let worker = tokio::spawn(worker.run(Arc::clone(&engine)));

        let console = Console::from_config(queue, config).into_shared();
        let revisions = console.lock().subscribe();
        let persistence =
            PersistenceAdapter::new(Arc::clone(&console), Arc::clone(&engine), Arc::clone(&storage));
        let meters = Arc::new(ArcSwap::from_pointee(MeterSnapshot::default()));
        let (shutdown, _) = broadcast::channel(1);

        let loops = vec![
            tokio::spawn(run_inventory_poll(
                Arc::clone(&console),
                Arc::clone(&engine),
                config.inventory_interval(),
                shutdown.subscribe(),
            )),
            tokio::spawn(run_meter_poll(
                Arc::clone(&console),
                Arc::clone(&engine),
                Arc::clone(&meters),
                config.meter_interval(),
                shutdown.subscribe(),
            )),
            tokio::spawn(run_autosave(
                Arc::clone(&console),
                revisions,
                storage,
                config.persist_debounce(),
                shutdown.subscribe(),
            )),
        ];

        info!("[session] started");
        Self {
            console,
            engine,
            persistence,
            meters,
            shutdown,
            loops,
            worker: Some(worker),
        }
    }

    pub fn console(&self) -> SharedConsole {
        Arc::clone(&self.console)
    }

    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engine)
    }

    /// Latest published meters (lock-free)
    pub fn meters(&self) -> Arc<MeterSnapshot> {
        self.meters.load_full()
    }

    pub fn snapshot(&self) -> SessionState {
        self.persistence.snapshot()
    }

    /// Restore the saved session, once per process.
    pub async fn restore_saved(&self) -> Result<Option<RestoreSummary>, StateError> {
        self.persistence.restore_saved().await
    }

    pub async fn restore(&self, state: SessionState) -> Result<RestoreSummary, StateError> {
        self.persistence.restore(state).await
    }

    pub async fn persist_now(&self) -> Result<(), StorageError> {
        self.persistence.persist_now().await
    }

    /// Save, then ask the engine host to restart the application.
    pub async fn restart(&self) -> EngineResult<()> {
        if let Err(e) = self.persist_now().await {
            warn!(error = %e, "[session] persist before restart failed");
        }
        self.engine.restart().await
    }

    /// Stop every loop, flushing a pending save, then stop the worker.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        for handle in std::mem::take(&mut self.loops) {
            if let Err(e) = handle.await {
                warn!(error = %e, "[session] background task ended abnormally");
            }
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        info!("[session] shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for handle in &self.loops {
            handle.abort();
        }
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }
}
