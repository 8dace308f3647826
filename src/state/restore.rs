//! Restore - rebuild the graph from a saved state and replay it into the engine

use super::dto::{SessionState, STATE_VERSION};
use crate::console::SharedConsole;
use crate::engine::{fetch_inventory, Engine};
use crate::error::{StateError, StorageError};
use crate::routing::ReplaySummary;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub nodes: usize,
    pub connections: usize,
    pub unavailable: usize,
    pub skipped: usize,
    pub replay: ReplaySummary,
}

/// Load `state` into the console and replay it.
///
/// Order: inventory query, graph rebuild (availability settled per node),
/// then bus registration → device I/O → sends. The replay is queued on the
/// command queue before the console lock is released, so edits made while
/// it runs reach the engine after it. Without a running worker the plan is
/// executed here instead.
pub async fn restore(
    console: &SharedConsole,
    engine: &dyn Engine,
    state: SessionState,
) -> Result<RestoreSummary, StateError> {
    if state.version > STATE_VERSION {
        return Err(StateError::UnsupportedVersion(state.version));
    }

    let inventory = fetch_inventory(engine).await.map_err(StorageError::from)?;
    let (report, queued) = {
        let mut console = console.lock();
        let mut report = console.load(state, &inventory);
        let queued = console.queue_replay(std::mem::take(&mut report.plan));
        (report, queued)
    };
    let replay = match queued {
        Ok(finished) => match finished.await {
            Ok(summary) => summary,
            Err(_) => {
                warn!("[state] command worker stopped during replay");
                ReplaySummary::default()
            }
        },
        Err(plan) => {
            debug!("[state] no command worker, replaying directly");
            plan.execute(engine).await
        }
    };

    let summary = RestoreSummary {
        nodes: report.nodes,
        connections: report.connections,
        unavailable: report.unavailable,
        skipped: report.skipped_nodes + report.skipped_connections,
        replay,
    };
    info!(?summary, "[state] restore complete");
    Ok(summary)
}
