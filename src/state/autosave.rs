//! Debounced persistence loop

use super::storage::Storage;
use crate::console::SharedConsole;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

async fn save_snapshot(console: &SharedConsole, storage: &dyn Storage) {
    let state = console.lock().snapshot();
    if let Err(e) = storage.save(&state).await {
        warn!(error = %e, "[state] autosave failed");
    }
}

/// Save the console state once changes have been quiet for `debounce`.
///
/// `revisions` comes from [`Console::subscribe`](crate::console::Console::subscribe),
/// taken before the first change that should be saved. A pending change is
/// flushed on shutdown.
pub async fn run_autosave(
    console: SharedConsole,
    mut revisions: watch::Receiver<u64>,
    storage: Arc<dyn Storage>,
    debounce: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let quiet = sleep(debounce);
    tokio::pin!(quiet);
    let mut pending = false;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                if pending {
                    save_snapshot(&console, storage.as_ref()).await;
                }
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    if pending {
                        save_snapshot(&console, storage.as_ref()).await;
                    }
                    break;
                }
                let revision = *revisions.borrow_and_update();
                debug!(revision, "[state] change pending");
                // 変更が続く間は書き込みを遅らせる
                pending = true;
                quiet.as_mut().reset(Instant::now() + debounce);
            }
            () = &mut quiet, if pending => {
                pending = false;
                save_snapshot(&console, storage.as_ref()).await;
            }
        }
    }
    debug!("[state] autosave loop stopped");
}
