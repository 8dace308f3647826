//! Polling loops: device inventory and level meters
//!
//! Both loops run on fixed intervals until shutdown. The inventory loop is
//! the only one that mutates (through `Console::reconcile`); the meter loop
//! only reads the graph and publishes snapshots.

use crate::console::SharedConsole;
use crate::engine::{fetch_inventory, Engine, LevelReport, MeterTarget};
use crate::graph::{GraphStore, NodeRole};
use crate::meters::{MeterSnapshot, NodeMeter, PortMeter};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Refresh the inventory and reconcile on every tick.
pub async fn run_inventory_poll(
    console: SharedConsole,
    engine: Arc<dyn Engine>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("[poll] inventory poll shutting down");
                break;
            }
            _ = interval.tick() => {
                match fetch_inventory(engine.as_ref()).await {
                    Ok(inventory) => {
                        let changes = console.lock().reconcile(&inventory);
                        if !changes.is_empty() {
                            debug!(changes = changes.len(), "[poll] inventory reconciled");
                        }
                    }
                    Err(e) => warn!(error = %e, "[poll] inventory query failed"),
                }
            }
        }
    }
}

/// Meter targets for every available node, without duplicates.
pub fn meter_targets(store: &GraphStore) -> Vec<MeterTarget> {
    let mut targets = Vec::new();
    for node in store.nodes().filter(|n| n.available) {
        if let Some(target) = target_for(&node.role) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

fn target_for(role: &NodeRole) -> Option<MeterTarget> {
    match role {
        NodeRole::Source(src) => Some(MeterTarget::Input {
            device_id: src.device.device_id,
        }),
        NodeRole::Sink(sink) => Some(MeterTarget::Output {
            device_id: sink.device.device_id,
        }),
        NodeRole::Bus(bus) => Some(MeterTarget::Bus {
            bus_id: bus.bus_id.clone(),
        }),
    }
}

/// Slice engine reports into per-node meters. Channels the engine did not
/// report (or unavailable nodes) read as silence.
pub fn build_snapshot(store: &GraphStore, reports: &[LevelReport], sequence: u64) -> MeterSnapshot {
    let nodes = store
        .nodes()
        .map(|node| {
            let report = target_for(&node.role)
                .filter(|_| node.available)
                .and_then(|target| reports.iter().find(|r| r.target == target));
            let channels = (0..node.channel_count)
                .map(|port| {
                    let level = usize::try_from(node.engine_channel(port))
                        .ok()
                        .and_then(|ch| report.and_then(|r| r.channels.get(ch)));
                    match level {
                        Some(level) => PortMeter::from_levels(level.peak, level.rms),
                        None => PortMeter::default(),
                    }
                })
                .collect();
            NodeMeter {
                node: node.id,
                channels,
            }
        })
        .collect();
    MeterSnapshot { nodes, sequence }
}

/// Query levels at `period` and publish into `meters`.
pub async fn run_meter_poll(
    console: SharedConsole,
    engine: Arc<dyn Engine>,
    meters: Arc<ArcSwap<MeterSnapshot>>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    // 遅れたフレームは捨てる
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("[poll] meter poll shutting down");
                break;
            }
            _ = interval.tick() => {
                let targets = meter_targets(console.lock().store());
                if targets.is_empty() {
                    continue;
                }
                let reports = match engine.levels(&targets).await {
                    Ok(reports) => reports,
                    Err(e) => {
                        debug!(error = %e, "[poll] level query failed");
                        continue;
                    }
                };
                sequence += 1;
                let snapshot = build_snapshot(console.lock().store(), &reports, sequence);
                meters.store(Arc::new(snapshot));
            }
        }
    }
}
