//! Engine commands and the FIFO queue that carries them

use super::Engine;
use crate::error::EngineResult;
use crate::routing::{ReplayPlan, ReplaySummary, SendRoute};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// エンジンへの変更コマンド
///
/// One value per engine call. Executed strictly in enqueue order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    StartCapture { device_id: u32 },
    StopCapture { device_id: u32 },
    StartOutput { device_id: u32 },
    StopOutput { device_id: u32 },
    SetOutputVolume { device_id: u32, gain: f32 },
    AddBus { bus_id: String, channel_count: u16 },
    RemoveBus { bus_id: String },
    AddEffect { bus_id: String, plugin_id: String, instance_id: String },
    RemoveEffect { bus_id: String, instance_id: String },
    ReorderEffects { bus_id: String, instance_ids: Vec<String> },
    SetEffectEnabled { bus_id: String, instance_id: String, enabled: bool },
    AddSend { route: SendRoute, gain: f32, muted: bool },
    UpdateSend { route: SendRoute, gain: f32, muted: bool },
    RemoveSend { route: SendRoute },
}

impl EngineCommand {
    pub async fn execute(&self, engine: &dyn Engine) -> EngineResult<()> {
        match self {
            EngineCommand::StartCapture { device_id } => engine.start_capture(*device_id).await,
            EngineCommand::StopCapture { device_id } => engine.stop_capture(*device_id).await,
            EngineCommand::StartOutput { device_id } => engine.start_output(*device_id).await,
            EngineCommand::StopOutput { device_id } => engine.stop_output(*device_id).await,
            EngineCommand::SetOutputVolume { device_id, gain } => {
                engine.set_output_volume(*device_id, *gain).await
            }
            EngineCommand::AddBus {
                bus_id,
                channel_count,
            } => engine.add_bus(bus_id, *channel_count).await,
            EngineCommand::RemoveBus { bus_id } => engine.remove_bus(bus_id).await,
            EngineCommand::AddEffect {
                bus_id,
                plugin_id,
                instance_id,
            } => engine.add_effect(bus_id, plugin_id, instance_id).await,
            EngineCommand::RemoveEffect {
                bus_id,
                instance_id,
            } => engine.remove_effect(bus_id, instance_id).await,
            EngineCommand::ReorderEffects {
                bus_id,
                instance_ids,
            } => engine.reorder_effects(bus_id, instance_ids).await,
            EngineCommand::SetEffectEnabled {
                bus_id,
                instance_id,
                enabled,
            } => engine.set_effect_enabled(bus_id, instance_id, *enabled).await,
            EngineCommand::AddSend { route, gain, muted } => {
                engine.add_send(route, *gain, *muted).await
            }
            EngineCommand::UpdateSend { route, gain, muted } => {
                engine.update_send(route, *gain, *muted).await
            }
            EngineCommand::RemoveSend { route } => engine.remove_send(route).await,
        }
    }

    /// Execute and log a failure instead of returning it.
    pub async fn execute_logged(&self, engine: &dyn Engine) -> bool {
        match self.execute(engine).await {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %self, error = %e, "[engine] command failed");
                false
            }
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::StartCapture { device_id } => write!(f, "start_capture({})", device_id),
            EngineCommand::StopCapture { device_id } => write!(f, "stop_capture({})", device_id),
            EngineCommand::StartOutput { device_id } => write!(f, "start_output({})", device_id),
            EngineCommand::StopOutput { device_id } => write!(f, "stop_output({})", device_id),
            EngineCommand::SetOutputVolume { device_id, gain } => {
                write!(f, "set_output_volume({}, {:.4})", device_id, gain)
            }
            EngineCommand::AddBus {
                bus_id,
                channel_count,
            } => write!(f, "add_bus({}, {}ch)", bus_id, channel_count),
            EngineCommand::RemoveBus { bus_id } => write!(f, "remove_bus({})", bus_id),
            EngineCommand::AddEffect {
                bus_id,
                plugin_id,
                instance_id,
            } => write!(f, "add_effect({}, {}, {})", bus_id, plugin_id, instance_id),
            EngineCommand::RemoveEffect {
                bus_id,
                instance_id,
            } => write!(f, "remove_effect({}, {})", bus_id, instance_id),
            EngineCommand::ReorderEffects {
                bus_id,
                instance_ids,
            } => write!(f, "reorder_effects({}, {:?})", bus_id, instance_ids),
            EngineCommand::SetEffectEnabled {
                bus_id,
                instance_id,
                enabled,
            } => write!(f, "set_effect_enabled({}, {}, {})", bus_id, instance_id, enabled),
            EngineCommand::AddSend { route, gain, muted } => {
                write!(f, "add_send({}, {:.4}, muted={})", route, gain, muted)
            }
            EngineCommand::UpdateSend { route, gain, muted } => {
                write!(f, "update_send({}, {:.4}, muted={})", route, gain, muted)
            }
            EngineCommand::RemoveSend { route } => write!(f, "remove_send({})", route),
        }
    }
}

/// What travels through the queue: a single command, or a whole restore
/// replay that must run as one unit.
#[derive(Debug)]
enum Job {
    Command(EngineCommand),
    Replay {
        plan: ReplayPlan,
        done: oneshot::Sender<ReplaySummary>,
    },
}

/// Create a connected queue/worker pair.
pub fn command_channel() -> (CommandQueue, CommandWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandQueue { tx }, CommandWorker { rx })
}

/// Producer half. Never blocks.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CommandQueue {
    pub fn push(&self, command: EngineCommand) {
        debug!(command = %command, "[engine] enqueue");
        if let Err(e) = self.tx.send(Job::Command(command)) {
            if let Job::Command(command) = e.0 {
                warn!(command = %command, "[engine] worker gone, command dropped");
            }
        }
    }

    /// Queue a replay behind everything already queued. Commands pushed
    /// afterwards wait until the whole plan has run.
    ///
    /// Gives the plan back when no worker is listening.
    pub fn replay(&self, plan: ReplayPlan) -> Result<oneshot::Receiver<ReplaySummary>, ReplayPlan> {
        let (done, finished) = oneshot::channel();
        match self.tx.send(Job::Replay { plan, done }) {
            Ok(()) => Ok(finished),
            Err(e) => match e.0 {
                Job::Replay { plan, .. } => Err(plan),
                Job::Command(_) => Err(ReplayPlan::default()),
            },
        }
    }
}

/// Consumer half: executes commands one at a time against the engine.
#[derive(Debug)]
pub struct CommandWorker {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CommandWorker {
    /// Run until every [`CommandQueue`] is dropped.
    ///
    /// Failures are logged and the next command runs; nothing is retried.
    pub async fn run(mut self, engine: Arc<dyn Engine>) {
        while let Some(job) = self.rx.recv().await {
            match job {
                Job::Command(command) => {
                    command.execute_logged(engine.as_ref()).await;
                }
                Job::Replay { plan, done } => {
                    let summary = plan.execute(engine.as_ref()).await;
                    if done.send(summary).is_err() {
                        debug!("[engine] replay finished, nobody waiting");
                    }
                }
            }
        }
        debug!("[engine] command worker stopped");
    }

    /// Pop everything queued so far without executing it. A queued replay
    /// is flattened into its commands in phase order.
    pub fn drain(&mut self) -> Vec<EngineCommand> {
        let mut out = Vec::new();
        while let Ok(job) = self.rx.try_recv() {
            match job {
                Job::Command(command) => out.push(command),
                Job::Replay { plan, .. } => out.extend(plan.commands().cloned()),
            }
        }
        out
    }
}
