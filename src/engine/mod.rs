//! External audio engine seam
//!
//! The engine owns the signal path (mixing, plugin hosting, device I/O).
//! This crate only talks to it through [`Engine`]: an asynchronous
//! request/response surface. Mutations go through the FIFO
//! [`CommandQueue`] and are fire-and-forget; queries are awaited directly by
//! the polling loops and restore.

mod command;

pub use command::{command_channel, CommandQueue, CommandWorker, EngineCommand};

use crate::device::{DeviceDirection, DeviceInfo, DeviceInventory};
use crate::error::EngineResult;
use crate::routing::SendRoute;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Something the engine can meter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeterTarget {
    Input { device_id: u32 },
    Output { device_id: u32 },
    Bus { bus_id: String },
}

impl MeterTarget {
    pub fn device(direction: DeviceDirection, device_id: u32) -> Self {
        match direction {
            DeviceDirection::Input => MeterTarget::Input { device_id },
            DeviceDirection::Output => MeterTarget::Output { device_id },
        }
    }
}

/// Raw linear level of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevel {
    pub peak: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub target: MeterTarget,
    /// Indexed by engine channel
    pub channels: Vec<ChannelLevel>,
}

/// Command/query surface of the audio engine.
#[async_trait]
pub trait Engine: Send + Sync {
    // --- inventory ---
    async fn input_devices(&self) -> EngineResult<Vec<DeviceInfo>>;
    async fn output_devices(&self) -> EngineResult<Vec<DeviceInfo>>;
    /// Device ids with a running capture session
    async fn active_captures(&self) -> EngineResult<Vec<u32>>;

    // --- device I/O ---
    async fn start_capture(&self, device_id: u32) -> EngineResult<()>;
    async fn stop_capture(&self, device_id: u32) -> EngineResult<()>;
    async fn start_output(&self, device_id: u32) -> EngineResult<()>;
    async fn stop_output(&self, device_id: u32) -> EngineResult<()>;
    /// Master output level of a device, linear gain
    async fn set_output_volume(&self, device_id: u32, gain: f32) -> EngineResult<()>;

    // --- buses and effects ---
    async fn add_bus(&self, bus_id: &str, channel_count: u16) -> EngineResult<()>;
    async fn remove_bus(&self, bus_id: &str) -> EngineResult<()>;
    async fn add_effect(&self, bus_id: &str, plugin_id: &str, instance_id: &str)
        -> EngineResult<()>;
    async fn remove_effect(&self, bus_id: &str, instance_id: &str) -> EngineResult<()>;
    async fn reorder_effects(&self, bus_id: &str, instance_ids: &[String]) -> EngineResult<()>;
    async fn set_effect_enabled(
        &self,
        bus_id: &str,
        instance_id: &str,
        enabled: bool,
    ) -> EngineResult<()>;

    // --- sends ---
    async fn add_send(&self, route: &SendRoute, gain: f32, muted: bool) -> EngineResult<()>;
    async fn update_send(&self, route: &SendRoute, gain: f32, muted: bool) -> EngineResult<()>;
    async fn remove_send(&self, route: &SendRoute) -> EngineResult<()>;

    // --- metering ---
    async fn levels(&self, targets: &[MeterTarget]) -> EngineResult<Vec<LevelReport>>;

    // --- application ---
    async fn load_state(&self) -> EngineResult<Option<String>>;
    async fn save_state(&self, blob: &str) -> EngineResult<()>;
    async fn restart(&self) -> EngineResult<()>;
}

/// Query the full device inventory.
pub async fn fetch_inventory(engine: &dyn Engine) -> EngineResult<DeviceInventory> {
    let inputs = engine.input_devices().await?;
    let outputs = engine.output_devices().await?;
    let active_captures = engine.active_captures().await?;
    Ok(DeviceInventory {
        inputs,
        outputs,
        active_captures,
    })
}
