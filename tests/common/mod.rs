//! Shared test fixtures: an in-memory engine that records every call

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use spectrum_control::device::{DeviceInfo, DeviceInventory};
use spectrum_control::engine::{Engine, EngineCommand, LevelReport, MeterTarget};
use spectrum_control::error::{EngineError, EngineResult};
use spectrum_control::routing::SendRoute;
use spectrum_control::state::{SessionState, Storage};
use spectrum_control::StorageError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PRISM: u32 = 1;
pub const MIC: u32 = 3;
pub const SPEAKERS: u32 = 7;
pub const HEADPHONES: u32 = 8;

/// Prism (virtual, 64ch), a USB mic, built-in speakers and USB headphones.
pub fn studio_inventory() -> DeviceInventory {
    DeviceInventory {
        inputs: vec![
            DeviceInfo::new(PRISM, "Prism", "Virtual", 64),
            DeviceInfo::new(MIC, "Mic", "USB", 2),
        ],
        outputs: vec![
            DeviceInfo::new(SPEAKERS, "Speakers", "Built-In", 2),
            DeviceInfo::new(HEADPHONES, "Headphones", "USB", 2),
        ],
        active_captures: vec![PRISM],
    }
}

#[derive(Default)]
pub struct RecordingEngine {
    inventory: Mutex<DeviceInventory>,
    levels: Mutex<Vec<LevelReport>>,
    calls: Mutex<Vec<EngineCommand>>,
    failing: Mutex<Vec<String>>,
    blob: Mutex<Option<String>>,
    restarts: AtomicUsize,
}

impl RecordingEngine {
    pub fn new(inventory: DeviceInventory) -> Arc<Self> {
        let engine = Self::default();
        *engine.inventory.lock() = inventory;
        Arc::new(engine)
    }

    pub fn set_inventory(&self, inventory: DeviceInventory) {
        *self.inventory.lock() = inventory;
    }

    pub fn set_levels(&self, levels: Vec<LevelReport>) {
        *self.levels.lock() = levels;
    }

    /// Fail every call whose display form contains `pattern`.
    pub fn fail_matching(&self, pattern: &str) {
        self.failing.lock().push(pattern.to_string());
    }

    pub fn calls(&self) -> Vec<EngineCommand> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    async fn record(&self, command: EngineCommand) -> EngineResult<()> {
        // let concurrent callers interleave
        tokio::task::yield_now().await;
        let text = command.to_string();
        let fail = self.failing.lock().iter().any(|p| text.contains(p.as_str()));
        self.calls.lock().push(command);
        if fail {
            Err(EngineError::call_failed(text, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn input_devices(&self) -> EngineResult<Vec<DeviceInfo>> {
        Ok(self.inventory.lock().inputs.clone())
    }

    async fn output_devices(&self) -> EngineResult<Vec<DeviceInfo>> {
        Ok(self.inventory.lock().outputs.clone())
    }

    async fn active_captures(&self) -> EngineResult<Vec<u32>> {
        Ok(self.inventory.lock().active_captures.clone())
    }

    async fn start_capture(&self, device_id: u32) -> EngineResult<()> {
        self.record(EngineCommand::StartCapture { device_id }).await
    }

    async fn stop_capture(&self, device_id: u32) -> EngineResult<()> {
        self.record(EngineCommand::StopCapture { device_id }).await
    }

    async fn start_output(&self, device_id: u32) -> EngineResult<()> {
        self.record(EngineCommand::StartOutput { device_id }).await
    }

    async fn stop_output(&self, device_id: u32) -> EngineResult<()> {
        self.record(EngineCommand::StopOutput { device_id }).await
    }

    async fn set_output_volume(&self, device_id: u32, gain: f32) -> EngineResult<()> {
        self.record(EngineCommand::SetOutputVolume { device_id, gain })
            .await
    }

    async fn add_bus(&self, bus_id: &str, channel_count: u16) -> EngineResult<()> {
        self.record(EngineCommand::AddBus {
            bus_id: bus_id.to_string(),
            channel_count,
        })
        .await
    }

    async fn remove_bus(&self, bus_id: &str) -> EngineResult<()> {
        self.record(EngineCommand::RemoveBus {
            bus_id: bus_id.to_string(),
        })
        .await
    }

    async fn add_effect(
        &self,
        bus_id: &str,
        plugin_id: &str,
        instance_id: &str,
    ) -> EngineResult<()> {
        self.record(EngineCommand::AddEffect {
            bus_id: bus_id.to_string(),
            plugin_id: plugin_id.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await
    }

    async fn remove_effect(&self, bus_id: &str, instance_id: &str) -> EngineResult<()> {
        self.record(EngineCommand::RemoveEffect {
            bus_id: bus_id.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await
    }

    async fn reorder_effects(&self, bus_id: &str, instance_ids: &[String]) -> EngineResult<()> {
        self.record(EngineCommand::ReorderEffects {
            bus_id: bus_id.to_string(),
            instance_ids: instance_ids.to_vec(),
        })
        .await
    }

    async fn set_effect_enabled(
        &self,
        bus_id: &str,
        instance_id: &str,
        enabled: bool,
    ) -> EngineResult<()> {
        self.record(EngineCommand::SetEffectEnabled {
            bus_id: bus_id.to_string(),
            instance_id: instance_id.to_string(),
            enabled,
        })
        .await
    }

    async fn add_send(&self, route: &SendRoute, gain: f32, muted: bool) -> EngineResult<()> {
        self.record(EngineCommand::AddSend {
            route: route.clone(),
            gain,
            muted,
        })
        .await
    }

    async fn update_send(&self, route: &SendRoute, gain: f32, muted: bool) -> EngineResult<()> {
        self.record(EngineCommand::UpdateSend {
            route: route.clone(),
            gain,
            muted,
        })
        .await
    }

    async fn remove_send(&self, route: &SendRoute) -> EngineResult<()> {
        self.record(EngineCommand::RemoveSend {
            route: route.clone(),
        })
        .await
    }

    async fn levels(&self, targets: &[MeterTarget]) -> EngineResult<Vec<LevelReport>> {
        Ok(self
            .levels
            .lock()
            .iter()
            .filter(|r| targets.contains(&r.target))
            .cloned()
            .collect())
    }

    async fn load_state(&self) -> EngineResult<Option<String>> {
        Ok(self.blob.lock().clone())
    }

    async fn save_state(&self, blob: &str) -> EngineResult<()> {
        *self.blob.lock() = Some(blob.to_string());
        Ok(())
    }

    async fn restart(&self) -> EngineResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory storage that counts writes.
#[derive(Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<SessionState>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn with_state(state: SessionState) -> Arc<Self> {
        let storage = Self::default();
        *storage.saved.lock() = Some(state);
        Arc::new(storage)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Option<SessionState> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<Option<SessionState>, StorageError> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, state: &SessionState) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.saved.lock() = Some(state.clone());
        Ok(())
    }
}
