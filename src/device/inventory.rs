//! Live device inventory as reported by the engine

use serde::{Deserialize, Serialize};

/// One input or output device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: u32,
    pub name: String,
    /// "USB", "Built-In", "Bluetooth", "Virtual", ...
    pub transport: String,
    pub channel_count: u16,
}

impl DeviceInfo {
    pub fn new(
        device_id: u32,
        name: impl Into<String>,
        transport: impl Into<String>,
        channel_count: u16,
    ) -> Self {
        Self {
            device_id,
            name: name.into(),
            transport: transport.into(),
            channel_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Snapshot of every device the engine currently sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventory {
    pub inputs: Vec<DeviceInfo>,
    pub outputs: Vec<DeviceInfo>,
    /// Devices with a running capture session
    #[serde(default)]
    pub active_captures: Vec<u32>,
}

impl DeviceInventory {
    pub fn devices(&self, direction: DeviceDirection) -> &[DeviceInfo] {
        match direction {
            DeviceDirection::Input => &self.inputs,
            DeviceDirection::Output => &self.outputs,
        }
    }

    pub fn find_by_id(&self, direction: DeviceDirection, device_id: u32) -> Option<&DeviceInfo> {
        self.devices(direction)
            .iter()
            .find(|d| d.device_id == device_id)
    }

    /// First device with this exact name, in inventory order.
    ///
    /// Names are not unique; two devices sharing a name resolve to whichever
    /// the engine lists first.
    pub fn find_by_name(&self, direction: DeviceDirection, name: &str) -> Option<&DeviceInfo> {
        self.devices(direction).iter().find(|d| d.name == name)
    }

    pub fn is_capturing(&self, device_id: u32) -> bool {
        self.active_captures.contains(&device_id)
    }
}
