//! Persisted session shape (JSON)

use crate::gain::UNITY_FADER;
use crate::graph::{
    BusInfo, ChannelMode, Connection, ConnectionId, DeviceBinding, Node, NodeId, NodeKind,
    NodeRole, PluginInstance, Position, SinkBinding, SourceBinding, SourceKind,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

/// Canvas pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub pan_x: f32,
    pub pan_y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

/// マスターフェーダー
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterState {
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
}

impl Default for MasterState {
    fn default() -> Self {
        Self {
            volume: UNITY_FADER,
            muted: false,
        }
    }
}

/// Everything a session needs to come back after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    pub io_buffer_size: u32,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub master: MasterState,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: String,
    #[serde(default)]
    pub position: Position,
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    pub channel_count: u16,
    pub channel_mode: ChannelMode,
    pub binding: BindingRecord,
}

/// Kind-specific part of a node record, tagged by node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BindingRecord {
    Source {
        source_kind: SourceKind,
        device: DeviceBinding,
        #[serde(default)]
        channel_offset: u16,
    },
    Bus {
        bus_id: String,
        #[serde(default)]
        plugins: Vec<PluginRecord>,
    },
    Sink {
        device: DeviceBinding,
        #[serde(default)]
        channel_offset: u16,
    },
}

impl BindingRecord {
    pub fn kind(&self) -> NodeKind {
        match self {
            BindingRecord::Source { .. } => NodeKind::Source,
            BindingRecord::Bus { .. } => NodeKind::Bus,
            BindingRecord::Sink { .. } => NodeKind::Sink,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub instance_id: String,
    pub plugin_id: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    /// Opaque plugin state, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub from: NodeId,
    pub from_channel: u16,
    pub to: NodeId,
    pub to_channel: u16,
    pub send_level: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub stereo_linked: bool,
}

// =============================================================================
// Conversions
// =============================================================================

impl From<&PluginInstance> for PluginRecord {
    fn from(plugin: &PluginInstance) -> Self {
        Self {
            instance_id: plugin.instance_id.clone(),
            plugin_id: plugin.plugin_id.clone(),
            name: plugin.name.clone(),
            enabled: plugin.enabled,
            state: plugin
                .state
                .as_ref()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

impl From<PluginRecord> for PluginInstance {
    fn from(record: PluginRecord) -> Self {
        let state = record.state.and_then(|encoded| {
            match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes()) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(instance = %record.instance_id, error = %e, "[state] dropping undecodable plugin state");
                    None
                }
            }
        });
        Self {
            instance_id: record.instance_id,
            plugin_id: record.plugin_id,
            name: record.name,
            enabled: record.enabled,
            state,
        }
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        let binding = match &node.role {
            NodeRole::Source(src) => BindingRecord::Source {
                source_kind: src.kind,
                device: src.device.clone(),
                channel_offset: src.channel_offset,
            },
            NodeRole::Bus(bus) => BindingRecord::Bus {
                bus_id: bus.bus_id.clone(),
                plugins: bus.plugins.iter().map(PluginRecord::from).collect(),
            },
            NodeRole::Sink(sink) => BindingRecord::Sink {
                device: sink.device.clone(),
                channel_offset: sink.channel_offset,
            },
        };
        Self {
            id: node.id,
            label: node.label.clone(),
            position: node.position,
            volume: node.volume,
            muted: node.muted,
            channel_count: node.channel_count,
            channel_mode: node.channel_mode,
            binding,
        }
    }
}

impl NodeRecord {
    /// Rebuild the node. Availability starts `true`; restore settles it
    /// against the live inventory before insertion.
    pub fn into_node(self) -> Node {
        let role = match self.binding {
            BindingRecord::Source {
                source_kind,
                device,
                channel_offset,
            } => NodeRole::Source(SourceBinding {
                kind: source_kind,
                device,
                channel_offset,
            }),
            BindingRecord::Bus { bus_id, plugins } => NodeRole::Bus(BusInfo {
                bus_id,
                plugins: plugins.into_iter().map(PluginInstance::from).collect(),
            }),
            BindingRecord::Sink {
                device,
                channel_offset,
            } => NodeRole::Sink(SinkBinding {
                device,
                channel_offset,
            }),
        };
        Node {
            id: self.id,
            label: self.label,
            role,
            channel_count: self.channel_count,
            channel_mode: self.channel_mode,
            available: true,
            volume: self.volume.clamp(0.0, 100.0),
            muted: self.muted,
            position: self.position,
        }
    }
}

impl From<&Connection> for ConnectionRecord {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id,
            from: conn.from,
            from_channel: conn.from_channel,
            to: conn.to,
            to_channel: conn.to_channel,
            send_level: conn.send_level,
            muted: conn.muted,
            stereo_linked: conn.stereo_linked,
        }
    }
}

impl From<ConnectionRecord> for Connection {
    fn from(record: ConnectionRecord) -> Self {
        Self {
            id: record.id,
            from: record.from,
            from_channel: record.from_channel,
            to: record.to,
            to_channel: record.to_channel,
            send_level: record.send_level.clamp(0.0, 100.0),
            muted: record.muted,
            stereo_linked: record.stereo_linked,
        }
    }
}
