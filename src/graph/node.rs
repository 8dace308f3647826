//! Node model - sources, buses and sinks

use crate::error::{GraphError, GraphResult};
use crate::gain::UNITY_FADER;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node の一意識別子
///
/// 不透明なIDで、生成時に割り当てられ再利用されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ノードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Source,
    Bus,
    Sink,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Bus => "bus",
            NodeKind::Sink => "sink",
        }
    }
}

/// UI がポートをペアで扱うかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Mono,
    Stereo,
}

impl ChannelMode {
    /// Stereo for exactly two channels, mono otherwise.
    pub fn for_channel_count(channel_count: u16) -> Self {
        if channel_count == 2 {
            ChannelMode::Stereo
        } else {
            ChannelMode::Mono
        }
    }
}

/// ソースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// 外部入力デバイス
    Device,
    /// 多重化された仮想デバイスの固定チャンネル (Prism など)
    ChannelFeed,
}

/// デバイスへの紐付け
///
/// `device_id` は再接続で変わりうるので、`device_name` で再同定する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device_id: u32,
    pub device_name: String,
    /// Transport type reported by the engine ("USB", "Built-In", "Virtual", ...)
    #[serde(default)]
    pub transport: String,
}

impl DeviceBinding {
    pub fn new(device_id: u32, device_name: impl Into<String>, transport: impl Into<String>) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            transport: transport.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBinding {
    pub kind: SourceKind,
    pub device: DeviceBinding,
    /// 多重化デバイス内の先頭チャンネル
    pub channel_offset: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkBinding {
    pub device: DeviceBinding,
    /// 集約デバイスのサブデバイスを区別するためのオフセット
    pub channel_offset: u16,
}

/// Effect instance on a bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInstance {
    pub instance_id: String,
    pub plugin_id: String,
    pub name: String,
    pub enabled: bool,
    /// Opaque plugin state, carried through persistence untouched
    pub state: Option<Vec<u8>>,
}

impl PluginInstance {
    pub fn new(plugin_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            instance_id: format!("fx_{}", Uuid::new_v4().simple()),
            plugin_id: plugin_id.into(),
            name: name.into(),
            enabled: true,
            state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusInfo {
    /// エンジンに登録される安定ID (`id` とは独立)
    pub bus_id: String,
    pub plugins: Vec<PluginInstance>,
}

/// Kind-specific part of a node.
///
/// ソース/シンクの紐付けは種類が一致する場合にのみ存在する。
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRole {
    Source(SourceBinding),
    Bus(BusInfo),
    Sink(SinkBinding),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// グラフの頂点
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub role: NodeRole,
    pub channel_count: u16,
    pub channel_mode: ChannelMode,
    /// false while the bound device is absent from the inventory
    pub available: bool,
    /// Fader position, 0..=100
    pub volume: f64,
    pub muted: bool,
    pub position: Position,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.role {
            NodeRole::Source(_) => NodeKind::Source,
            NodeRole::Bus(_) => NodeKind::Bus,
            NodeRole::Sink(_) => NodeKind::Sink,
        }
    }

    /// 入力ポート数 (ソースは入力なし)
    pub fn input_port_count(&self) -> u16 {
        match self.role {
            NodeRole::Source(_) => 0,
            _ => self.channel_count,
        }
    }

    /// 出力ポート数 (シンクは出力なし)
    pub fn output_port_count(&self) -> u16 {
        match self.role {
            NodeRole::Sink(_) => 0,
            _ => self.channel_count,
        }
    }

    pub fn device(&self) -> Option<&DeviceBinding> {
        match &self.role {
            NodeRole::Source(source) => Some(&source.device),
            NodeRole::Sink(sink) => Some(&sink.device),
            NodeRole::Bus(_) => None,
        }
    }

    pub(crate) fn device_mut(&mut self) -> Option<&mut DeviceBinding> {
        match &mut self.role {
            NodeRole::Source(source) => Some(&mut source.device),
            NodeRole::Sink(sink) => Some(&mut sink.device),
            NodeRole::Bus(_) => None,
        }
    }

    /// Nodes whose availability follows the device inventory:
    /// sinks and device-sourced inputs. Channel feeds ride on the multiplexer
    /// and are always considered present.
    pub fn is_device_bound(&self) -> bool {
        match &self.role {
            NodeRole::Source(source) => source.kind == SourceKind::Device,
            NodeRole::Sink(_) => true,
            NodeRole::Bus(_) => false,
        }
    }

    pub fn bus_id(&self) -> Option<&str> {
        match &self.role {
            NodeRole::Bus(bus) => Some(&bus.bus_id),
            _ => None,
        }
    }

    pub fn plugins(&self) -> &[PluginInstance] {
        match &self.role {
            NodeRole::Bus(bus) => &bus.plugins,
            _ => &[],
        }
    }

    /// Engine-side channel index for one of this node's ports.
    pub fn engine_channel(&self, port: u16) -> u32 {
        let offset = match &self.role {
            NodeRole::Source(source) => source.channel_offset,
            NodeRole::Sink(sink) => sink.channel_offset,
            NodeRole::Bus(_) => 0,
        };
        u32::from(offset) + u32::from(port)
    }

    /// 論理的な同一性キー (重複防止・ログ用)
    pub fn stable_id(&self) -> String {
        match &self.role {
            NodeRole::Source(source) => match source.kind {
                SourceKind::Device => format!(
                    "source:device:{}:{}",
                    source.device.device_id, source.channel_offset
                ),
                SourceKind::ChannelFeed => format!("source:feed:{}", source.channel_offset),
            },
            NodeRole::Bus(bus) => format!("bus:{}", bus.bus_id),
            NodeRole::Sink(sink) => format!(
                "sink:{}:{}:{}",
                sink.device.device_id, sink.channel_offset, self.channel_count
            ),
        }
    }
}

/// ノード生成リクエスト
///
/// Deliberately loose: which fields are required depends on `kind`, and
/// [`NodeSpec::build`] rejects anything inconsistent with `InvalidSpec`.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub kind: Option<NodeKind>,
    pub label: Option<String>,
    pub channel_count: u16,
    pub channel_mode: Option<ChannelMode>,
    pub source_kind: Option<SourceKind>,
    pub device: Option<DeviceBinding>,
    pub channel_offset: u16,
    pub bus_id: Option<String>,
    pub plugins: Vec<PluginInstance>,
    pub volume: Option<f64>,
    pub position: Position,
}

impl NodeSpec {
    pub fn device_source(device: DeviceBinding, channel_count: u16) -> Self {
        Self {
            kind: Some(NodeKind::Source),
            source_kind: Some(SourceKind::Device),
            device: Some(device),
            channel_count,
            ..Self::default()
        }
    }

    pub fn channel_feed(device: DeviceBinding, channel_offset: u16, channel_count: u16) -> Self {
        Self {
            kind: Some(NodeKind::Source),
            source_kind: Some(SourceKind::ChannelFeed),
            device: Some(device),
            channel_offset,
            channel_count,
            ..Self::default()
        }
    }

    pub fn bus(label: impl Into<String>, channel_count: u16) -> Self {
        Self {
            kind: Some(NodeKind::Bus),
            label: Some(label.into()),
            channel_count,
            ..Self::default()
        }
    }

    pub fn sink(device: DeviceBinding, channel_offset: u16, channel_count: u16) -> Self {
        Self {
            kind: Some(NodeKind::Sink),
            device: Some(device),
            channel_offset,
            channel_count,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_bus_id(mut self, bus_id: impl Into<String>) -> Self {
        self.bus_id = Some(bus_id.into());
        self
    }

    pub fn with_mode(mut self, mode: ChannelMode) -> Self {
        self.channel_mode = Some(mode);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Validate and turn the spec into a node with a fresh id.
    pub fn build(self) -> GraphResult<Node> {
        let kind = self
            .kind
            .ok_or_else(|| GraphError::InvalidSpec("node kind is required".into()))?;

        if self.channel_count == 0 {
            return Err(GraphError::InvalidSpec(
                "channel count must be at least 1".into(),
            ));
        }

        let channel_mode = self
            .channel_mode
            .unwrap_or_else(|| ChannelMode::for_channel_count(self.channel_count));
        if channel_mode == ChannelMode::Stereo && self.channel_count < 2 {
            return Err(GraphError::InvalidSpec(
                "stereo mode needs at least 2 channels".into(),
            ));
        }

        if kind != NodeKind::Bus && (self.bus_id.is_some() || !self.plugins.is_empty()) {
            return Err(GraphError::InvalidSpec(format!(
                "{} nodes cannot carry a bus id or plugins",
                kind.as_str()
            )));
        }
        if kind != NodeKind::Source && self.source_kind.is_some() {
            return Err(GraphError::InvalidSpec(format!(
                "{} nodes cannot carry a source kind",
                kind.as_str()
            )));
        }

        let role = match kind {
            NodeKind::Source => {
                let source_kind = self.source_kind.ok_or_else(|| {
                    GraphError::InvalidSpec("source nodes need a source kind".into())
                })?;
                let device = self.device.ok_or_else(|| {
                    GraphError::InvalidSpec("source nodes need a device binding".into())
                })?;
                NodeRole::Source(SourceBinding {
                    kind: source_kind,
                    device,
                    channel_offset: self.channel_offset,
                })
            }
            NodeKind::Bus => {
                if self.device.is_some() {
                    return Err(GraphError::InvalidSpec(
                        "bus nodes cannot carry a device binding".into(),
                    ));
                }
                let bus_id = match self.bus_id {
                    Some(id) if id.trim().is_empty() => {
                        return Err(GraphError::InvalidSpec("bus id must not be empty".into()))
                    }
                    Some(id) => id,
                    None => generate_bus_id(),
                };
                NodeRole::Bus(BusInfo {
                    bus_id,
                    plugins: self.plugins,
                })
            }
            NodeKind::Sink => {
                let device = self.device.ok_or_else(|| {
                    GraphError::InvalidSpec("sink nodes need a device binding".into())
                })?;
                NodeRole::Sink(SinkBinding {
                    device,
                    channel_offset: self.channel_offset,
                })
            }
        };

        let label = self.label.unwrap_or_else(|| default_label(&role));

        Ok(Node {
            id: NodeId::generate(),
            label,
            role,
            channel_count: self.channel_count,
            channel_mode,
            available: true,
            volume: self.volume.unwrap_or(UNITY_FADER).clamp(0.0, 100.0),
            muted: false,
            position: self.position,
        })
    }
}

fn generate_bus_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("bus_{}", &uuid[..8])
}

fn default_label(role: &NodeRole) -> String {
    match role {
        NodeRole::Source(source) => match source.kind {
            SourceKind::Device => source.device.device_name.clone(),
            SourceKind::ChannelFeed => format!("Ch {}", source.channel_offset + 1),
        },
        NodeRole::Bus(bus) => bus.bus_id.clone(),
        NodeRole::Sink(sink) => sink.device.device_name.clone(),
    }
}
