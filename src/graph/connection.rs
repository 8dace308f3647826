//! Connection (Send) - all level control happens here

use super::node::NodeId;
use crate::gain::UNITY_FADER;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Connection の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a route; no two connections share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub from: NodeId,
    pub from_channel: u16,
    pub to: NodeId,
    pub to_channel: u16,
}

/// 送り
///
/// ソースノードの出力チャンネルからターゲットノードの入力チャンネルへの接続。
/// エンドポイントは作成後に変更できない（張り替えは削除→再作成）。
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: NodeId,
    pub from_channel: u16,
    pub to: NodeId,
    pub to_channel: u16,
    /// Send level on the fader scale, 0..=100
    pub send_level: f64,
    pub muted: bool,
    /// Created as half of a paired (stereo) gesture
    pub stereo_linked: bool,
}

impl Connection {
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            from: self.from,
            from_channel: self.from_channel,
            to: self.to,
            to_channel: self.to_channel,
        }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }

    /// このエッジが有効か（ミュートされておらず、レベルがある）
    pub fn is_active(&self) -> bool {
        !self.muted && self.send_level > 0.0
    }
}

/// New connection request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    pub from: NodeId,
    pub from_channel: u16,
    pub to: NodeId,
    pub to_channel: u16,
    pub send_level: f64,
    pub muted: bool,
    pub stereo_linked: bool,
}

impl ConnectionRequest {
    pub fn new(from: NodeId, from_channel: u16, to: NodeId, to_channel: u16) -> Self {
        Self {
            from,
            from_channel,
            to,
            to_channel,
            send_level: UNITY_FADER,
            muted: false,
            stereo_linked: false,
        }
    }

    pub fn level(mut self, send_level: f64) -> Self {
        self.send_level = send_level;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn linked(mut self) -> Self {
        self.stereo_linked = true;
        self
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            from: self.from,
            from_channel: self.from_channel,
            to: self.to,
            to_channel: self.to_channel,
        }
    }
}

/// Level/mute change. Endpoints are immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectionPatch {
    pub send_level: Option<f64>,
    pub muted: Option<bool>,
}

impl ConnectionPatch {
    pub fn level(send_level: f64) -> Self {
        Self {
            send_level: Some(send_level),
            muted: None,
        }
    }

    pub fn mute(muted: bool) -> Self {
        Self {
            send_level: None,
            muted: Some(muted),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.send_level.is_none() && self.muted.is_none()
    }
}
