//! Graph Store - canonical owner of nodes and connections

use super::connection::{Connection, ConnectionId, ConnectionPatch, ConnectionRequest, RouteKey};
use super::node::{ChannelMode, Node, NodeId, NodeKind, NodeSpec};
use crate::error::{GraphError, GraphResult, RouteRejection};
use std::collections::HashMap;
use tracing::debug;

/// ルーティンググラフ
///
/// ノードとエッジ（送り）を排他的に所有し、構造上の不変条件を守る。
/// エンジンは一切呼ばない。呼び出し側（Console）がエンジン側の後始末を行う。
///
/// Every mutation validates first and applies second, so a failed call leaves
/// the store exactly as it was.
#[derive(Debug, Default)]
pub struct GraphStore {
    /// ノード格納
    nodes: HashMap<NodeId, Node>,
    /// 挿入順 (反復順を決定的にするため)
    order: Vec<NodeId>,
    /// エッジ (作成順)
    connections: Vec<Connection>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// ノードを追加
    pub fn add_node(&mut self, spec: NodeSpec) -> GraphResult<Node> {
        let node = spec.build()?;
        debug!(node = %node.id, stable_id = %node.stable_id(), "[graph] add_node");
        self.order.push(node.id);
        self.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    /// Insert an already-built node, keeping its id. Used by restore.
    pub fn insert_node(&mut self, node: Node) -> GraphResult<()> {
        if node.channel_count == 0 {
            return Err(GraphError::InvalidSpec(
                "channel count must be at least 1".into(),
            ));
        }
        if node.channel_mode == ChannelMode::Stereo && node.channel_count < 2 {
            return Err(GraphError::InvalidSpec(
                "stereo mode needs at least 2 channels".into(),
            ));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::InvalidSpec(format!(
                "node id {} is already in use",
                node.id
            )));
        }
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// ノードを削除（関連エッジも自動削除）
    ///
    /// Returns the removed node and the cascaded connections so the caller can
    /// tear down the engine-side sends.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<(Node, Vec<Connection>)> {
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        self.order.retain(|n| *n != id);

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .connections
            .drain(..)
            .partition(|c| c.touches(id));
        self.connections = kept;

        debug!(node = %id, cascaded = removed.len(), "[graph] remove_node");
        Ok((node, removed))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// すべてのノード (挿入順)
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(move |id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn find_by_stable_id(&self, stable_id: &str) -> Option<&Node> {
        self.nodes().find(|n| n.stable_id() == stable_id)
    }

    pub fn find_bus(&self, bus_id: &str) -> Option<&Node> {
        self.nodes().find(|n| n.bus_id() == Some(bus_id))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.nodes().filter(move |n| n.kind() == kind)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Check every connection invariant for a prospective route.
    ///
    /// Feedback-loop prevention is a policy decision and lives in the
    /// routing layer, not here.
    pub fn validate_route(&self, key: &RouteKey) -> GraphResult<()> {
        if key.from == key.to {
            return Err(GraphError::InvalidRoute(RouteRejection::SelfRoute));
        }
        let from = self
            .nodes
            .get(&key.from)
            .ok_or(GraphError::InvalidRoute(RouteRejection::UnknownNode))?;
        let to = self
            .nodes
            .get(&key.to)
            .ok_or(GraphError::InvalidRoute(RouteRejection::UnknownNode))?;

        if from.kind() == NodeKind::Sink {
            return Err(GraphError::InvalidRoute(RouteRejection::SinkAsSource));
        }
        if to.kind() == NodeKind::Source {
            return Err(GraphError::InvalidRoute(RouteRejection::SourceAsTarget));
        }
        if key.from_channel >= from.channel_count {
            return Err(GraphError::InvalidRoute(
                RouteRejection::FromChannelOutOfRange {
                    channel: key.from_channel,
                    channel_count: from.channel_count,
                },
            ));
        }
        if key.to_channel >= to.channel_count {
            return Err(GraphError::InvalidRoute(RouteRejection::ToChannelOutOfRange {
                channel: key.to_channel,
                channel_count: to.channel_count,
            }));
        }
        if let Some(existing) = self.find_route(key) {
            return Err(GraphError::DuplicateRoute(existing.id));
        }
        Ok(())
    }

    /// エッジを追加
    pub fn add_connection(&mut self, request: ConnectionRequest) -> GraphResult<Connection> {
        self.validate_route(&request.route_key())?;
        let connection = Connection {
            id: ConnectionId::generate(),
            from: request.from,
            from_channel: request.from_channel,
            to: request.to,
            to_channel: request.to_channel,
            send_level: request.send_level.clamp(0.0, 100.0),
            muted: request.muted,
            stereo_linked: request.stereo_linked,
        };
        self.connections.push(connection.clone());
        Ok(connection)
    }

    /// Add two connections or neither.
    pub fn add_connection_pair(
        &mut self,
        left: ConnectionRequest,
        right: ConnectionRequest,
    ) -> GraphResult<(Connection, Connection)> {
        let (left_key, right_key) = (left.route_key(), right.route_key());
        self.validate_route(&left_key)?;
        self.validate_route(&right_key)?;
        if left_key == right_key {
            return Err(GraphError::InvalidSpec(
                "paired connections must use different channels".into(),
            ));
        }
        let left = self.add_connection(left)?;
        let right = self.add_connection(right)?;
        Ok((left, right))
    }

    /// Insert an already-built connection, keeping its id. Used by restore.
    pub fn insert_connection(&mut self, connection: Connection) -> GraphResult<()> {
        self.validate_route(&connection.route_key())?;
        if self.connection(connection.id).is_some() {
            return Err(GraphError::InvalidSpec(format!(
                "connection id {} is already in use",
                connection.id
            )));
        }
        self.connections.push(connection);
        Ok(())
    }

    /// エッジを削除
    pub fn remove_connection(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        Ok(self.connections.remove(pos))
    }

    /// レベル/ミュートを更新（エンドポイントは不変）
    pub fn update_connection(
        &mut self,
        id: ConnectionId,
        patch: ConnectionPatch,
    ) -> GraphResult<Connection> {
        let connection = self
            .connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        if let Some(level) = patch.send_level {
            connection.send_level = level.clamp(0.0, 100.0);
        }
        if let Some(muted) = patch.muted {
            connection.muted = muted;
        }
        Ok(connection.clone())
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// すべてのエッジ (作成順)
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn find_route(&self, key: &RouteKey) -> Option<&Connection> {
        self.connections.iter().find(|c| c.route_key() == *key)
    }

    /// ターゲットノードへのエッジ
    pub fn connections_to(&self, target: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.to == target)
    }

    /// ソースノードからのエッジ
    pub fn connections_from(&self, source: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.from == source)
    }

    pub fn connections_touching(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.touches(node))
    }
}
