//! Console - single writer over the graph
//!
//! ## Responsibilities
//! - Apply UI intents to the GraphStore (synchronously, atomically)
//! - Hand every successful mutation to the RoutingDispatcher
//! - Bump the revision so the persistence loop can debounce writes
//!
//! Engine calls never block a mutation and never roll one back.

use crate::config::ControlConfig;
use crate::device::{DeviceInventory, DeviceReconciler, Reconciliation, Transition};
use crate::engine::{CommandQueue, EngineCommand};
use crate::error::{GraphError, GraphResult};
use crate::graph::{
    Connection, ConnectionId, ConnectionPatch, ConnectionRequest, GraphStore, Node, NodeId,
    NodeRole, NodeSpec, PluginInstance, Position,
};
use crate::pairing::{MixerSource, StereoPairingResolver, TargetChannels};
use crate::routing::{
    FeedbackRule, ReplayPlan, ReplaySummary, RoutingDispatcher, SharedTransportRule,
};
use crate::state::{
    ConnectionRecord, MasterState, NodeRecord, SessionState, Viewport, STATE_VERSION,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Console shared between the UI thread and the background loops.
///
/// Locks are held only for synchronous work; nothing awaits with it held.
pub type SharedConsole = Arc<Mutex<Console>>;

/// What a state load did, before any engine work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub nodes: usize,
    pub connections: usize,
    pub unavailable: usize,
    pub skipped_nodes: usize,
    pub skipped_connections: usize,
    pub plan: ReplayPlan,
}

pub struct Console {
    store: GraphStore,
    dispatcher: RoutingDispatcher,
    master: MasterState,
    viewport: Viewport,
    io_buffer_size: u32,
    default_send_level: f64,
    revision: watch::Sender<u64>,
}

impl Console {
    pub fn new(queue: CommandQueue, feedback: Box<dyn FeedbackRule>) -> Self {
        let defaults = ControlConfig::default();
        let (revision, _) = watch::channel(0);
        Self {
            store: GraphStore::new(),
            dispatcher: RoutingDispatcher::new(queue, feedback),
            master: MasterState::default(),
            viewport: Viewport::default(),
            io_buffer_size: defaults.io_buffer_size,
            default_send_level: defaults.default_send_level,
            revision,
        }
    }

    pub fn from_config(queue: CommandQueue, config: &ControlConfig) -> Self {
        let rule = SharedTransportRule::new(config.feedback_transports.iter().cloned());
        let mut console = Self::new(queue, Box::new(rule));
        console.io_buffer_size = config.io_buffer_size;
        console.default_send_level = config.default_send_level;
        console
    }

    pub fn into_shared(self) -> SharedConsole {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Revision counter, bumped on every persisted change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn touch(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    fn bus_mut(&mut self, bus: NodeId) -> GraphResult<(&str, &mut Vec<PluginInstance>)> {
        let node = self
            .store
            .node_mut(bus)
            .ok_or(GraphError::NodeNotFound(bus))?;
        match &mut node.role {
            NodeRole::Bus(info) => Ok((info.bus_id.as_str(), &mut info.plugins)),
            _ => Err(GraphError::InvalidSpec(format!("node {} is not a bus", bus))),
        }
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// ノードを追加
    ///
    /// Adding a node whose logical identity already exists returns the
    /// existing node unchanged.
    pub fn add_node(&mut self, spec: NodeSpec) -> GraphResult<Node> {
        let node = spec.build()?;
        let stable_id = node.stable_id();
        if let Some(existing) = self.store.find_by_stable_id(&stable_id) {
            debug!(stable_id = %stable_id, "[console] add_node dedup");
            return Ok(existing.clone());
        }
        self.store.insert_node(node.clone())?;
        self.dispatcher.node_added(&node, &self.master);
        info!(node = %node.id, label = %node.label, kind = node.kind().as_str(), "[console] node added");
        self.touch();
        Ok(node)
    }

    /// ノードを削除 (関連する送りも削除)
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let (node, removed) = self.store.remove_node(id)?;
        self.dispatcher.node_removed(&self.store, &node, &removed);
        info!(
            node = %node.id,
            connections = removed.len(),
            "[console] node removed"
        );
        self.touch();
        Ok(node)
    }

    pub fn set_node_volume(&mut self, id: NodeId, volume: f64) -> GraphResult<()> {
        let node = self.store.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.volume = volume.clamp(0.0, 100.0);
        let node = node.clone();
        self.dispatcher.output_volume(&node, &self.master);
        self.touch();
        Ok(())
    }

    pub fn set_node_muted(&mut self, id: NodeId, muted: bool) -> GraphResult<()> {
        let node = self.store.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.muted = muted;
        let node = node.clone();
        self.dispatcher.output_volume(&node, &self.master);
        self.touch();
        Ok(())
    }

    pub fn set_node_label(&mut self, id: NodeId, label: impl Into<String>) -> GraphResult<()> {
        let node = self.store.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.label = label.into();
        self.touch();
        Ok(())
    }

    pub fn set_node_position(&mut self, id: NodeId, position: Position) -> GraphResult<()> {
        let node = self.store.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.position = position;
        self.touch();
        Ok(())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// New request at the configured default send level
    pub fn request(&self, from: NodeId, from_channel: u16, to: NodeId, to_channel: u16) -> ConnectionRequest {
        ConnectionRequest::new(from, from_channel, to, to_channel).level(self.default_send_level)
    }

    fn check_feedback(&self, request: &ConnectionRequest) -> GraphResult<()> {
        match (self.store.node(request.from), self.store.node(request.to)) {
            (Some(from), Some(to)) => self.dispatcher.check_route(from, to),
            // structural validation reports the unknown node
            _ => Ok(()),
        }
    }

    /// The connection already on this route, if any. Any other validation
    /// failure is an error.
    fn existing_route(&self, request: &ConnectionRequest) -> GraphResult<Option<Connection>> {
        match self.store.validate_route(&request.route_key()) {
            Ok(()) => Ok(None),
            Err(GraphError::DuplicateRoute(existing)) => self
                .store
                .connection(existing)
                .cloned()
                .map(Some)
                .ok_or(GraphError::ConnectionNotFound(existing)),
            Err(e) => Err(e),
        }
    }

    /// 接続を作成
    ///
    /// An identical route is a no-op and returns the existing connection.
    pub fn connect(&mut self, request: ConnectionRequest) -> GraphResult<Connection> {
        if let Some(existing) = self.existing_route(&request)? {
            debug!(connection = %existing.id, "[console] duplicate route ignored");
            return Ok(existing);
        }
        self.check_feedback(&request)?;

        let connection = self.store.add_connection(request)?;
        self.dispatcher.connection_added(&self.store, &connection);
        debug!(connection = %connection.id, "[console] connected");
        self.touch();
        Ok(connection)
    }

    /// Paired (stereo) gesture: `from_left`/`from_left + 1` onto
    /// `to_left`/`to_left + 1`, both or neither.
    ///
    /// Repeating the gesture is a no-op: halves that already exist are
    /// returned as they are and only a missing half is created.
    pub fn connect_stereo(
        &mut self,
        from: NodeId,
        from_left: u16,
        to: NodeId,
        to_left: u16,
        send_level: f64,
    ) -> GraphResult<(Connection, Connection)> {
        let left = ConnectionRequest::new(from, from_left, to, to_left)
            .level(send_level)
            .linked();
        let right = ConnectionRequest::new(
            from,
            from_left.saturating_add(1),
            to,
            to_left.saturating_add(1),
        )
        .level(send_level)
        .linked();
        self.check_feedback(&left)?;

        // validate both halves before touching the store
        let existing_left = self.existing_route(&left)?;
        let existing_right = self.existing_route(&right)?;

        let (left, right) = match (existing_left, existing_right) {
            (Some(l), Some(r)) => {
                debug!(left = %l.id, right = %r.id, "[console] duplicate stereo route ignored");
                return Ok((l, r));
            }
            (Some(l), None) => {
                let r = self.store.add_connection(right)?;
                self.dispatcher.connection_added(&self.store, &r);
                (l, r)
            }
            (None, Some(r)) => {
                let l = self.store.add_connection(left)?;
                self.dispatcher.connection_added(&self.store, &l);
                (l, r)
            }
            (None, None) => {
                let (l, r) = self.store.add_connection_pair(left, right)?;
                self.dispatcher.connection_added(&self.store, &l);
                self.dispatcher.connection_added(&self.store, &r);
                (l, r)
            }
        };
        self.touch();
        Ok((left, right))
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let connection = self.store.remove_connection(id)?;
        self.dispatcher.connection_removed(&self.store, &connection);
        debug!(connection = %id, "[console] disconnected");
        self.touch();
        Ok(connection)
    }

    pub fn update_connection(
        &mut self,
        id: ConnectionId,
        patch: ConnectionPatch,
    ) -> GraphResult<Connection> {
        if patch.is_empty() {
            return self
                .store
                .connection(id)
                .cloned()
                .ok_or(GraphError::ConnectionNotFound(id));
        }
        let connection = self.store.update_connection(id, patch)?;
        self.dispatcher.connection_updated(&self.store, &connection);
        self.touch();
        Ok(connection)
    }

    pub fn set_send_level(&mut self, id: ConnectionId, send_level: f64) -> GraphResult<Connection> {
        self.update_connection(id, ConnectionPatch::level(send_level))
    }

    pub fn set_send_muted(&mut self, id: ConnectionId, muted: bool) -> GraphResult<Connection> {
        self.update_connection(id, ConnectionPatch::mute(muted))
    }

    /// Update many send levels at once (fader drag on a linked pair, scene
    /// recall). Unknown ids are skipped; returns how many were applied.
    pub fn set_send_levels(&mut self, updates: &[(ConnectionId, f64)]) -> usize {
        let mut applied = 0;
        for &(id, level) in updates {
            match self.store.update_connection(id, ConnectionPatch::level(level)) {
                Ok(connection) => {
                    self.dispatcher.connection_updated(&self.store, &connection);
                    applied += 1;
                }
                Err(e) => debug!(error = %e, "[console] batch update skipped"),
            }
        }
        if applied > 0 {
            self.touch();
        }
        applied
    }

    /// Everything feeding a channel (or pair) of `target`, grouped.
    pub fn mixer_sources(&self, target: NodeId, channels: TargetChannels) -> Vec<MixerSource> {
        StereoPairingResolver::new(&self.store).resolve(target, channels)
    }

    // =========================================================================
    // Bus effects
    // =========================================================================

    pub fn add_plugin(
        &mut self,
        bus: NodeId,
        plugin_id: impl Into<String>,
        name: impl Into<String>,
    ) -> GraphResult<PluginInstance> {
        let plugin = PluginInstance::new(plugin_id, name);
        let (bus_id, plugins) = self.bus_mut(bus)?;
        let command = EngineCommand::AddEffect {
            bus_id: bus_id.to_string(),
            plugin_id: plugin.plugin_id.clone(),
            instance_id: plugin.instance_id.clone(),
        };
        plugins.push(plugin.clone());
        self.dispatcher.push(command);
        self.touch();
        Ok(plugin)
    }

    pub fn remove_plugin(&mut self, bus: NodeId, instance_id: &str) -> GraphResult<PluginInstance> {
        let (bus_id, plugins) = self.bus_mut(bus)?;
        let pos = plugins
            .iter()
            .position(|p| p.instance_id == instance_id)
            .ok_or_else(|| GraphError::PluginNotFound {
                node: bus,
                instance_id: instance_id.to_string(),
            })?;
        let command = EngineCommand::RemoveEffect {
            bus_id: bus_id.to_string(),
            instance_id: instance_id.to_string(),
        };
        let plugin = plugins.remove(pos);
        self.dispatcher.push(command);
        self.touch();
        Ok(plugin)
    }

    /// Reorder the effect chain. Ids not in the bus are ignored; effects not
    /// listed keep their relative order after the listed ones.
    pub fn reorder_plugins(&mut self, bus: NodeId, instance_ids: &[String]) -> GraphResult<()> {
        let (bus_id, plugins) = self.bus_mut(bus)?;
        let mut chain = Vec::with_capacity(plugins.len());
        for id in instance_ids {
            if let Some(pos) = plugins.iter().position(|p| &p.instance_id == id) {
                chain.push(plugins.remove(pos));
            }
        }
        chain.append(plugins);
        *plugins = chain;
        let command = EngineCommand::ReorderEffects {
            bus_id: bus_id.to_string(),
            instance_ids: plugins.iter().map(|p| p.instance_id.clone()).collect(),
        };
        self.dispatcher.push(command);
        self.touch();
        Ok(())
    }

    pub fn set_plugin_enabled(
        &mut self,
        bus: NodeId,
        instance_id: &str,
        enabled: bool,
    ) -> GraphResult<()> {
        let (bus_id, plugins) = self.bus_mut(bus)?;
        let plugin = plugins
            .iter_mut()
            .find(|p| p.instance_id == instance_id)
            .ok_or_else(|| GraphError::PluginNotFound {
                node: bus,
                instance_id: instance_id.to_string(),
            })?;
        plugin.enabled = enabled;
        let command = EngineCommand::SetEffectEnabled {
            bus_id: bus_id.to_string(),
            instance_id: instance_id.to_string(),
            enabled,
        };
        self.dispatcher.push(command);
        self.touch();
        Ok(())
    }

    /// Store opaque plugin state for persistence. No engine call.
    pub fn set_plugin_state(
        &mut self,
        bus: NodeId,
        instance_id: &str,
        state: Option<Vec<u8>>,
    ) -> GraphResult<()> {
        let (_, plugins) = self.bus_mut(bus)?;
        let plugin = plugins
            .iter_mut()
            .find(|p| p.instance_id == instance_id)
            .ok_or_else(|| GraphError::PluginNotFound {
                node: bus,
                instance_id: instance_id.to_string(),
            })?;
        plugin.state = state;
        self.touch();
        Ok(())
    }

    // =========================================================================
    // Master / view
    // =========================================================================

    pub fn master(&self) -> MasterState {
        self.master
    }

    /// マスターフェーダー: applies to every available sink
    pub fn set_master(&mut self, master: MasterState) {
        self.master = MasterState {
            volume: master.volume.clamp(0.0, 100.0),
            muted: master.muted,
        };
        for node in self.store.nodes() {
            self.dispatcher.output_volume(node, &self.master);
        }
        self.touch();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.touch();
    }

    pub fn io_buffer_size(&self) -> u32 {
        self.io_buffer_size
    }

    pub fn set_io_buffer_size(&mut self, size: u32) {
        self.io_buffer_size = size;
        self.touch();
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Bring device-bound nodes in line with a fresh inventory.
    ///
    /// Every binding is settled first; sends are re-issued afterwards from
    /// the bindings the nodes had before the pass, so two ends of a send
    /// moving together are handled as one move.
    pub fn reconcile(&mut self, inventory: &DeviceInventory) -> Vec<Reconciliation> {
        let applied = DeviceReconciler::new(inventory).reconcile(&mut self.store);
        let mut recovered = HashSet::new();
        let mut rebound = HashMap::new();
        for change in &applied {
            let Some(node) = self.store.node(change.node) else {
                continue;
            };
            match &change.transition {
                Transition::Recovered => {
                    self.dispatcher.resume_device(node, &self.master);
                    recovered.insert(node.id);
                }
                Transition::Rebound { previous, .. } => {
                    self.dispatcher.resume_device(node, &self.master);
                    rebound.insert(node.id, previous.clone());
                }
                // sends stay in the graph, the engine has already dropped them
                Transition::Lost => {}
            }
        }
        if !recovered.is_empty() || !rebound.is_empty() {
            self.dispatcher.reissue_sends(&self.store, &recovered, &rebound);
        }
        if !rebound.is_empty() {
            // the new device id has to survive a restart
            self.touch();
        }
        applied
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Hand a replay plan to the command queue, behind everything queued so
    /// far. Returns the plan when no worker is running.
    pub fn queue_replay(
        &self,
        plan: ReplayPlan,
    ) -> Result<oneshot::Receiver<ReplaySummary>, ReplayPlan> {
        self.dispatcher.queue_replay(plan)
    }

    pub fn snapshot(&self) -> SessionState {
        SessionState {
            version: STATE_VERSION,
            io_buffer_size: self.io_buffer_size,
            nodes: self.store.nodes().map(NodeRecord::from).collect(),
            connections: self
                .store
                .connections()
                .iter()
                .map(ConnectionRecord::from)
                .collect(),
            viewport: self.viewport,
            master: self.master,
        }
    }

    /// Replace the graph with a saved state.
    ///
    /// Availability is settled against `inventory` before each node goes in,
    /// so the returned plan never starts I/O on, or sends to, a missing
    /// device. Bad records are skipped and logged; the rest load. Saved
    /// routes the feedback rule now refuses count as bad records.
    pub fn load(&mut self, state: SessionState, inventory: &DeviceInventory) -> LoadReport {
        let reconciler = DeviceReconciler::new(inventory);
        let mut store = GraphStore::new();
        let mut report = LoadReport::default();

        for record in state.nodes {
            let mut node = record.into_node();
            if let Some(transition) = reconciler.settle(&mut node) {
                debug!(node = %node.label, ?transition, "[console] settled on load");
            }
            if node.is_device_bound() && !node.available {
                report.unavailable += 1;
            }
            let stable_id = node.stable_id();
            if store.find_by_stable_id(&stable_id).is_some() {
                warn!(stable_id = %stable_id, "[console] duplicate node in saved state skipped");
                report.skipped_nodes += 1;
                continue;
            }
            match store.insert_node(node) {
                Ok(()) => report.nodes += 1,
                Err(e) => {
                    warn!(error = %e, "[console] saved node skipped");
                    report.skipped_nodes += 1;
                }
            }
        }

        for record in state.connections {
            let connection: Connection = record.into();
            let refused = store
                .node(connection.from)
                .zip(store.node(connection.to))
                .map(|(from, to)| self.dispatcher.check_route(from, to))
                .and_then(Result::err);
            if let Some(e) = refused {
                warn!(connection = %connection.id, error = %e, "[console] saved connection skipped");
                report.skipped_connections += 1;
                continue;
            }
            match store.insert_connection(connection) {
                Ok(()) => report.connections += 1,
                Err(e) => {
                    warn!(error = %e, "[console] saved connection skipped");
                    report.skipped_connections += 1;
                }
            }
        }

        self.store = store;
        self.master = state.master;
        self.viewport = state.viewport;
        self.io_buffer_size = state.io_buffer_size;
        report.plan = self.dispatcher.replay_plan(&self.store, &self.master);
        info!(
            nodes = report.nodes,
            connections = report.connections,
            unavailable = report.unavailable,
            "[console] state loaded"
        );
        self.touch();
        report
    }
}
