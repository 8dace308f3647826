//! Routing Dispatcher - graph mutations → engine commands
//!
//! ## Responsibilities
//! - Map a connection onto one of the four engine send shapes
//! - Keep bus registration ahead of every send that references the bus
//! - Tear down sends before the bus they touch
//! - Refuse routes the feedback rule flags
//!
//! ## This module does NOT:
//! - Own graph state (that's `graph::GraphStore`)
//! - Wait for the engine (commands are queued, see `engine::CommandQueue`)

use crate::engine::{CommandQueue, Engine, EngineCommand};
use crate::error::{GraphError, GraphResult, RouteRejection};
use crate::gain::fader_to_gain;
use crate::graph::{Connection, DeviceBinding, GraphStore, Node, NodeId, NodeRole};
use crate::state::MasterState;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::oneshot;
use tracing::{debug, info};

// =============================================================================
// Send shapes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteShape {
    /// Input device channel → output device channel
    InputToOutput,
    /// Input device channel → bus input
    InputToBus,
    /// Bus output → bus input (chaining)
    BusToBus,
    /// Bus output → output device channel
    BusToOutput,
}

/// A send as the engine addresses it: (deviceOrBusId, channel) endpoints.
///
/// Channels are engine channels, i.e. node ports with the node's channel
/// offset applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SendRoute {
    InputToOutput {
        input: u32,
        input_channel: u32,
        output: u32,
        output_channel: u32,
    },
    InputToBus {
        input: u32,
        input_channel: u32,
        bus_id: String,
        bus_channel: u32,
    },
    BusToBus {
        from_bus: String,
        from_channel: u32,
        to_bus: String,
        to_channel: u32,
    },
    BusToOutput {
        bus_id: String,
        bus_channel: u32,
        output: u32,
        output_channel: u32,
    },
}

impl SendRoute {
    /// Route between two nodes, or `None` for a direction the graph forbids.
    pub fn between(from: &Node, from_channel: u16, to: &Node, to_channel: u16) -> Option<Self> {
        let src_ch = from.engine_channel(from_channel);
        let dst_ch = to.engine_channel(to_channel);
        match (&from.role, &to.role) {
            (NodeRole::Source(src), NodeRole::Sink(sink)) => Some(SendRoute::InputToOutput {
                input: src.device.device_id,
                input_channel: src_ch,
                output: sink.device.device_id,
                output_channel: dst_ch,
            }),
            (NodeRole::Source(src), NodeRole::Bus(bus)) => Some(SendRoute::InputToBus {
                input: src.device.device_id,
                input_channel: src_ch,
                bus_id: bus.bus_id.clone(),
                bus_channel: dst_ch,
            }),
            (NodeRole::Bus(a), NodeRole::Bus(b)) => Some(SendRoute::BusToBus {
                from_bus: a.bus_id.clone(),
                from_channel: src_ch,
                to_bus: b.bus_id.clone(),
                to_channel: dst_ch,
            }),
            (NodeRole::Bus(bus), NodeRole::Sink(sink)) => Some(SendRoute::BusToOutput {
                bus_id: bus.bus_id.clone(),
                bus_channel: src_ch,
                output: sink.device.device_id,
                output_channel: dst_ch,
            }),
            _ => None,
        }
    }

    pub fn shape(&self) -> RouteShape {
        match self {
            SendRoute::InputToOutput { .. } => RouteShape::InputToOutput,
            SendRoute::InputToBus { .. } => RouteShape::InputToBus,
            SendRoute::BusToBus { .. } => RouteShape::BusToBus,
            SendRoute::BusToOutput { .. } => RouteShape::BusToOutput,
        }
    }

    pub fn references_bus(&self, bus_id: &str) -> bool {
        match self {
            SendRoute::InputToOutput { .. } => false,
            SendRoute::InputToBus { bus_id: b, .. } | SendRoute::BusToOutput { bus_id: b, .. } => {
                b == bus_id
            }
            SendRoute::BusToBus {
                from_bus, to_bus, ..
            } => from_bus == bus_id || to_bus == bus_id,
        }
    }
}

impl fmt::Display for SendRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendRoute::InputToOutput {
                input,
                input_channel,
                output,
                output_channel,
            } => write!(f, "in{}:{} -> out{}:{}", input, input_channel, output, output_channel),
            SendRoute::InputToBus {
                input,
                input_channel,
                bus_id,
                bus_channel,
            } => write!(f, "in{}:{} -> {}:{}", input, input_channel, bus_id, bus_channel),
            SendRoute::BusToBus {
                from_bus,
                from_channel,
                to_bus,
                to_channel,
            } => write!(f, "{}:{} -> {}:{}", from_bus, from_channel, to_bus, to_channel),
            SendRoute::BusToOutput {
                bus_id,
                bus_channel,
                output,
                output_channel,
            } => write!(f, "{}:{} -> out{}:{}", bus_id, bus_channel, output, output_channel),
        }
    }
}

// =============================================================================
// Feedback prevention
// =============================================================================

/// Predicate over node metadata deciding whether `from → to` would feed a
/// channel multiplexer back into itself.
pub trait FeedbackRule: Send + Sync {
    fn is_feedback(&self, from: &Node, to: &Node) -> bool;
}

impl<F> FeedbackRule for F
where
    F: Fn(&Node, &Node) -> bool + Send + Sync,
{
    fn is_feedback(&self, from: &Node, to: &Node) -> bool {
        self(from, to)
    }
}

/// Flags a source → sink route when both devices use the same transport and
/// that transport is one of the configured shared multiplexers (e.g. the
/// virtual loopback device apps play into).
#[derive(Debug, Clone, Default)]
pub struct SharedTransportRule {
    transports: Vec<String>,
}

impl SharedTransportRule {
    pub fn new<I, S>(transports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transports: transports.into_iter().map(Into::into).collect(),
        }
    }

    fn is_shared(&self, transport: &str) -> bool {
        self.transports
            .iter()
            .any(|t| t.eq_ignore_ascii_case(transport))
    }
}

impl FeedbackRule for SharedTransportRule {
    fn is_feedback(&self, from: &Node, to: &Node) -> bool {
        let (NodeRole::Source(src), NodeRole::Sink(sink)) = (&from.role, &to.role) else {
            return false;
        };
        src.device.transport.eq_ignore_ascii_case(&sink.device.transport)
            && self.is_shared(&src.device.transport)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Effective master output gain for a sink: node fader × master fader.
pub fn output_gain(node: &Node, master: &MasterState) -> f32 {
    if node.muted || master.muted {
        0.0
    } else {
        fader_to_gain(node.volume) * fader_to_gain(master.volume)
    }
}

fn send_gain(connection: &Connection) -> f32 {
    fader_to_gain(connection.send_level)
}

pub struct RoutingDispatcher {
    queue: CommandQueue,
    feedback: Box<dyn FeedbackRule>,
}

impl RoutingDispatcher {
    pub fn new(queue: CommandQueue, feedback: Box<dyn FeedbackRule>) -> Self {
        Self { queue, feedback }
    }

    pub fn push(&self, command: EngineCommand) {
        self.queue.push(command);
    }

    /// Queue a replay as one unit, see [`CommandQueue::replay`].
    pub fn queue_replay(
        &self,
        plan: ReplayPlan,
    ) -> Result<oneshot::Receiver<ReplaySummary>, ReplayPlan> {
        self.queue.replay(plan)
    }

    /// Refuse a wire-draw that would loop a multiplexer into itself.
    pub fn check_route(&self, from: &Node, to: &Node) -> GraphResult<()> {
        if self.feedback.is_feedback(from, to) {
            info!(from = %from.label, to = %to.label, "[routing] refused feedback route");
            return Err(GraphError::InvalidRoute(RouteRejection::FeedbackLoop));
        }
        Ok(())
    }

    /// Register a new node with the engine.
    pub fn node_added(&self, node: &Node, master: &MasterState) {
        match &node.role {
            NodeRole::Bus(bus) => {
                for command in bus_registration(&bus.bus_id, node) {
                    self.push(command);
                }
            }
            NodeRole::Source(_) | NodeRole::Sink(_) => {
                if node.available {
                    self.resume_device(node, master);
                }
            }
        }
    }

    /// Start capture/output for a device node and reapply its stored volume.
    pub fn resume_device(&self, node: &Node, master: &MasterState) {
        match &node.role {
            NodeRole::Source(src) => self.push(EngineCommand::StartCapture {
                device_id: src.device.device_id,
            }),
            NodeRole::Sink(sink) => {
                self.push(EngineCommand::StartOutput {
                    device_id: sink.device.device_id,
                });
                self.push(EngineCommand::SetOutputVolume {
                    device_id: sink.device.device_id,
                    gain: output_gain(node, master),
                });
            }
            NodeRole::Bus(_) => {}
        }
    }

    /// Push the effective output level of a sink.
    pub fn output_volume(&self, node: &Node, master: &MasterState) {
        if let NodeRole::Sink(sink) = &node.role {
            if node.available {
                self.push(EngineCommand::SetOutputVolume {
                    device_id: sink.device.device_id,
                    gain: output_gain(node, master),
                });
            }
        }
    }

    /// Tear down a removed node: every send first, then the bus itself,
    /// then device I/O nobody else uses.
    ///
    /// `store` is the graph after removal; `node` is no longer in it.
    pub fn node_removed(&self, store: &GraphStore, node: &Node, removed: &[Connection]) {
        for connection in removed {
            if let Some(route) = route_with(store, connection, node) {
                self.push(EngineCommand::RemoveSend { route });
            }
        }

        match &node.role {
            NodeRole::Bus(bus) => self.push(EngineCommand::RemoveBus {
                bus_id: bus.bus_id.clone(),
            }),
            NodeRole::Source(src) => {
                if !device_in_use(store, &src.device, true) {
                    self.push(EngineCommand::StopCapture {
                        device_id: src.device.device_id,
                    });
                }
            }
            NodeRole::Sink(sink) => {
                if !device_in_use(store, &sink.device, false) {
                    self.push(EngineCommand::StopOutput {
                        device_id: sink.device.device_id,
                    });
                }
            }
        }
    }

    /// Issue a new send, unless an endpoint is currently unavailable.
    pub fn connection_added(&self, store: &GraphStore, connection: &Connection) {
        if let Some(route) = live_route(store, connection) {
            self.push(EngineCommand::AddSend {
                route,
                gain: send_gain(connection),
                muted: connection.muted,
            });
        }
    }

    pub fn connection_updated(&self, store: &GraphStore, connection: &Connection) {
        if let Some(route) = live_route(store, connection) {
            self.push(EngineCommand::UpdateSend {
                route,
                gain: send_gain(connection),
                muted: connection.muted,
            });
        }
    }

    /// `connection` has already left the store; its endpoints have not.
    pub fn connection_removed(&self, store: &GraphStore, connection: &Connection) {
        let route = store.node(connection.from).zip(store.node(connection.to)).and_then(
            |(from, to)| SendRoute::between(from, connection.from_channel, to, connection.to_channel),
        );
        if let Some(route) = route {
            self.push(EngineCommand::RemoveSend { route });
        }
    }

    /// Re-issue the sends of nodes that came back in one inventory pass,
    /// each connection once.
    ///
    /// `recovered` nodes returned under their old device id. `rebound` maps
    /// each rebound node to the binding it had before the pass; a send
    /// touching one is removed under its old endpoint pair (both ends at
    /// their old ids) and added under the current one. Sends to a peer that
    /// is still unavailable stay deferred.
    ///
    /// Best effort: each remove/add is an independent engine call.
    pub fn reissue_sends(
        &self,
        store: &GraphStore,
        recovered: &HashSet<NodeId>,
        rebound: &HashMap<NodeId, DeviceBinding>,
    ) {
        for connection in store.connections() {
            let moved =
                rebound.contains_key(&connection.from) || rebound.contains_key(&connection.to);
            let returned =
                recovered.contains(&connection.from) || recovered.contains(&connection.to);
            if !moved && !returned {
                continue;
            }
            if moved {
                if let Some(route) = previous_route(store, connection, rebound) {
                    self.push(EngineCommand::RemoveSend { route });
                }
            }
            self.connection_added(store, connection);
        }
    }

    /// Everything needed to bring a fresh engine in line with `store`.
    pub fn replay_plan(&self, store: &GraphStore, master: &MasterState) -> ReplayPlan {
        let mut plan = ReplayPlan::default();
        let mut captures = HashSet::new();
        let mut outputs = HashSet::new();

        for node in store.nodes() {
            match &node.role {
                NodeRole::Bus(bus) => plan.buses.push(bus_registration(&bus.bus_id, node)),
                NodeRole::Source(src) if node.available => {
                    if captures.insert(src.device.device_id) {
                        plan.io.push(EngineCommand::StartCapture {
                            device_id: src.device.device_id,
                        });
                    }
                }
                NodeRole::Sink(sink) if node.available => {
                    if outputs.insert(sink.device.device_id) {
                        plan.io.push(EngineCommand::StartOutput {
                            device_id: sink.device.device_id,
                        });
                    }
                    plan.io.push(EngineCommand::SetOutputVolume {
                        device_id: sink.device.device_id,
                        gain: output_gain(node, master),
                    });
                }
                _ => {}
            }
        }

        for connection in store.connections() {
            if let Some(route) = live_route(store, connection) {
                plan.sends.push(EngineCommand::AddSend {
                    route,
                    gain: send_gain(connection),
                    muted: connection.muted,
                });
            }
        }

        debug!(
            buses = plan.buses.len(),
            io = plan.io.len(),
            sends = plan.sends.len(),
            "[routing] replay plan"
        );
        plan
    }
}

fn bus_registration(bus_id: &str, node: &Node) -> Vec<EngineCommand> {
    let mut commands = vec![EngineCommand::AddBus {
        bus_id: bus_id.to_string(),
        channel_count: node.channel_count,
    }];
    for plugin in node.plugins() {
        commands.push(EngineCommand::AddEffect {
            bus_id: bus_id.to_string(),
            plugin_id: plugin.plugin_id.clone(),
            instance_id: plugin.instance_id.clone(),
        });
        if !plugin.enabled {
            commands.push(EngineCommand::SetEffectEnabled {
                bus_id: bus_id.to_string(),
                instance_id: plugin.instance_id.clone(),
                enabled: false,
            });
        }
    }
    commands
}

/// Route for `connection` with `node` standing in for its endpoint of the
/// same id (which may be absent from or stale in the store).
fn route_with(store: &GraphStore, connection: &Connection, node: &Node) -> Option<SendRoute> {
    let pick = |id| {
        if id == node.id {
            Some(node)
        } else {
            store.node(id)
        }
    };
    let from = pick(connection.from)?;
    let to = pick(connection.to)?;
    SendRoute::between(from, connection.from_channel, to, connection.to_channel)
}

/// Route `connection` had before the nodes in `rebound` moved devices.
fn previous_route(
    store: &GraphStore,
    connection: &Connection,
    rebound: &HashMap<NodeId, DeviceBinding>,
) -> Option<SendRoute> {
    let before = |id: NodeId| {
        let mut node = store.node(id)?.clone();
        if let (Some(old), Some(device)) = (rebound.get(&id), node.device_mut()) {
            *device = old.clone();
        }
        Some(node)
    };
    let from = before(connection.from)?;
    let to = before(connection.to)?;
    SendRoute::between(&from, connection.from_channel, &to, connection.to_channel)
}

/// Route for a connection whose endpoints are both available.
fn live_route(store: &GraphStore, connection: &Connection) -> Option<SendRoute> {
    let from = store.node(connection.from)?;
    let to = store.node(connection.to)?;
    if !from.available || !to.available {
        debug!(connection = %connection.id, "[routing] endpoint unavailable, send deferred");
        return None;
    }
    SendRoute::between(from, connection.from_channel, to, connection.to_channel)
}

fn device_in_use(store: &GraphStore, device: &DeviceBinding, input: bool) -> bool {
    store.nodes().any(|n| match &n.role {
        NodeRole::Source(src) if input => src.device.device_id == device.device_id,
        NodeRole::Sink(sink) if !input => sink.device.device_id == device.device_id,
        _ => false,
    })
}

// =============================================================================
// Bulk replay
// =============================================================================

/// Ordered engine work for a restore: bus registration, then device I/O,
/// then sends. Sends against an unregistered bus fail silently in the
/// engine, so the phases never interleave.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayPlan {
    /// One command list per bus: registration followed by its effect chain
    pub buses: Vec<Vec<EngineCommand>>,
    pub io: Vec<EngineCommand>,
    pub sends: Vec<EngineCommand>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub buses_registered: usize,
    pub buses_failed: usize,
    pub io_started: usize,
    pub io_failed: usize,
    pub sends_issued: usize,
    pub sends_failed: usize,
}

impl ReplayPlan {
    /// All commands in execution-phase order.
    pub fn commands(&self) -> impl Iterator<Item = &EngineCommand> {
        self.buses.iter().flatten().chain(&self.io).chain(&self.sends)
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty() && self.io.is_empty() && self.sends.is_empty()
    }

    /// Run the plan. Bus registrations run concurrently and are all awaited
    /// before any I/O or send is issued. Failures are logged, not retried.
    pub async fn execute(&self, engine: &dyn Engine) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        let registered = join_all(self.buses.iter().map(|commands| async move {
            let mut ok = true;
            for command in commands {
                ok &= command.execute_logged(engine).await;
            }
            ok
        }))
        .await;
        for ok in registered {
            if ok {
                summary.buses_registered += 1;
            } else {
                summary.buses_failed += 1;
            }
        }

        for command in &self.io {
            if command.execute_logged(engine).await {
                summary.io_started += 1;
            } else {
                summary.io_failed += 1;
            }
        }

        for command in &self.sends {
            if command.execute_logged(engine).await {
                summary.sends_issued += 1;
            } else {
                summary.sends_failed += 1;
            }
        }

        info!(?summary, "[routing] replay finished");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command_channel;
    use crate::graph::{ConnectionRequest, NodeSpec};

    fn prism() -> DeviceBinding {
        DeviceBinding::new(1, "Prism", "Virtual")
    }

    #[test]
    fn test_route_shapes() {
        let mut store = GraphStore::new();
        let src = store
            .add_node(NodeSpec::channel_feed(prism(), 4, 2))
            .unwrap();
        let bus_a = store.add_node(NodeSpec::bus("A", 2).with_bus_id("bus_a")).unwrap();
        let bus_b = store.add_node(NodeSpec::bus("B", 2).with_bus_id("bus_b")).unwrap();
        let sink = store
            .add_node(NodeSpec::sink(DeviceBinding::new(7, "Speakers", "Built-In"), 2, 2))
            .unwrap();

        let route = SendRoute::between(&src, 1, &sink, 0).unwrap();
        assert_eq!(route.shape(), RouteShape::InputToOutput);
        assert_eq!(
            route,
            SendRoute::InputToOutput {
                input: 1,
                input_channel: 5,
                output: 7,
                output_channel: 2,
            }
        );
        assert_eq!(
            SendRoute::between(&src, 0, &bus_a, 0).unwrap().shape(),
            RouteShape::InputToBus
        );
        let chain = SendRoute::between(&bus_a, 0, &bus_b, 1).unwrap();
        assert_eq!(chain.shape(), RouteShape::BusToBus);
        assert!(chain.references_bus("bus_a") && chain.references_bus("bus_b"));
        assert_eq!(
            SendRoute::between(&bus_b, 1, &sink, 1).unwrap().shape(),
            RouteShape::BusToOutput
        );
        assert!(SendRoute::between(&sink, 0, &bus_a, 0).is_none());
    }

    #[test]
    fn test_shared_transport_rule() {
        let rule = SharedTransportRule::new(["Virtual"]);
        let feed = NodeSpec::channel_feed(prism(), 0, 2).build().unwrap();
        let loopback = NodeSpec::sink(DeviceBinding::new(1, "Prism", "virtual"), 0, 2)
            .build()
            .unwrap();
        let speakers = NodeSpec::sink(DeviceBinding::new(7, "Speakers", "Built-In"), 0, 2)
            .build()
            .unwrap();
        assert!(rule.is_feedback(&feed, &loopback));
        assert!(!rule.is_feedback(&feed, &speakers));

        let usb_in = NodeSpec::device_source(DeviceBinding::new(3, "Mic", "USB"), 1)
            .build()
            .unwrap();
        let usb_out = NodeSpec::sink(DeviceBinding::new(4, "Headset", "USB"), 0, 2)
            .build()
            .unwrap();
        // USB is not configured as a multiplexer
        assert!(!rule.is_feedback(&usb_in, &usb_out));
    }

    #[test]
    fn test_closure_rule() {
        let (queue, _worker) = command_channel();
        let dispatcher =
            RoutingDispatcher::new(queue, Box::new(|from: &Node, to: &Node| from.label == to.label));
        let a = NodeSpec::bus("Same", 2).build().unwrap();
        let b = NodeSpec::bus("Same", 2).build().unwrap();
        assert_eq!(
            dispatcher.check_route(&a, &b),
            Err(GraphError::InvalidRoute(RouteRejection::FeedbackLoop))
        );
    }

    #[test]
    fn test_bus_removal_tears_down_sends_first() {
        let (queue, mut worker) = command_channel();
        let dispatcher = RoutingDispatcher::new(queue, Box::new(SharedTransportRule::default()));
        let mut store = GraphStore::new();
        let src = store.add_node(NodeSpec::channel_feed(prism(), 0, 2)).unwrap();
        let bus = store.add_node(NodeSpec::bus("FX", 2).with_bus_id("bus_fx")).unwrap();
        store
            .add_connection(ConnectionRequest::new(src.id, 0, bus.id, 0))
            .unwrap();
        store
            .add_connection(ConnectionRequest::new(src.id, 1, bus.id, 1))
            .unwrap();

        let (node, removed) = store.remove_node(bus.id).unwrap();
        dispatcher.node_removed(&store, &node, &removed);

        let commands = worker.drain();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], EngineCommand::RemoveSend { .. }));
        assert!(matches!(commands[1], EngineCommand::RemoveSend { .. }));
        assert_eq!(
            commands[2],
            EngineCommand::RemoveBus {
                bus_id: "bus_fx".into()
            }
        );
    }

    #[test]
    fn test_replay_plan_orders_phases() {
        let (queue, _worker) = command_channel();
        let dispatcher = RoutingDispatcher::new(queue, Box::new(SharedTransportRule::default()));
        let mut store = GraphStore::new();
        let sink = store
            .add_node(NodeSpec::sink(DeviceBinding::new(7, "Speakers", "Built-In"), 0, 2))
            .unwrap();
        let bus = store.add_node(NodeSpec::bus("FX", 2)).unwrap();
        let src = store.add_node(NodeSpec::channel_feed(prism(), 0, 2)).unwrap();
        store
            .add_connection(ConnectionRequest::new(bus.id, 0, sink.id, 0))
            .unwrap();
        store
            .add_connection(ConnectionRequest::new(src.id, 0, bus.id, 0))
            .unwrap();

        let plan = dispatcher.replay_plan(&store, &MasterState::default());
        let kinds: Vec<_> = plan
            .commands()
            .map(|c| match c {
                EngineCommand::AddBus { .. } => 0,
                EngineCommand::StartOutput { .. }
                | EngineCommand::StartCapture { .. }
                | EngineCommand::SetOutputVolume { .. } => 1,
                EngineCommand::AddSend { .. } => 2,
                _ => 9,
            })
            .collect();
        assert_eq!(kinds, vec![0, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_unavailable_endpoint_defers_send() {
        let (queue, mut worker) = command_channel();
        let dispatcher = RoutingDispatcher::new(queue, Box::new(SharedTransportRule::default()));
        let mut store = GraphStore::new();
        let src = store.add_node(NodeSpec::channel_feed(prism(), 0, 2)).unwrap();
        let sink = store
            .add_node(NodeSpec::sink(DeviceBinding::new(7, "Speakers", "Built-In"), 0, 2))
            .unwrap();
        store.node_mut(sink.id).unwrap().available = false;
        let conn = store
            .add_connection(ConnectionRequest::new(src.id, 0, sink.id, 0))
            .unwrap();

        dispatcher.connection_added(&store, &conn);
        assert!(worker.drain().is_empty());
    }
}
