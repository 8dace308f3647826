//! Routing Graph - sources → buses → sinks connected by sends
//!
//! すべてのレベル制御は Connection (Send) で行う。

mod connection;
mod node;
mod store;

pub use connection::{Connection, ConnectionId, ConnectionPatch, ConnectionRequest, RouteKey};
pub use node::{
    BusInfo, ChannelMode, DeviceBinding, Node, NodeId, NodeKind, NodeRole, NodeSpec,
    PluginInstance, Position, SinkBinding, SourceBinding, SourceKind,
};
pub use store::GraphStore;
