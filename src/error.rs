//! Error types

use crate::graph::{ConnectionId, NodeId};
use std::fmt;

/// グラフ操作のエラー
///
/// Structural violations are synchronous and leave the graph untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("invalid node spec: {0}")]
    InvalidSpec(String),

    #[error("invalid route: {0}")]
    InvalidRoute(RouteRejection),

    /// An identical (from, fromCh, to, toCh) tuple already exists.
    /// Callers treat this as a no-op rather than a failure.
    #[error("route already exists as connection {0}")]
    DuplicateRoute(ConnectionId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("plugin instance {instance_id} not found on bus node {node}")]
    PluginNotFound { node: NodeId, instance_id: String },
}

impl GraphError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, GraphError::DuplicateRoute(_))
    }
}

/// Which connection invariant a rejected route violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRejection {
    SelfRoute,
    UnknownNode,
    SinkAsSource,
    SourceAsTarget,
    FromChannelOutOfRange { channel: u16, channel_count: u16 },
    ToChannelOutOfRange { channel: u16, channel_count: u16 },
    FeedbackLoop,
}

impl fmt::Display for RouteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteRejection::SelfRoute => write!(f, "a node cannot send to itself"),
            RouteRejection::UnknownNode => write!(f, "endpoint node does not exist"),
            RouteRejection::SinkAsSource => write!(f, "sink nodes have no outputs"),
            RouteRejection::SourceAsTarget => write!(f, "source nodes have no inputs"),
            RouteRejection::FromChannelOutOfRange {
                channel,
                channel_count,
            } => write!(
                f,
                "from channel {} out of range (node has {} channels)",
                channel, channel_count
            ),
            RouteRejection::ToChannelOutOfRange {
                channel,
                channel_count,
            } => write!(
                f,
                "to channel {} out of range (node has {} channels)",
                channel, channel_count
            ),
            RouteRejection::FeedbackLoop => {
                write!(f, "target shares the origin's channel multiplexer")
            }
        }
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// 外部オーディオエンジン呼び出しのエラー
///
/// Logged by the caller; the local graph is never rolled back.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine call `{command}` failed: {reason}")]
    CallFailed { command: String, reason: String },

    #[error("engine channel is disconnected")]
    Disconnected,

    #[error("engine does not support `{0}`")]
    Unsupported(&'static str),
}

impl EngineError {
    pub fn call_failed(command: impl Into<String>, reason: impl fmt::Display) -> Self {
        EngineError::CallFailed {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error type for state storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Could not determine state file path")]
    NoPath,
}

/// Error type for snapshot/restore.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state has already been restored in this process")]
    AlreadyRestored,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unsupported state version {0}")]
    UnsupportedVersion(u32),
}
