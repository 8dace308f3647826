//! Spectrum - routing graph control plane
//!
//! Client-side model of a per-channel mixing console: sources, buses and
//! sinks joined by sends. The audio engine does the signal processing; this
//! crate owns the graph, keeps it in step with the device inventory, turns
//! graph edits into engine commands and persists the session.
//!
//! ```text
//! UI intent → Console → GraphStore (sync)
//!                     → RoutingDispatcher → CommandQueue → Engine (async, FIFO)
//! inventory poll → DeviceReconciler → Console
//! meter poll → MeterSnapshot (ArcSwap)
//! revision → autosave (debounced) → Storage
//! ```

pub mod config;
pub mod console;
pub mod device;
pub mod engine;
pub mod error;
pub mod gain;
pub mod graph;
pub mod logging;
pub mod meters;
pub mod pairing;
pub mod poll;
pub mod routing;
pub mod session;
pub mod state;

pub use console::{Console, SharedConsole};
pub use error::{EngineError, GraphError, RouteRejection, StateError, StorageError};
pub use graph::{ConnectionRequest, GraphStore, NodeSpec};
pub use session::Session;
