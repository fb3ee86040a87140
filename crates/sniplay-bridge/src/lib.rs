//! Host-side wormhole tooling
//!
//! Relays frames captured by one node to a remote host over TCP, replays
//! them through another node, or tunnels a combined node's raw serial stream.

pub mod capture_log;
pub mod error;
pub mod filter;
pub mod net;
pub mod pump;
pub mod relay;
pub mod replay;
pub mod tunnel;

pub use capture_log::{CaptureLog, CaptureRecord, RawLog};
pub use error::BridgeError;
pub use filter::DuplicateFilter;
pub use pump::{pump_to_node, NodeCommand};
pub use relay::{CaptureRelay, RelayConfig};
pub use replay::{ReplayConfig, ReplayServer};
pub use tunnel::{Tunnel, TunnelConfig, TunnelMode};
