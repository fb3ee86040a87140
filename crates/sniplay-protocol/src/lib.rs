//! Sniplay serial link protocol
//!
//! This crate implements the serial protocol spoken between a host and a
//! promiscuous IEEE 802.15.4 capture/replay node: the uplink framing used to
//! relay captured frames, the downlink decoder that recovers injected frames
//! and radio commands, and the acknowledgment forgery policy.

pub mod downlink;
pub mod forge;
pub mod mac;
pub mod session;
pub mod transport;
pub mod types;
pub mod uplink;

pub use downlink::{DecoderState, Downlink, DownlinkDecoder, DownlinkEncoder, SequenceWindow};
pub use forge::{AckForgeryPolicy, VictimAddressSet};
pub use mac::{FrameType, MacAddress, MacHeader};
pub use session::{LinkSession, NodeConfig, NodeRole, Radio, SerialSink, SessionStats};
pub use transport::{NodeEvent, NodeTransport};
pub use types::*;
pub use uplink::{UplinkDecoder, UplinkFramer};
