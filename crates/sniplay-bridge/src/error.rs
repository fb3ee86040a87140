//! Error types for the bridge

use thiserror::Error;

/// Errors that can occur while bridging nodes
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Protocol or serial error from the node link
    #[error("Protocol error: {0}")]
    Protocol(#[from] sniplay_protocol::ProtocolError),

    /// IO error (sockets, log files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed capture log record
    #[error("Invalid capture record: {0}")]
    InvalidRecord(String),

    /// The node's serial port went away
    #[error("Node disconnected")]
    NodeDisconnected,

    /// The task feeding the node has stopped
    #[error("Node command channel closed")]
    ChannelClosed,
}
