//! Forwarding queued commands to a node

use bytes::Bytes;
use sniplay_protocol::{LinkFrame, NodeTransport, ProtocolError, RadioCommand};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something to hand to the node's serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    /// Transmit a frame
    Inject(LinkFrame),
    /// Change radio power
    Radio(RadioCommand),
    /// Pass bytes through untouched
    Raw(Bytes),
}

/// Drain `rx` into the node until the channel closes or the node goes away.
///
/// A failed write skips that command only.
pub async fn pump_to_node(transport: Arc<NodeTransport>, mut rx: mpsc::Receiver<NodeCommand>) {
    while let Some(command) = rx.recv().await {
        let result = match &command {
            NodeCommand::Inject(frame) => transport.inject(frame).await,
            NodeCommand::Radio(radio) => transport.set_radio(*radio).await,
            NodeCommand::Raw(data) => transport.send_raw(data.clone()).await,
        };

        match result {
            Ok(()) => {}
            Err(ProtocolError::NotConnected) => {
                tracing::warn!("Node disconnected, stopping forwarder");
                break;
            }
            Err(e) => tracing::warn!("Error writing to node, skipping {:?}: {}", command, e),
        }
    }
    tracing::debug!("Node forwarder shutting down");
}
