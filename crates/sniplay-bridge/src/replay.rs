//! Replay server - the transmitting end of a wormhole
//!
//! Accepts one relay at a time and turns the frames it sends into injection
//! commands for the local node.

use crate::error::BridgeError;
use crate::filter::{DuplicateFilter, REPLAYER_MIN_INTERVAL};
use crate::pump::NodeCommand;
use crate::relay::DEFAULT_FORWARD_DELAY;
use sniplay_protocol::{Downlink, DownlinkDecoder};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Replay server configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub forward_delay: Duration,
    pub min_interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            forward_delay: DEFAULT_FORWARD_DELAY,
            min_interval: REPLAYER_MIN_INTERVAL,
        }
    }
}

/// Serves relays and queues what they send for the node
pub struct ReplayServer {
    config: ReplayConfig,
    filter: DuplicateFilter,
}

impl ReplayServer {
    #[must_use]
    pub fn new(config: ReplayConfig) -> Self {
        let filter = DuplicateFilter::new(config.min_interval);
        Self { config, filter }
    }

    /// Accept peers one after another until the node side goes away
    pub async fn serve(
        mut self,
        listener: TcpListener,
        out: mpsc::Sender<NodeCommand>,
    ) -> Result<(), BridgeError> {
        tracing::info!("Replay server waiting on {}", listener.local_addr()?);
        loop {
            let (stream, addr) = listener.accept().await?;
            tracing::info!("Relay connected from {}", addr);

            match self.handle_peer(stream, &out).await {
                Ok(()) => tracing::info!("Relay {} disconnected", addr),
                Err(BridgeError::ChannelClosed) => return Err(BridgeError::ChannelClosed),
                Err(e) => tracing::warn!("Lost connection with {}: {}", addr, e),
            }
        }
    }

    async fn handle_peer(
        &mut self,
        mut stream: TcpStream,
        out: &mpsc::Sender<NodeCommand>,
    ) -> Result<(), BridgeError> {
        let mut decoder = DownlinkDecoder::new();
        let mut buffer = [0u8; 1024];

        loop {
            let n = stream.read(&mut buffer).await?;
            if n == 0 {
                return Ok(());
            }

            for item in decoder.feed(&buffer[..n]) {
                match item {
                    Downlink::Frame(frame) => {
                        if frame.is_empty() {
                            continue;
                        }
                        if self.filter.is_repeat(&frame, Instant::now()) {
                            tracing::debug!("Frame filtered: {}", frame.to_hex());
                            continue;
                        }
                        if !self.config.forward_delay.is_zero() {
                            tokio::time::sleep(self.config.forward_delay).await;
                        }
                        tracing::info!("Replaying {}-byte frame", frame.len());
                        out.send(NodeCommand::Inject(frame.clone()))
                            .await
                            .map_err(|_| BridgeError::ChannelClosed)?;
                        self.filter.record(&frame, Instant::now());
                    }
                    Downlink::Control(radio) => {
                        out.send(NodeCommand::Radio(radio))
                            .await
                            .map_err(|_| BridgeError::ChannelClosed)?;
                    }
                }
            }
        }
    }
}
