//! Capture relay - the sniffing end of a wormhole
//!
//! Every frame the local node captures is forwarded to a remote replay
//! server in downlink framing, ready to be written to the far node as is.

use crate::capture_log::CaptureLog;
use crate::error::BridgeError;
use crate::filter::{DuplicateFilter, SNIFFER_MIN_INTERVAL};
use crate::net::{connect_with_retry, DEFAULT_RETRY};
use sniplay_protocol::{CapturedFrame, DownlinkEncoder, NodeEvent};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast::{self, error::RecvError};

/// Default pause before a captured frame is forwarded
pub const DEFAULT_FORWARD_DELAY: Duration = Duration::from_millis(300);

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Replay server address (`host:port`)
    pub server: String,
    pub retry: Duration,
    pub forward_delay: Duration,
    pub min_interval: Duration,
    pub capture_log: Option<PathBuf>,
}

impl RelayConfig {
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            retry: DEFAULT_RETRY,
            forward_delay: DEFAULT_FORWARD_DELAY,
            min_interval: SNIFFER_MIN_INTERVAL,
            capture_log: None,
        }
    }
}

/// Forwards captured frames to a replay server
pub struct CaptureRelay {
    config: RelayConfig,
    filter: DuplicateFilter,
    forwarded: u64,
}

impl CaptureRelay {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let filter = DuplicateFilter::new(config.min_interval);
        Self {
            config,
            filter,
            forwarded: 0,
        }
    }

    /// Run until the node disconnects or the event channel closes
    pub async fn run(mut self, mut events: broadcast::Receiver<NodeEvent>) -> Result<(), BridgeError> {
        let mut log = match &self.config.capture_log {
            Some(path) => Some(CaptureLog::open(path).await?),
            None => None,
        };

        let mut stream = connect_with_retry(&self.config.server, self.config.retry).await;

        loop {
            let captured = match events.recv().await {
                Ok(NodeEvent::Captured(captured)) => captured,
                Ok(NodeEvent::Raw(_)) => continue,
                Ok(NodeEvent::Disconnected) => {
                    tracing::warn!("Node disconnected after {} forwarded frames", self.forwarded);
                    return Err(BridgeError::NodeDisconnected);
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Relay fell behind, {} captures lost", n);
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            };

            if let Some(log) = log.as_mut() {
                if let Err(e) = log.append(&captured).await {
                    tracing::warn!("Failed to log capture: {}", e);
                }
            }

            self.forward(&mut stream, &captured).await;
        }
    }

    async fn forward(&mut self, stream: &mut TcpStream, captured: &CapturedFrame) {
        let frame = &captured.frame;
        if frame.is_empty() {
            return;
        }

        if self.filter.is_repeat(frame, Instant::now()) {
            tracing::debug!("Frame filtered: {}", frame.to_hex());
            return;
        }

        if !self.config.forward_delay.is_zero() {
            tokio::time::sleep(self.config.forward_delay).await;
        }

        let data = DownlinkEncoder::frame(frame);
        while let Err(e) = stream.write_all(&data).await {
            tracing::warn!("Connection lost ({}), reconnecting...", e);
            *stream = connect_with_retry(&self.config.server, self.config.retry).await;
        }
        self.filter.record(frame, Instant::now());

        self.forwarded += 1;
        tracing::info!(
            "Forwarded {}-byte frame (rssi={} lqi={})",
            frame.len(),
            captured.rssi,
            captured.lqi
        );
    }
}
