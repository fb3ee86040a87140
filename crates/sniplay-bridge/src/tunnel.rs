//! Raw byte tunnel for combined sniff/replay nodes
//!
//! The uplink stream of one node is valid downlink input for another: the
//! decoder picks out each `Snif` frame and the trailing RSSI/LQI bytes fall
//! on the floor while it hunts for the next marker. So two combined nodes can
//! be joined by shovelling bytes both ways without decoding anything.

use crate::capture_log::RawLog;
use crate::error::BridgeError;
use crate::net::{connect_with_retry, DEFAULT_RETRY};
use crate::pump::NodeCommand;
use bytes::Bytes;
use sniplay_protocol::NodeEvent;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

/// How the TCP side of the tunnel is established
#[derive(Debug, Clone)]
pub enum TunnelMode {
    /// Wait for the peer on a local address
    Listen(SocketAddr),
    /// Dial the peer (`host:port`), reconnecting as needed
    Connect(String),
}

/// Tunnel configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub mode: TunnelMode,
    pub retry: Duration,
    /// Log of bytes read from the node
    pub node_log: Option<PathBuf>,
    /// Log of bytes received from the peer
    pub peer_log: Option<PathBuf>,
}

impl TunnelConfig {
    #[must_use]
    pub fn new(mode: TunnelMode) -> Self {
        Self {
            mode,
            retry: DEFAULT_RETRY,
            node_log: None,
            peer_log: None,
        }
    }
}

enum Outcome {
    PeerLost,
    NodeGone,
}

/// Bidirectional serial <-> TCP byte pipe
pub struct Tunnel {
    config: TunnelConfig,
    listener: Option<TcpListener>,
    node_log: Option<RawLog>,
    peer_log: Option<RawLog>,
}

impl Tunnel {
    /// Prepare the tunnel, binding the listener and opening logs up front
    pub async fn open(config: TunnelConfig) -> Result<Self, BridgeError> {
        let listener = match &config.mode {
            TunnelMode::Listen(addr) => Some(TcpListener::bind(addr).await?),
            TunnelMode::Connect(_) => None,
        };
        let node_log = match &config.node_log {
            Some(path) => Some(RawLog::open(path).await?),
            None => None,
        };
        let peer_log = match &config.peer_log {
            Some(path) => Some(RawLog::open(path).await?),
            None => None,
        };
        Ok(Self {
            config,
            listener,
            node_log,
            peer_log,
        })
    }

    /// Local address when listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Pipe bytes until the node goes away
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<NodeEvent>,
        to_node: mpsc::Sender<NodeCommand>,
    ) -> Result<(), BridgeError> {
        loop {
            let stream = self.peer().await?;
            match self.pipe(stream, &mut events, &to_node).await? {
                Outcome::PeerLost => tracing::warn!("Tunnel peer lost, waiting for a new one"),
                Outcome::NodeGone => return Err(BridgeError::NodeDisconnected),
            }
        }
    }

    async fn peer(&self) -> Result<TcpStream, BridgeError> {
        match (&self.config.mode, &self.listener) {
            (TunnelMode::Listen(_), Some(listener)) => {
                let (stream, addr) = listener.accept().await?;
                tracing::info!("Tunnel peer connected from {}", addr);
                Ok(stream)
            }
            (TunnelMode::Connect(addr), _) => Ok(connect_with_retry(addr, self.config.retry).await),
            (TunnelMode::Listen(addr), None) => Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("listener for {addr} not bound"),
            ))),
        }
    }

    async fn pipe(
        &mut self,
        stream: TcpStream,
        events: &mut broadcast::Receiver<NodeEvent>,
        to_node: &mpsc::Sender<NodeCommand>,
    ) -> Result<Outcome, BridgeError> {
        let (mut peer_rx, mut peer_tx) = stream.into_split();
        let mut buffer = [0u8; 1024];

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(NodeEvent::Raw(data)) => {
                        if let Some(log) = self.node_log.as_mut() {
                            if let Err(e) = log.append(&data).await {
                                tracing::warn!("Failed to log node bytes: {}", e);
                            }
                        }
                        if let Err(e) = peer_tx.write_all(&data).await {
                            tracing::debug!("Peer write failed: {}", e);
                            return Ok(Outcome::PeerLost);
                        }
                    }
                    Ok(NodeEvent::Captured(_)) => {}
                    Ok(NodeEvent::Disconnected) | Err(RecvError::Closed) => {
                        return Ok(Outcome::NodeGone);
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Tunnel fell behind, {} chunks of node output lost", n);
                    }
                },
                read = peer_rx.read(&mut buffer) => {
                    let n = match read {
                        Ok(0) => return Ok(Outcome::PeerLost),
                        Ok(n) => n,
                        Err(e) => {
                            tracing::debug!("Peer read failed: {}", e);
                            return Ok(Outcome::PeerLost);
                        }
                    };
                    if let Some(log) = self.peer_log.as_mut() {
                        if let Err(e) = log.append(&buffer[..n]).await {
                            tracing::warn!("Failed to log peer bytes: {}", e);
                        }
                    }
                    to_node
                        .send(NodeCommand::Raw(Bytes::copy_from_slice(&buffer[..n])))
                        .await
                        .map_err(|_| BridgeError::ChannelClosed)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tunnel_pipes_both_directions() {
        let config = TunnelConfig::new(TunnelMode::Listen("127.0.0.1:0".parse().unwrap()));
        let tunnel = Tunnel::open(config).await.unwrap();
        let addr = tunnel.local_addr().unwrap();

        let (event_tx, event_rx) = broadcast::channel(16);
        let (node_tx, mut node_rx) = mpsc::channel(16);
        let handle = tokio::spawn(tunnel.run(event_rx, node_tx));

        let mut peer = TcpStream::connect(addr).await.unwrap();

        // Peer -> node
        peer.write_all(b"ctrl1").await.unwrap();
        let mut forwarded = Vec::new();
        while forwarded.len() < 5 {
            match node_rx.recv().await {
                Some(NodeCommand::Raw(data)) => forwarded.extend_from_slice(&data),
                other => panic!("unexpected command: {other:?}"),
            }
        }
        assert_eq!(forwarded, b"ctrl1".to_vec());

        // Node -> peer
        event_tx
            .send(NodeEvent::Raw(Bytes::from_static(b"Snif\x01\x42\xd3\xc8")))
            .unwrap();
        let mut received = [0u8; 8];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"Snif\x01\x42\xd3\xc8");

        event_tx.send(NodeEvent::Disconnected).unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BridgeError::NodeDisconnected)));
    }

    async fn read_command(node_rx: &mut mpsc::Receiver<NodeCommand>, len: usize) -> Vec<u8> {
        let mut forwarded = Vec::new();
        while forwarded.len() < len {
            match node_rx.recv().await {
                Some(NodeCommand::Raw(data)) => forwarded.extend_from_slice(&data),
                other => panic!("unexpected command: {other:?}"),
            }
        }
        forwarded
    }

    #[tokio::test]
    async fn test_connect_mode_redials_lost_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = TunnelConfig::new(TunnelMode::Connect(addr.to_string()));
        config.retry = Duration::from_millis(50);
        let tunnel = Tunnel::open(config).await.unwrap();
        assert!(tunnel.local_addr().is_none());

        let (event_tx, event_rx) = broadcast::channel(16);
        let (node_tx, mut node_rx) = mpsc::channel(16);
        let handle = tokio::spawn(tunnel.run(event_rx, node_tx));

        let (mut first, _) = listener.accept().await.unwrap();
        first.write_all(b"ctrl1").await.unwrap();
        assert_eq!(read_command(&mut node_rx, 5).await, b"ctrl1".to_vec());
        drop(first);

        let (mut second, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        second.write_all(b"ctrl0").await.unwrap();
        assert_eq!(read_command(&mut node_rx, 5).await, b"ctrl0".to_vec());

        event_tx
            .send(NodeEvent::Raw(Bytes::from_static(b"Snif\x01\x42\xd3\xc8")))
            .unwrap();
        let mut received = [0u8; 8];
        second.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"Snif\x01\x42\xd3\xc8");

        event_tx.send(NodeEvent::Disconnected).unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BridgeError::NodeDisconnected)));
    }
}
