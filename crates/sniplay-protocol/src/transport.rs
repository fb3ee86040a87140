//! Async serial transport for talking to a capture/replay node

use crate::downlink::DownlinkEncoder;
use crate::types::{CapturedFrame, LinkFrame, ProtocolError, RadioCommand};
use crate::uplink::UplinkDecoder;

use bytes::Bytes;
use serial2::SerialPort;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Default baud rate of the node's UART
pub const BAUD_RATE: u32 = 115200;

/// Events from the node
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A frame captured by the node's radio
    Captured(CapturedFrame),
    /// Raw bytes exactly as read from the serial port
    Raw(Bytes),
    /// The serial port was closed or failed
    Disconnected,
}

/// Command to send to the writer task
enum WriteCommand {
    Send(Bytes),
    /// Acknowledge once everything queued before it has been written
    Drain(oneshot::Sender<()>),
    Shutdown,
}

/// Async transport for communicating with a node over its serial port
pub struct NodeTransport {
    /// Channel to send data to the writer task
    write_tx: mpsc::Sender<WriteCommand>,
    /// Event sender for everything read from the port
    event_tx: broadcast::Sender<NodeEvent>,
    /// Cleared once the reader stops
    connected: Arc<AtomicBool>,
}

impl NodeTransport {
    /// Connect to a node at the given serial port path
    pub async fn connect(path: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        tracing::info!("Connecting to node at {} ({} baud)", path, baud_rate);

        // 8N1, no flow control
        let mut port = SerialPort::open(path, baud_rate).map_err(ProtocolError::SerialError)?;

        // Short read timeout so the reader thread notices shutdown
        port.set_read_timeout(Duration::from_millis(100))
            .map_err(ProtocolError::SerialError)?;

        // Stale bytes from before we attached would only confuse the decoder
        if let Err(e) = port.discard_buffers() {
            tracing::debug!("Could not discard serial buffers: {}", e);
        }

        let reader_port = port.try_clone().map_err(ProtocolError::SerialError)?;

        let (event_tx, _) = broadcast::channel(256);
        let (write_tx, write_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::writer_task(port, write_rx));

        let reader_events = event_tx.clone();
        let reader_connected = Arc::clone(&connected);
        std::thread::spawn(move || {
            Self::reader_thread(reader_port, reader_events, reader_connected);
        });

        tracing::info!("Connected to node");

        Ok(Self {
            write_tx,
            event_tx,
            connected,
        })
    }

    /// Writer task - runs in tokio runtime
    async fn writer_task(port: SerialPort, mut rx: mpsc::Receiver<WriteCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WriteCommand::Send(data) => {
                    tracing::debug!("Writing {} bytes to serial port", data.len());
                    if let Err(e) = port.write_all(&data) {
                        tracing::error!("Write error: {}", e);
                    }
                    if let Err(e) = port.flush() {
                        tracing::error!("Flush error: {}", e);
                    }
                }
                WriteCommand::Drain(done) => {
                    let _ = done.send(());
                }
                WriteCommand::Shutdown => break,
            }
        }
        tracing::debug!("Writer task shutting down");
    }

    /// Reader thread - runs in a standard thread with blocking I/O
    fn reader_thread(
        port: SerialPort,
        event_tx: broadcast::Sender<NodeEvent>,
        connected: Arc<AtomicBool>,
    ) {
        tracing::debug!("Reader thread started");
        let mut buffer = [0u8; 1024];
        let mut decoder = UplinkDecoder::new();

        loop {
            match port.read(&mut buffer) {
                Ok(0) => {
                    tracing::warn!("Serial port closed");
                    break;
                }
                Ok(n) => {
                    tracing::trace!("Read {} bytes: {:02X?}", n, &buffer[..n]);
                    // Send errors only mean nobody is subscribed right now
                    let _ = event_tx.send(NodeEvent::Raw(Bytes::copy_from_slice(&buffer[..n])));
                    for captured in decoder.feed(&buffer[..n]) {
                        tracing::debug!(
                            "Captured frame: len={} rssi={} lqi={}",
                            captured.frame.len(),
                            captured.rssi,
                            captured.lqi
                        );
                        let _ = event_tx.send(NodeEvent::Captured(captured));
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // The transport itself has been dropped
                    if Arc::strong_count(&connected) == 1 {
                        break;
                    }
                    continue;
                }
                Err(ref e) if e.raw_os_error() == Some(libc::EAGAIN) => {
                    continue;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                Err(e) => {
                    tracing::error!("Serial read error: {}", e);
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        let _ = event_tx.send(NodeEvent::Disconnected);
        tracing::debug!("Reader thread shutting down");
    }

    /// Whether the serial port is still being read
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to node events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Queue raw bytes for the serial port
    pub async fn send_raw(&self, data: Bytes) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.write_tx
            .send(WriteCommand::Send(data))
            .await
            .map_err(|_| ProtocolError::NotConnected)
    }

    /// Ask the node to transmit a frame
    pub async fn inject(&self, frame: &LinkFrame) -> Result<(), ProtocolError> {
        tracing::debug!("Injecting {}-byte frame", frame.len());
        self.send_raw(DownlinkEncoder::frame(frame)).await
    }

    /// Wait until every queued write has reached the serial port
    pub async fn drain(&self) -> Result<(), ProtocolError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.write_tx
            .send(WriteCommand::Drain(done_tx))
            .await
            .map_err(|_| ProtocolError::NotConnected)?;
        done_rx.await.map_err(|_| ProtocolError::NotConnected)
    }

    /// Switch the node's radio on or off
    pub async fn set_radio(&self, command: RadioCommand) -> Result<(), ProtocolError> {
        tracing::info!("Sending radio command {:?}", command);
        self.send_raw(DownlinkEncoder::control(command)).await
    }
}

impl Drop for NodeTransport {
    fn drop(&mut self) {
        // Signal shutdown (best effort)
        let _ = self.write_tx.try_send(WriteCommand::Shutdown);
    }
}
