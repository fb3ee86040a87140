//! TCP helpers shared by the relay and the tunnel

use std::time::Duration;
use tokio::net::TcpStream;

/// Default delay between connection attempts
pub const DEFAULT_RETRY: Duration = Duration::from_secs(5);

/// Connect to `addr`, retrying every `retry` until it succeeds
pub async fn connect_with_retry(addr: &str, retry: Duration) -> TcpStream {
    loop {
        tracing::info!("Trying to connect to {}...", addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Could not set TCP_NODELAY: {}", e);
                }
                tracing::info!("Connected to {}", addr);
                return stream;
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}, retrying in {:?}", addr, e, retry);
                tokio::time::sleep(retry).await;
            }
        }
    }
}
