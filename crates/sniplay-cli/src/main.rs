//! sniplay - host side of an 802.15.4 capture/replay link

use anyhow::{bail, Context};
use clap::Parser;
use sniplay_bridge::capture_log::{decode_hex, read_records};
use sniplay_bridge::{
    pump_to_node, CaptureLog, CaptureRelay, RelayConfig, ReplayConfig, ReplayServer, Tunnel,
    TunnelConfig, TunnelMode,
};
use sniplay_protocol::{
    CapturedFrame, LinkFrame, MacHeader, NodeEvent, NodeTransport, RadioCommand,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Commands, RadioState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "sniplay=debug,sniplay_protocol=debug,sniplay_bridge=debug,info"
    } else {
        "sniplay=debug,sniplay_protocol=info,sniplay_bridge=info,info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let transport = Arc::new(
        NodeTransport::connect(&cli.port, cli.baud)
            .await
            .with_context(|| format!("opening node at {}", cli.port))?,
    );

    match cli.command {
        Commands::Monitor { log } => monitor(&transport, log).await,
        Commands::Relay {
            server,
            delay_ms,
            min_interval_ms,
            retry_secs,
            log,
        } => {
            let config = RelayConfig {
                server,
                retry: Duration::from_secs(retry_secs),
                forward_delay: Duration::from_millis(delay_ms),
                min_interval: Duration::from_millis(min_interval_ms),
                capture_log: log,
            };
            CaptureRelay::new(config).run(transport.subscribe()).await?;
            Ok(())
        }
        Commands::Replay {
            listen,
            delay_ms,
            min_interval_ms,
        } => {
            let config = ReplayConfig {
                forward_delay: Duration::from_millis(delay_ms),
                min_interval: Duration::from_millis(min_interval_ms),
            };
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("binding {listen}"))?;
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(pump_to_node(Arc::clone(&transport), rx));
            ReplayServer::new(config).serve(listener, tx).await?;
            Ok(())
        }
        Commands::Tunnel {
            listen,
            connect,
            retry_secs,
            node_log,
            peer_log,
        } => {
            let mode = match (listen, connect) {
                (Some(addr), None) => TunnelMode::Listen(addr),
                (None, Some(addr)) => TunnelMode::Connect(addr),
                _ => bail!("exactly one of --listen or --connect is required"),
            };
            let config = TunnelConfig {
                mode,
                retry: Duration::from_secs(retry_secs),
                node_log,
                peer_log,
            };
            let tunnel = Tunnel::open(config).await?;
            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(pump_to_node(Arc::clone(&transport), rx));
            tunnel.run(transport.subscribe(), tx).await?;
            Ok(())
        }
        Commands::Radio { state } => {
            let command = match state {
                RadioState::On => RadioCommand::On,
                RadioState::Off => RadioCommand::Off,
            };
            transport.set_radio(command).await?;
            transport.drain().await?;
            Ok(())
        }
        Commands::Inject { frame } => {
            let bytes = decode_hex(&frame).context("frame is not valid hex")?;
            let frame = LinkFrame::new(bytes)?;
            transport.inject(&frame).await?;
            transport.drain().await?;
            tracing::info!("Injected {}-byte frame", frame.len());
            Ok(())
        }
        Commands::ReplayLog { path, delay_ms } => {
            replay_log(&transport, path, Duration::from_millis(delay_ms)).await
        }
    }
}

/// Print captures as they arrive
async fn monitor(transport: &NodeTransport, log: Option<PathBuf>) -> anyhow::Result<()> {
    let mut log = match log {
        Some(path) => Some(CaptureLog::open(&path).await?),
        None => None,
    };
    let mut events = transport.subscribe();

    loop {
        match events.recv().await {
            Ok(NodeEvent::Captured(captured)) => {
                println!("{}", describe(&captured));
                if let Some(log) = log.as_mut() {
                    if let Err(e) = log.append(&captured).await {
                        tracing::warn!("Failed to log capture: {}", e);
                    }
                }
            }
            Ok(NodeEvent::Raw(_)) => {}
            Ok(NodeEvent::Disconnected) | Err(RecvError::Closed) => {
                bail!("node disconnected");
            }
            Err(RecvError::Lagged(n)) => tracing::warn!("{} captures lost", n),
        }
    }
}

/// One line summary of a captured frame
fn describe(captured: &CapturedFrame) -> String {
    let raw = captured.frame.as_bytes();
    let header = match MacHeader::parse(raw) {
        Ok(h) => format!(
            "{:?} seq={} ack_req={} {} -> {}",
            h.frame_type(),
            h.sequence,
            h.ack_request(),
            h.src_addr,
            h.dst_addr
        ),
        Err(_) => "unparsed".to_string(),
    };
    format!(
        "len={:3} rssi={:4} lqi={:3} {} | {}",
        raw.len(),
        captured.rssi,
        captured.lqi,
        header,
        captured.frame.to_hex()
    )
}

async fn replay_log(
    transport: &NodeTransport,
    path: PathBuf,
    delay: Duration,
) -> anyhow::Result<()> {
    let records = read_records(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let mut injected = 0usize;
    for record in &records {
        let captured = match record.to_captured() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Skipping record: {}", e);
                continue;
            }
        };
        if captured.frame.is_empty() {
            continue;
        }
        transport.inject(&captured.frame).await?;
        injected += 1;
        tokio::time::sleep(delay).await;
    }
    transport.drain().await?;

    tracing::info!("Replayed {} of {} recorded frames", injected, records.len());
    Ok(())
}
