use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sniplay")]
#[command(author, version, about = "Host tooling for 802.15.4 capture/replay nodes")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Serial port of the node
    #[arg(short, long, global = true, env = "SNIPLAY_PORT", default_value = "/dev/ttyACM0")]
    pub port: String,

    /// Serial baud rate
    #[arg(short, long, global = true, env = "SNIPLAY_BAUD", default_value_t = 115200)]
    pub baud: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every frame the node captures
    Monitor {
        /// Append captures to a JSON lines file
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Forward captured frames to a replay server
    Relay {
        /// Replay server address
        #[arg(short, long, env = "SNIPLAY_SERVER", default_value = "127.0.0.1:9999")]
        server: String,

        /// Pause before forwarding each frame
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,

        /// Drop repeats of the same frame within this window
        #[arg(long, default_value_t = 1000)]
        min_interval_ms: u64,

        /// Seconds between reconnection attempts
        #[arg(long, default_value_t = 5)]
        retry_secs: u64,

        /// Append captures to a JSON lines file
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Accept a relay and replay its frames through the node
    Replay {
        /// Address to listen on
        #[arg(short, long, env = "SNIPLAY_LISTEN", default_value = "0.0.0.0:9999")]
        listen: SocketAddr,

        /// Pause before injecting each frame
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,

        /// Drop repeats of the same frame within this window
        #[arg(long, default_value_t = 500)]
        min_interval_ms: u64,
    },

    /// Tunnel the node's raw serial stream over TCP
    Tunnel {
        /// Wait for the peer on this address
        #[arg(long, conflicts_with = "connect", required_unless_present = "connect")]
        listen: Option<SocketAddr>,

        /// Dial the peer at this address
        #[arg(long)]
        connect: Option<String>,

        /// Seconds between reconnection attempts
        #[arg(long, default_value_t = 5)]
        retry_secs: u64,

        /// Log bytes read from the node
        #[arg(long)]
        node_log: Option<PathBuf>,

        /// Log bytes received from the peer
        #[arg(long)]
        peer_log: Option<PathBuf>,
    },

    /// Switch the node's radio on or off
    Radio {
        #[arg(value_enum)]
        state: RadioState,
    },

    /// Inject a single frame given as hex
    Inject {
        /// Frame bytes, e.g. 41c82a...
        frame: String,
    },

    /// Inject every frame recorded in a capture log
    ReplayLog {
        /// JSON lines file written by `monitor --log` or `relay --log`
        path: PathBuf,

        /// Pause between frames
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RadioState {
    On,
    Off,
}
