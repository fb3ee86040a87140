//! Node-side dispatch
//!
//! A [`LinkSession`] is the single owner of everything that changes while a
//! node runs: the downlink decoder, the radio enabled flag and the counters.
//! It is driven by two events, a byte arriving on the serial link and a frame
//! arriving from the radio, each handled to completion before the next.

use crate::downlink::{Downlink, DownlinkDecoder};
use crate::forge::{AckForgeryPolicy, VictimAddressSet};
use crate::mac::MacHeader;
use crate::types::{CapturedFrame, LinkFrame, ProtocolError, RadioCommand};
use crate::uplink::UplinkFramer;

/// Radio transceiver primitives
pub trait Radio {
    /// Power the receiver/transmitter on
    fn on(&mut self) -> Result<(), ProtocolError>;
    /// Power the radio off
    fn off(&mut self) -> Result<(), ProtocolError>;
    /// Transmit a raw frame, fire-and-forget
    fn send(&mut self, frame: &[u8]) -> Result<(), ProtocolError>;
}

/// Byte-oriented serial output
pub trait SerialSink {
    fn write_byte(&mut self, byte: u8) -> std::io::Result<()>;
}

impl<W: std::io::Write> SerialSink for W {
    fn write_byte(&mut self, byte: u8) -> std::io::Result<()> {
        self.write_all(&[byte])
    }
}

/// Which halves of the link a node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRole {
    /// Relay received frames upstream
    pub capture: bool,
    /// Accept frames and commands from the host
    pub inject: bool,
    /// Forge acknowledgments for victim traffic
    pub forge_acks: bool,
}

impl NodeRole {
    /// Passive sniffer
    pub const SNIFFER: Self = Self {
        capture: true,
        inject: false,
        forge_acks: false,
    };
    /// Replayer that may also acknowledge victims
    pub const REPLAYER: Self = Self {
        capture: false,
        inject: true,
        forge_acks: true,
    };
    /// Combined capture, replay and forgery
    pub const SNIPLAYER: Self = Self {
        capture: true,
        inject: true,
        forge_acks: true,
    };
}

/// Node configuration, fixed for the life of a session
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub victims: VictimAddressSet,
    /// Radio power state assumed at start-up
    pub radio_on: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::SNIPLAYER,
            victims: VictimAddressSet::default_victims(),
            radio_on: true,
        }
    }
}

/// Counters for events that are otherwise silent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_injected: u64,
    pub frames_dropped_radio_off: u64,
    pub empty_frames: u64,
    pub unknown_controls: u64,
    pub acks_forged: u64,
    pub frames_relayed: u64,
    pub header_parse_failures: u64,
    pub radio_errors: u64,
}

/// One serial link's worth of node state
pub struct LinkSession<R, S> {
    role: NodeRole,
    radio: R,
    serial: S,
    decoder: DownlinkDecoder,
    policy: AckForgeryPolicy,
    radio_enabled: bool,
    stats: SessionStats,
}

impl<R: Radio, S: SerialSink> LinkSession<R, S> {
    /// Create a session; the radio is left in whatever state it is in and
    /// the flag only reflects `config.radio_on`.
    pub fn new(config: NodeConfig, radio: R, serial: S) -> Self {
        tracing::debug!(
            "Link session: capture={} inject={} forge={} victims={} radio_on={}",
            config.role.capture,
            config.role.inject,
            config.role.forge_acks,
            config.victims.len(),
            config.radio_on
        );
        Self {
            role: config.role,
            radio,
            serial,
            decoder: DownlinkDecoder::new(),
            policy: AckForgeryPolicy::new(config.victims),
            radio_enabled: config.radio_on,
            stats: SessionStats::default(),
        }
    }

    #[must_use]
    pub fn radio_enabled(&self) -> bool {
        self.radio_enabled
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    #[must_use]
    pub fn decoder(&self) -> &DownlinkDecoder {
        &self.decoder
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Handle one byte from the serial link
    pub fn on_serial_byte(&mut self, byte: u8) {
        if !self.role.inject {
            return;
        }

        match self.decoder.push(byte) {
            Some(Downlink::Control(command)) => self.apply_control(command),
            Some(Downlink::Frame(frame)) => self.inject(frame),
            None => {}
        }
    }

    /// Handle one frame received by the radio
    pub fn on_radio_frame(&mut self, captured: &CapturedFrame) {
        if self.role.forge_acks {
            self.maybe_forge_ack(captured.frame.as_bytes());
        }

        if self.role.capture {
            UplinkFramer::write_to(captured, &mut self.serial);
            self.stats.frames_relayed += 1;
        }
    }

    fn apply_control(&mut self, command: RadioCommand) {
        let result = match command {
            RadioCommand::On => {
                self.radio_enabled = true;
                tracing::info!("Radio ON");
                self.radio.on()
            }
            RadioCommand::Off => {
                self.radio_enabled = false;
                tracing::info!("Radio OFF");
                self.radio.off()
            }
            RadioCommand::Unknown(arg) => {
                self.stats.unknown_controls += 1;
                tracing::debug!("Ignoring unknown control argument {:#04x}", arg);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.stats.radio_errors += 1;
            tracing::warn!("Radio power change failed: {}", e);
        }
    }

    fn inject(&mut self, frame: LinkFrame) {
        if frame.is_empty() {
            self.stats.empty_frames += 1;
        }

        if !self.radio_enabled {
            self.stats.frames_dropped_radio_off += 1;
            tracing::debug!("Radio off, dropping {}-byte frame", frame.len());
            return;
        }

        tracing::trace!("Injecting frame: {}", frame.to_hex());
        match self.radio.send(frame.as_bytes()) {
            Ok(()) => self.stats.frames_injected += 1,
            Err(e) => {
                self.stats.radio_errors += 1;
                tracing::warn!("Frame injection failed: {}", e);
            }
        }
    }

    fn maybe_forge_ack(&mut self, raw: &[u8]) {
        let header = match MacHeader::parse(raw) {
            Ok(header) => header,
            Err(e) => {
                self.stats.header_parse_failures += 1;
                tracing::trace!("Not acknowledging unparsable frame: {}", e);
                return;
            }
        };

        let Some(ack) = self.policy.decide(&header, raw.len(), self.radio_enabled) else {
            return;
        };

        tracing::debug!(
            "Forging ACK seq={} for {}",
            header.sequence,
            header.src_addr
        );
        match self.radio.send(&ack) {
            Ok(()) => self.stats.acks_forged += 1,
            Err(e) => {
                self.stats.radio_errors += 1;
                tracing::warn!("Forged ACK transmit failed: {}", e);
            }
        }
    }
}
