//! Common types used throughout the protocol

use bytes::Bytes;
use std::str::FromStr;
use thiserror::Error;

/// Data marker ("Snif") - starts a length-prefixed frame
pub const DATA_MARKER: [u8; 4] = [0x53, 0x6E, 0x69, 0x66];
/// Control marker ("ctrl") - starts a single-byte radio command
pub const CONTROL_MARKER: [u8; 4] = [0x63, 0x74, 0x72, 0x6C];
/// Length of both markers
pub const MARKER_LEN: usize = 4;
/// Largest payload a single length byte can describe
pub const MAX_PAYLOAD_LEN: usize = 255;
/// Length of a forged acknowledgment
pub const ACK_LEN: usize = 3;
/// Control argument that powers the radio on ('1')
pub const RADIO_ON_ARG: u8 = 0x31;
/// Control argument that powers the radio off ('0')
pub const RADIO_OFF_ARG: u8 = 0x30;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Payload too long: {0} bytes (max 255)")]
    PayloadTooLong(usize),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Serial port error: {0}")]
    SerialError(#[from] std::io::Error),

    #[error("Radio error: {0}")]
    RadioError(String),

    #[error("Transport not connected")]
    NotConnected,
}

/// A raw link-layer frame as carried over the serial link.
///
/// The length is bounded by [`MAX_PAYLOAD_LEN`] at construction so that the
/// single length byte of either framing direction always describes it exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LinkFrame(Bytes);

impl LinkFrame {
    /// Create a frame from owned bytes
    pub fn new(data: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong(data.len()));
        }
        Ok(Self(data))
    }

    /// Create a frame by copying a slice
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Wrap bytes the caller has already bounded by a length byte
    pub(crate) fn from_bounded(data: Bytes) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD_LEN);
        Self(data)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length as carried in the length byte
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // bounded by MAX_PAYLOAD_LEN
    pub fn len_byte(&self) -> u8 {
        self.0.len() as u8
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Format the frame as contiguous lowercase hex
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl AsRef<[u8]> for LinkFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A frame received by the radio together with its signal quality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub frame: LinkFrame,
    pub rssi: i8,
    pub lqi: u8,
}

impl CapturedFrame {
    #[must_use]
    pub fn new(frame: LinkFrame, rssi: i8, lqi: u8) -> Self {
        Self { frame, rssi, lqi }
    }
}

/// 64-bit extended (EUI-64) link address.
///
/// Stored in display order, most significant byte first, i.e. the reverse of
/// the over-the-air byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtendedAddress(pub [u8; 8]);

impl ExtendedAddress {
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build from the little-endian byte order used on air
    #[must_use]
    pub fn from_le_bytes(mut bytes: [u8; 8]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Display for ExtendedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for ExtendedAddress {
    type Err = ProtocolError;

    /// Parse colon-separated (`aa:00:..`) or plain 16-digit hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ProtocolError::InvalidAddress(s.to_string());

        let digits: String = if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() != 8 || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            s.to_string()
        };

        if digits.len() != 16 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut arr = [0u8; 8];
        for (i, byte) in arr.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(arr))
    }
}

/// Radio power command carried after the control marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCommand {
    On,
    Off,
    /// Any other argument byte; accepted but has no effect
    Unknown(u8),
}

impl RadioCommand {
    #[must_use]
    pub fn from_arg(arg: u8) -> Self {
        match arg {
            RADIO_ON_ARG => RadioCommand::On,
            RADIO_OFF_ARG => RadioCommand::Off,
            other => RadioCommand::Unknown(other),
        }
    }

    #[must_use]
    pub fn arg(self) -> u8 {
        match self {
            RadioCommand::On => RADIO_ON_ARG,
            RadioCommand::Off => RADIO_OFF_ARG,
            RadioCommand::Unknown(v) => v,
        }
    }
}
