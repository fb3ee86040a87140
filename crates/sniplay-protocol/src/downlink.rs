//! Downlink (host -> node) framing
//!
//! The host drives the node with two kinds of messages, neither of them
//! escaped:
//!
//! ```text
//! data frame:      "Snif" [len: 1] [payload: len bytes]
//! control command: "ctrl" [arg: 1]      '1' = radio on, '0' = radio off
//! ```
//!
//! Markers are recognised with a sliding 4-byte window that sees every byte,
//! but a match is only acted upon while the decoder is idle, so payload bytes
//! that happen to spell a marker never restart framing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{
    LinkFrame, RadioCommand, CONTROL_MARKER, DATA_MARKER, MARKER_LEN, MAX_PAYLOAD_LEN,
};

/// The last [`MARKER_LEN`] bytes seen on the link, oldest first.
///
/// Starts zero-filled so a stream behaves as if preceded by zero bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceWindow {
    bytes: [u8; MARKER_LEN],
}

impl SequenceWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the window left by one and append `byte`
    pub fn push(&mut self, byte: u8) {
        self.bytes.copy_within(1.., 0);
        self.bytes[MARKER_LEN - 1] = byte;
    }

    #[must_use]
    pub fn matches(&self, marker: &[u8; MARKER_LEN]) -> bool {
        &self.bytes == marker
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MARKER_LEN] {
        &self.bytes
    }
}

/// Downlink decoder state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecoderState {
    /// Hunting for a marker
    #[default]
    Idle,
    /// Data marker seen, next byte is the payload length
    ExpectLength,
    /// Accumulating payload bytes
    Collecting { remaining: u8 },
    /// Control marker seen, next byte is the command argument
    ExpectControlArg,
}

/// Something recognised on the downlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downlink {
    /// Radio power command
    Control(RadioCommand),
    /// A complete frame to inject
    Frame(LinkFrame),
}

/// Byte-at-a-time downlink decoder.
///
/// There is no reset: a partially collected frame ends only when its declared
/// length runs out.
#[derive(Debug)]
pub struct DownlinkDecoder {
    window: SequenceWindow,
    state: DecoderState,
    buffer: BytesMut,
}

impl Default for DownlinkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DownlinkDecoder {
    /// Create a new decoder in the idle state
    pub fn new() -> Self {
        Self {
            window: SequenceWindow::new(),
            state: DecoderState::Idle,
            buffer: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
        }
    }

    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    #[must_use]
    pub fn window(&self) -> &SequenceWindow {
        &self.window
    }

    /// Process one byte from the serial link.
    ///
    /// The window sees every byte, matches are acted on only in `Idle`.
    pub fn push(&mut self, byte: u8) -> Option<Downlink> {
        self.window.push(byte);

        match self.state {
            DecoderState::Idle => {
                if self.window.matches(&CONTROL_MARKER) {
                    self.state = DecoderState::ExpectControlArg;
                } else if self.window.matches(&DATA_MARKER) {
                    self.state = DecoderState::ExpectLength;
                }
                None
            }
            DecoderState::ExpectControlArg => {
                self.state = DecoderState::Idle;
                Some(Downlink::Control(RadioCommand::from_arg(byte)))
            }
            DecoderState::ExpectLength => {
                self.buffer.clear();
                if byte == 0 {
                    self.state = DecoderState::Idle;
                    return Some(Downlink::Frame(LinkFrame::default()));
                }
                self.buffer.reserve(usize::from(byte));
                self.state = DecoderState::Collecting { remaining: byte };
                None
            }
            DecoderState::Collecting { remaining } => {
                self.buffer.put_u8(byte);
                let remaining = remaining - 1;
                if remaining > 0 {
                    self.state = DecoderState::Collecting { remaining };
                    return None;
                }
                self.state = DecoderState::Idle;
                let data = self.buffer.split().freeze();
                Some(Downlink::Frame(LinkFrame::from_bounded(data)))
            }
        }
    }

    /// Feed a chunk of bytes, returning everything recognised in order
    pub fn feed(&mut self, data: &[u8]) -> Vec<Downlink> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }
}

/// Encoder for host -> node messages
pub struct DownlinkEncoder;

impl DownlinkEncoder {
    /// Encode a frame for injection
    #[must_use]
    pub fn frame(frame: &LinkFrame) -> Bytes {
        let mut out = BytesMut::with_capacity(MARKER_LEN + 1 + frame.len());
        out.put_slice(&DATA_MARKER);
        out.put_u8(frame.len_byte());
        out.put_slice(frame.as_bytes());
        out.freeze()
    }

    /// Encode a radio power command
    #[must_use]
    pub fn control(command: RadioCommand) -> Bytes {
        let mut out = BytesMut::with_capacity(MARKER_LEN + 1);
        out.put_slice(&CONTROL_MARKER);
        out.put_u8(command.arg());
        out.freeze()
    }
}
