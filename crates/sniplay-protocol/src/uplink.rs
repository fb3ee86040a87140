//! Uplink (node -> host) framing
//!
//! Every frame the radio captures is relayed to the host as:
//!
//! ```text
//! "Snif" [len: 1] [payload: len bytes] [rssi: 1, signed] [lqi: 1, unsigned]
//! ```
//!
//! No escaping is applied. The host side skips anything between frames, which
//! also covers debug text the node prints on the same port.

use bytes::{BufMut, Bytes, BytesMut};

use crate::downlink::SequenceWindow;
use crate::session::SerialSink;
use crate::types::{CapturedFrame, LinkFrame, DATA_MARKER, MARKER_LEN, MAX_PAYLOAD_LEN};

/// Encoder for captured frames
pub struct UplinkFramer;

impl UplinkFramer {
    /// Encode a captured frame into its uplink representation
    #[must_use]
    pub fn encode(captured: &CapturedFrame) -> Bytes {
        let frame = &captured.frame;
        let mut out = BytesMut::with_capacity(MARKER_LEN + frame.len() + 3);
        out.put_slice(&DATA_MARKER);
        out.put_u8(frame.len_byte());
        out.put_slice(frame.as_bytes());
        out.put_i8(captured.rssi);
        out.put_u8(captured.lqi);
        out.freeze()
    }

    /// Write a captured frame to the serial link one byte at a time.
    ///
    /// A failed write is the transport's problem: it is logged and the
    /// remaining bytes are still offered, so the return value only reports
    /// how many bytes were accepted.
    pub fn write_to<S: SerialSink + ?Sized>(captured: &CapturedFrame, sink: &mut S) -> usize {
        let mut written = 0;
        for byte in Self::encode(captured) {
            match sink.write_byte(byte) {
                Ok(()) => written += 1,
                Err(e) => tracing::trace!("Uplink byte write failed: {}", e),
            }
        }
        written
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UplinkState {
    Hunting,
    Length,
    Payload { remaining: u8 },
    Rssi,
    Lqi { rssi: i8 },
}

/// Host-side decoder for the uplink byte stream
pub struct UplinkDecoder {
    window: SequenceWindow,
    state: UplinkState,
    buffer: BytesMut,
    frame: Option<LinkFrame>,
}

impl Default for UplinkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl UplinkDecoder {
    /// Create a new uplink decoder
    pub fn new() -> Self {
        Self {
            window: SequenceWindow::new(),
            state: UplinkState::Hunting,
            buffer: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
            frame: None,
        }
    }

    /// Whether the decoder is between frames
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == UplinkState::Hunting
    }

    /// Feed bytes into the decoder and extract complete captures
    pub fn feed(&mut self, data: &[u8]) -> Vec<CapturedFrame> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn push(&mut self, byte: u8) -> Option<CapturedFrame> {
        self.window.push(byte);

        match self.state {
            UplinkState::Hunting => {
                if self.window.matches(&DATA_MARKER) {
                    self.state = UplinkState::Length;
                }
            }
            UplinkState::Length => {
                self.buffer.clear();
                self.state = if byte == 0 {
                    self.frame = Some(LinkFrame::default());
                    UplinkState::Rssi
                } else {
                    UplinkState::Payload { remaining: byte }
                };
            }
            UplinkState::Payload { remaining } => {
                self.buffer.put_u8(byte);
                let remaining = remaining - 1;
                self.state = if remaining == 0 {
                    self.frame = Some(LinkFrame::from_bounded(self.buffer.split().freeze()));
                    UplinkState::Rssi
                } else {
                    UplinkState::Payload { remaining }
                };
            }
            UplinkState::Rssi => {
                self.state = UplinkState::Lqi {
                    rssi: i8::from_ne_bytes([byte]),
                };
            }
            UplinkState::Lqi { rssi } => {
                self.state = UplinkState::Hunting;
                // Metadata bytes must not be mistaken for the start of a marker
                self.window = SequenceWindow::new();
                let frame = self.frame.take().unwrap_or_default();
                return Some(CapturedFrame::new(frame, rssi, byte));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(data: &[u8], rssi: i8, lqi: u8) -> CapturedFrame {
        CapturedFrame::new(LinkFrame::from_slice(data).unwrap(), rssi, lqi)
    }

    #[test]
    fn test_encode_layout() {
        let encoded = UplinkFramer::encode(&captured(&[0x41, 0x88, 0x07], -45, 200));
        assert_eq!(
            encoded.as_ref(),
            &[0x53, 0x6E, 0x69, 0x66, 0x03, 0x41, 0x88, 0x07, 0xD3, 0xC8]
        );
    }

    #[test]
    fn test_encode_empty_payload() {
        let encoded = UplinkFramer::encode(&captured(&[], 0, 0));
        assert_eq!(encoded.as_ref(), &[0x53, 0x6E, 0x69, 0x66, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_write_to_sink() {
        let mut sink: Vec<u8> = Vec::new();
        let c = captured(&[0xDE, 0xAD], -1, 255);
        let written = UplinkFramer::write_to(&c, &mut sink);
        assert_eq!(written, 4 + 1 + 2 + 2);
        assert_eq!(sink, UplinkFramer::encode(&c).to_vec());
    }

    #[test]
    fn test_decode_with_noise() {
        let mut stream = b"Radio ON!\n".to_vec();
        stream.extend_from_slice(&UplinkFramer::encode(&captured(&[1, 2, 3], -70, 90)));
        stream.extend_from_slice(b"junk");
        stream.extend_from_slice(&UplinkFramer::encode(&captured(&[], 5, 6)));

        let mut decoder = UplinkDecoder::new();
        let frames = decoder.feed(&stream);
        assert_eq!(
            frames,
            vec![captured(&[1, 2, 3], -70, 90), captured(&[], 5, 6)]
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decode_partial() {
        let encoded = UplinkFramer::encode(&captured(b"Snif", -10, 1));
        let mut decoder = UplinkDecoder::new();

        let frames = decoder.feed(&encoded[..6]);
        assert!(frames.is_empty());
        assert!(!decoder.is_idle());

        let frames = decoder.feed(&encoded[6..]);
        assert_eq!(frames, vec![captured(b"Snif", -10, 1)]);
    }
}
