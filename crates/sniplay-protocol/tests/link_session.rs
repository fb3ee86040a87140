//! End-to-end behaviour of a node's serial link, driven byte by byte

use sniplay_protocol::{
    AckForgeryPolicy, CapturedFrame, DecoderState, Downlink, DownlinkDecoder, DownlinkEncoder,
    LinkFrame, LinkSession, MacHeader, NodeConfig, NodeRole, ProtocolError, Radio, RadioCommand,
    UplinkDecoder, UplinkFramer, VictimAddressSet,
};

#[derive(Default)]
struct MockRadio {
    powered: Option<bool>,
    sent: Vec<Vec<u8>>,
}

impl Radio for MockRadio {
    fn on(&mut self) -> Result<(), ProtocolError> {
        self.powered = Some(true);
        Ok(())
    }

    fn off(&mut self) -> Result<(), ProtocolError> {
        self.powered = Some(false);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

fn node(role: NodeRole, radio_on: bool) -> LinkSession<MockRadio, Vec<u8>> {
    let config = NodeConfig {
        role,
        radio_on,
        ..NodeConfig::default()
    };
    LinkSession::new(config, MockRadio::default(), Vec::new())
}

fn feed(session: &mut LinkSession<MockRadio, Vec<u8>>, bytes: &[u8]) {
    for &b in bytes {
        session.on_serial_byte(b);
    }
}

/// Data frame with ack request, PAN compression, short destination and an
/// extended source, as it appears on air
fn victim_frame(sequence: u8, src_lsb: u8, ack_request: bool) -> Vec<u8> {
    let fcf_low = if ack_request { 0x61 } else { 0x41 };
    let mut frame = vec![fcf_low, 0xC8, sequence, 0x34, 0x12, 0xFF, 0xFF];
    frame.extend_from_slice(&[src_lsb, 0, 0, 0, 0, 0, 0, 0xAA]);
    frame.extend_from_slice(&[0xDE, 0xAD]);
    frame
}

#[test]
fn test_uplink_output_decodes_downlink_for_every_length() {
    for len in 0..=255usize {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
        let captured = CapturedFrame::new(LinkFrame::from_slice(&payload).unwrap(), -71, 200);
        let stream = UplinkFramer::encode(&captured);

        let mut decoder = DownlinkDecoder::new();
        let frames: Vec<_> = stream
            .iter()
            .filter_map(|&b| decoder.push(b))
            .collect();

        assert_eq!(frames.len(), 1, "length {len}");
        match &frames[0] {
            Downlink::Frame(frame) => {
                assert_eq!(frame.len(), len);
                assert_eq!(frame.as_bytes(), payload.as_slice());
            }
            other => panic!("unexpected {other:?} for length {len}"),
        }
    }
}

#[test]
fn test_chained_uplink_feeds_downlink_in_order() {
    let payloads: Vec<Vec<u8>> = (0..200u16)
        .map(|n| {
            let len = usize::from(n % 40) + 1;
            (0..len).map(|i| (usize::from(n) * 13 + i * 31) as u8).collect()
        })
        .collect();

    let mut stream = Vec::new();
    for (n, payload) in payloads.iter().enumerate() {
        // RSSI stays clear of the marker tail bytes
        let rssi = -((n % 90) as i8);
        let captured = CapturedFrame::new(LinkFrame::from_slice(payload).unwrap(), rssi, 255);
        stream.extend_from_slice(&UplinkFramer::encode(&captured));
    }

    let mut decoder = DownlinkDecoder::new();
    let expected: Vec<Downlink> = payloads
        .iter()
        .map(|p| Downlink::Frame(LinkFrame::from_slice(p).unwrap()))
        .collect();
    assert_eq!(decoder.feed(&stream), expected);
    assert_eq!(decoder.state(), DecoderState::Idle);
}

#[test]
fn test_uplink_stream_recovers_metadata() {
    let captured = CapturedFrame::new(LinkFrame::from_slice(b"\x01Snif\x02").unwrap(), -40, 7);
    let mut decoder = UplinkDecoder::new();
    let frames = decoder.feed(&UplinkFramer::encode(&captured));
    assert_eq!(frames, vec![captured]);
    assert!(decoder.is_idle());
}

#[test]
fn test_markers_inside_payload_do_not_interfere() {
    let mut payload = b"ctrl0".to_vec();
    payload.extend_from_slice(b"Snif\x05");
    payload.extend_from_slice(b"ctrl1Sni");
    let frame = LinkFrame::from_slice(&payload).unwrap();

    let mut session = node(NodeRole::REPLAYER, true);
    feed(&mut session, &DownlinkEncoder::frame(&frame));

    assert!(session.radio_enabled());
    assert_eq!(session.radio().powered, None);
    assert_eq!(session.radio().sent, vec![payload]);
    assert_eq!(session.decoder().state(), DecoderState::Idle);
}

#[test]
fn test_radio_on_is_idempotent() {
    let mut session = node(NodeRole::REPLAYER, true);
    feed(&mut session, b"ctrl1");
    assert!(session.radio_enabled());
    feed(&mut session, b"ctrl1");
    assert!(session.radio_enabled());

    feed(&mut session, b"ctrl0ctrl1");
    assert!(session.radio_enabled());
    assert_eq!(session.radio().powered, Some(true));
}

#[test]
fn test_frames_dropped_while_radio_disabled() {
    let mut session = node(NodeRole::REPLAYER, false);
    feed(&mut session, b"Snif\x03\x01\x02\x03");

    assert!(session.radio().sent.is_empty());
    assert_eq!(session.stats().frames_dropped_radio_off, 1);
    assert_eq!(session.decoder().state(), DecoderState::Idle);

    feed(&mut session, b"ctrl1Snif\x03\x01\x02\x03");
    assert_eq!(session.radio().sent, vec![vec![1, 2, 3]]);
}

#[test]
fn test_ack_gating_conditions() {
    let policy = AckForgeryPolicy::new(VictimAddressSet::default_victims());
    let header = MacHeader::parse(&victim_frame(0x5A, 0x08, true)).unwrap();

    assert_eq!(policy.decide(&header, 10, true), Some([0x02, 0x00, 0x5A]));
    assert_eq!(policy.decide(&header, 3, true), None);
    assert_eq!(policy.decide(&header, 10, false), None);

    let stranger = MacHeader::parse(&victim_frame(0x5A, 0x09, true)).unwrap();
    assert_eq!(policy.decide(&stranger, 10, true), None);

    let no_ack = MacHeader::parse(&victim_frame(0x5A, 0x08, false)).unwrap();
    assert_eq!(policy.decide(&no_ack, 10, true), None);
}

#[test]
fn test_session_forges_single_ack() {
    let mut session = node(NodeRole::REPLAYER, true);
    let raw = victim_frame(0x33, 0x13, true);
    session.on_radio_frame(&CapturedFrame::new(LinkFrame::from_slice(&raw).unwrap(), -50, 255));

    assert_eq!(session.radio().sent, vec![vec![0x02, 0x00, 0x33]]);
    assert_eq!(session.stats().acks_forged, 1);

    // Radio disabled by the host
    feed(&mut session, b"ctrl0");
    session.on_radio_frame(&CapturedFrame::new(LinkFrame::from_slice(&raw).unwrap(), -50, 255));
    assert_eq!(session.stats().acks_forged, 1);
}

#[test]
fn test_zero_length_completes_immediately() {
    let mut decoder = DownlinkDecoder::new();
    assert!(decoder.feed(b"Snif").is_empty());
    assert_eq!(decoder.state(), DecoderState::ExpectLength);

    let out = decoder.push(0x00);
    assert_eq!(out, Some(Downlink::Frame(LinkFrame::from_slice(&[]).unwrap())));
    assert_eq!(decoder.state(), DecoderState::Idle);

    // Next byte starts fresh rather than being swallowed as payload
    assert_eq!(decoder.feed(b"\x01ctrl0"), vec![Downlink::Control(RadioCommand::Off)]);
}

#[test]
fn test_concrete_streams() {
    let mut session = node(NodeRole::REPLAYER, true);
    feed(&mut session, &[0x53, 0x6E, 0x69, 0x66, 0x03, 0x01, 0x02, 0x03]);
    assert_eq!(session.radio().sent, vec![vec![0x01, 0x02, 0x03]]);

    feed(&mut session, &[0x63, 0x74, 0x72, 0x6C, 0x30]);
    assert!(!session.radio_enabled());
    assert_eq!(session.radio().sent.len(), 1);
}

#[test]
fn test_combined_node_relays_and_acknowledges() {
    let mut session = node(NodeRole::SNIPLAYER, true);
    let raw = victim_frame(0x07, 0x0c, true);
    let captured = CapturedFrame::new(LinkFrame::from_slice(&raw).unwrap(), -62, 180);

    session.on_radio_frame(&captured);

    assert_eq!(session.radio().sent, vec![vec![0x02, 0x00, 0x07]]);
    assert_eq!(session.serial().as_slice(), &UplinkFramer::encode(&captured)[..]);

    let mut upstream = UplinkDecoder::new();
    assert_eq!(upstream.feed(session.serial()), vec![captured]);
}
