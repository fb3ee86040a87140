//! IEEE 802.15.4 MAC header parsing
//!
//! Only the header is decoded: enough to tell frame type, acknowledgment
//! request, sequence number and addressing. Payloads are never interpreted.
//!
//! ```text
//! [Frame Control: 2 bytes LE]
//! [Sequence: 1 byte]
//! [Dst PAN: 0/2] [Dst Addr: 0/2/8]
//! [Src PAN: 0/2] [Src Addr: 0/2/8]
//! ```

use crate::types::{ExtendedAddress, ProtocolError};

/// Frame type value carried in a forged acknowledgment
pub const ACK_FRAME_TYPE: u8 = 0x02;

/// Minimum header: frame control(2) + sequence(1)
pub const MIN_HEADER_SIZE: usize = 3;

/// MAC frame type (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Beacon,
    Data,
    Ack,
    MacCommand,
    Reserved(u8),
}

impl FrameType {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => FrameType::Beacon,
            1 => FrameType::Data,
            2 => FrameType::Ack,
            3 => FrameType::MacCommand,
            v => FrameType::Reserved(v),
        }
    }
}

/// Addressing mode (2-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    None,
    Reserved,
    Short,
    Extended,
}

impl AddressMode {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => AddressMode::None,
            1 => AddressMode::Reserved,
            2 => AddressMode::Short,
            3 => AddressMode::Extended,
            _ => unreachable!(),
        }
    }

    fn addr_len(self) -> usize {
        match self {
            AddressMode::None | AddressMode::Reserved => 0,
            AddressMode::Short => 2,
            AddressMode::Extended => 8,
        }
    }

    fn is_present(self) -> bool {
        self.addr_len() > 0
    }
}

/// Link-layer address as found in a MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAddress {
    None,
    Short(u16),
    Extended(ExtendedAddress),
}

impl MacAddress {
    #[must_use]
    pub fn extended(&self) -> Option<&ExtendedAddress> {
        match self {
            MacAddress::Extended(addr) => Some(addr),
            _ => None,
        }
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacAddress::None => write!(f, "-"),
            MacAddress::Short(a) => write!(f, "{a:#06x}"),
            MacAddress::Extended(a) => write!(f, "{a}"),
        }
    }
}

/// Decoded frame control field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub frame_type: FrameType,
    pub security_enabled: bool,
    pub frame_pending: bool,
    pub ack_request: bool,
    pub pan_id_compression: bool,
    pub dst_addr_mode: AddressMode,
    pub frame_version: u8,
    pub src_addr_mode: AddressMode,
}

impl FrameControl {
    #[must_use]
    pub fn from_u16(fcf: u16) -> Self {
        Self {
            frame_type: FrameType::from_bits((fcf & 0x07) as u8),
            security_enabled: fcf & (1 << 3) != 0,
            frame_pending: fcf & (1 << 4) != 0,
            ack_request: fcf & (1 << 5) != 0,
            pan_id_compression: fcf & (1 << 6) != 0,
            dst_addr_mode: AddressMode::from_bits(((fcf >> 10) & 0x03) as u8),
            frame_version: ((fcf >> 12) & 0x03) as u8,
            src_addr_mode: AddressMode::from_bits(((fcf >> 14) & 0x03) as u8),
        }
    }
}

/// Parsed MAC header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacHeader {
    pub frame_control: FrameControl,
    pub sequence: u8,
    pub dst_pan: Option<u16>,
    pub dst_addr: MacAddress,
    pub src_pan: Option<u16>,
    pub src_addr: MacAddress,
    /// Number of bytes the header occupies
    pub header_len: usize,
}

impl MacHeader {
    /// Parse the MAC header at the start of a raw frame
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort(data.len()));
        }

        let frame_control = FrameControl::from_u16(u16::from_le_bytes([data[0], data[1]]));
        let sequence = data[2];
        let mut idx = MIN_HEADER_SIZE;

        let dst_mode = frame_control.dst_addr_mode;
        let src_mode = frame_control.src_addr_mode;

        let dst_pan = if dst_mode.is_present() {
            Some(read_u16(data, &mut idx)?)
        } else {
            None
        };
        let dst_addr = read_address(data, &mut idx, dst_mode)?;

        let src_pan = if src_mode.is_present() && !frame_control.pan_id_compression {
            Some(read_u16(data, &mut idx)?)
        } else if src_mode.is_present() {
            dst_pan
        } else {
            None
        };
        let src_addr = read_address(data, &mut idx, src_mode)?;

        Ok(Self {
            frame_control,
            sequence,
            dst_pan,
            dst_addr,
            src_pan,
            src_addr,
            header_len: idx,
        })
    }

    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        self.frame_control.frame_type
    }

    #[must_use]
    pub fn ack_request(&self) -> bool {
        self.frame_control.ack_request
    }
}

fn read_u16(data: &[u8], idx: &mut usize) -> Result<u16, ProtocolError> {
    let bytes = data
        .get(*idx..*idx + 2)
        .ok_or(ProtocolError::FrameTooShort(data.len()))?;
    *idx += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_address(
    data: &[u8],
    idx: &mut usize,
    mode: AddressMode,
) -> Result<MacAddress, ProtocolError> {
    match mode {
        AddressMode::None | AddressMode::Reserved => Ok(MacAddress::None),
        AddressMode::Short => Ok(MacAddress::Short(read_u16(data, idx)?)),
        AddressMode::Extended => {
            let bytes = data
                .get(*idx..*idx + 8)
                .ok_or(ProtocolError::FrameTooShort(data.len()))?;
            *idx += 8;
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            Ok(MacAddress::Extended(ExtendedAddress::from_le_bytes(le)))
        }
    }
}
