/// RTP/RTCP protocol version carried in the top two bits of the first octet.
pub const VERSION: u8 = 2;

/// Packet types reserved for RTCP (SR=200 ... 211), see RFC5761 section 4.
pub const RTCP_PACKET_TYPES: std::ops::RangeInclusive<u8> = 200..=211;

/// Why a packet could not be classified at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Shorter than the 4 octets both headers start with.
    TooShort(usize),
    /// The version field is not 2.
    BadVersion(u8),
}

/// Outcome of demultiplexing one packet.
///
/// A malformed packet is kept apart from a well-formed packet of the other
/// protocol so that diagnostics can tell a broken peer from a misrouted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Rtp,
    Rtcp,
    Rejected(RejectReason),
}

/// # Test
///
/// ```
/// use rtp_transport_codec::{Classification, RejectReason, classify};
///
/// assert_eq!(classify(&[0x80, 0xc8, 0x00, 0x06]), Classification::Rtcp);
/// assert_eq!(classify(&[0x80, 0x60, 0x00, 0x01]), Classification::Rtp);
/// assert_eq!(classify(&[0x80, 0x60]), Classification::Rejected(RejectReason::TooShort(2)));
/// assert_eq!(classify(&[0x40, 0xc8, 0x00, 0x06]), Classification::Rejected(RejectReason::BadVersion(1)));
/// ```
pub fn classify(bytes: &[u8]) -> Classification {
    if bytes.len() < 4 {
        return Classification::Rejected(RejectReason::TooShort(bytes.len()));
    }

    let version = bytes[0] >> 6;
    if version != VERSION {
        return Classification::Rejected(RejectReason::BadVersion(version));
    }

    if RTCP_PACKET_TYPES.contains(&bytes[1]) {
        Classification::Rtcp
    } else {
        Classification::Rtp
    }
}

/// Accepts packets of one expected protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketClassifier {
    wants_rtcp: bool,
}

impl PacketClassifier {
    pub const fn new(wants_rtcp: bool) -> Self {
        Self { wants_rtcp }
    }

    pub const fn rtp() -> Self {
        Self::new(false)
    }

    pub const fn rtcp() -> Self {
        Self::new(true)
    }

    pub fn wants_rtcp(&self) -> bool {
        self.wants_rtcp
    }

    pub fn classify(&self, bytes: &[u8]) -> Classification {
        classify(bytes)
    }

    /// True only when the packet is well formed and of the expected
    /// protocol, both a rejected packet and one of the other protocol fail.
    pub fn test(&self, bytes: &[u8]) -> bool {
        matches!(
            (classify(bytes), self.wants_rtcp),
            (Classification::Rtcp, true) | (Classification::Rtp, false)
        )
    }
}
