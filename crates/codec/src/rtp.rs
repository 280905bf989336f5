//! Read-only accessors for the fixed RTP header.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```
//!
//! The accessors only look at fixed offsets and return `None` when the
//! packet is too short, they do not validate the rest of the header.

/// Size of the fixed RTP header, without CSRCs and extensions.
pub const HEADER_SIZE: usize = 12;

pub fn marker(bytes: &[u8]) -> Option<bool> {
    bytes.get(1).map(|b| b & 0x80 != 0)
}

pub fn payload_type(bytes: &[u8]) -> Option<u8> {
    bytes.get(1).map(|b| b & 0x7F)
}

/// # Test
///
/// ```
/// use rtp_transport_codec::rtp;
///
/// let packet = [
///     0x80, 0xe0, 0xff, 0xfe, 0x00, 0x00, 0x03, 0xe8,
///     0x12, 0x34, 0x56, 0x78,
/// ];
///
/// assert_eq!(rtp::sequence_number(&packet), Some(65534));
/// assert_eq!(rtp::timestamp(&packet), Some(1000));
/// assert_eq!(rtp::ssrc(&packet), Some(0x12345678));
/// assert_eq!(rtp::payload_type(&packet), Some(96));
/// assert_eq!(rtp::marker(&packet), Some(true));
/// assert_eq!(rtp::ssrc(&packet[..8]), None);
/// ```
pub fn sequence_number(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(2..4)?.try_into().ok()?))
}

pub fn timestamp(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(4..8)?.try_into().ok()?))
}

pub fn ssrc(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(8..12)?.try_into().ok()?))
}
