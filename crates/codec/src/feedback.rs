//! RTCP feedback messages
//!
//! [RFC4585 Section 6.1]: https://tools.ietf.org/html/rfc4585#section-6.1
//! [RFC5104 Section 4.3.1]: https://tools.ietf.org/html/rfc5104#section-4.3.1
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|   FMT   |       PT      |          length               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  SSRC of packet sender                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  SSRC of media source                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! :            Feedback Control Information (FCI)                 :
//! :                                                               :
//! ```
//!
//! The only FCI this codec writes is the single Full Intra Request entry:
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              SSRC                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Seq nr.       |    Reserved                                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! For FIR the "SSRC of media source" in the common header is not used and
//! SHALL be set to 0, the media sender is named in the FCI entry instead.

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Size of the common feedback header.
pub const HEADER_SIZE: usize = 12;

/// Size of one FIR FCI entry.
pub const FIR_ENTRY_SIZE: usize = 8;

/// Payload-specific feedback message types.
pub mod ps {
    pub const PLI: u8 = 1;
    pub const SLI: u8 = 2;
    pub const RPSI: u8 = 3;
    pub const FIR: u8 = 4;
    pub const TSTR: u8 = 5;
    pub const TSTN: u8 = 6;
    pub const VBCM: u8 = 7;
    pub const AFB: u8 = 15;
}

/// Transport-layer feedback message types.
pub mod tl {
    pub const NACK: u8 = 1;
    pub const TMMBR: u8 = 3;
    pub const TMMBN: u8 = 4;
}

#[repr(u8)]
#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum FeedbackType {
    /// RTPFB
    TransportLayer = 205,
    /// PSFB
    PayloadSpecific = 206,
}

/// An RTCP feedback message.
///
/// Fields are only reachable through accessors so that the FIR sequence
/// number can never disagree with the message type: it is kept for FIR and
/// zero for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackMessage {
    payload_type: FeedbackType,
    fmt: u8,
    sender_ssrc: u32,
    source_ssrc: u32,
    sequence: u8,
}

impl FeedbackMessage {
    /// A feedback message, `fmt` is truncated to 5 bits. A FIR built this
    /// way carries sequence number 0.
    pub fn new(payload_type: FeedbackType, fmt: u8, sender_ssrc: u32, source_ssrc: u32) -> Self {
        Self {
            payload_type,
            fmt: fmt & 0x1F,
            sender_ssrc,
            source_ssrc,
            sequence: 0,
        }
    }

    /// A Full Intra Request asking `source_ssrc` for a key frame.
    pub fn fir(sender_ssrc: u32, source_ssrc: u32, sequence_number: u8) -> Self {
        Self {
            payload_type: FeedbackType::PayloadSpecific,
            fmt: ps::FIR,
            sequence: sequence_number,
            sender_ssrc,
            source_ssrc,
        }
    }

    /// Picture Loss Indication.
    pub fn pli(sender_ssrc: u32, source_ssrc: u32) -> Self {
        Self::new(FeedbackType::PayloadSpecific, ps::PLI, sender_ssrc, source_ssrc)
    }

    pub fn payload_type(&self) -> FeedbackType {
        self.payload_type
    }

    /// Feedback message type, 5 bits.
    pub fn fmt(&self) -> u8 {
        self.fmt
    }

    pub fn sender_ssrc(&self) -> u32 {
        self.sender_ssrc
    }

    pub fn source_ssrc(&self) -> u32 {
        self.source_ssrc
    }

    /// FIR command sequence number, modulo 256. `None` for every other
    /// message type.
    pub fn sequence_number(&self) -> Option<u8> {
        self.is_fir().then_some(self.sequence)
    }

    pub fn is_fir(&self) -> bool {
        self.payload_type == FeedbackType::PayloadSpecific && self.fmt == ps::FIR
    }

    /// Serialized size in bytes: `(2 + 2 * N + 1) * 4` with N FCI entries,
    /// N is 1 for FIR and 0 otherwise.
    pub fn size(&self) -> usize {
        let entries = if self.is_fir() { 1 } else { 0 };
        (2 + 2 * entries + 1) * 4
    }

    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rtp_transport_codec::FeedbackMessage;
    ///
    /// let mut bytes = BytesMut::with_capacity(20);
    /// FeedbackMessage::fir(0x01020304, 0x0a0b0c0d, 7).encode(&mut bytes);
    ///
    /// assert_eq!(
    ///     &bytes[..],
    ///     &[
    ///         0x84, 0xce, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04,
    ///         0x00, 0x00, 0x00, 0x00, 0x0a, 0x0b, 0x0c, 0x0d,
    ///         0x07, 0x00, 0x00, 0x00,
    ///     ]
    /// );
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) {
        let size = self.size();

        bytes.clear();
        bytes.reserve(size);
        bytes.put_u8(0x80 | self.fmt);
        bytes.put_u8(self.payload_type.into());
        bytes.put_u16((size / 4 - 1) as u16);
        bytes.put_u32(self.sender_ssrc);

        if self.is_fir() {
            bytes.put_u32(0);
            bytes.put_u32(self.source_ssrc);
            bytes.put_u8(self.sequence);
            bytes.put_bytes(0, 3);
        } else {
            bytes.put_u32(self.source_ssrc);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(self.size());
        self.encode(&mut bytes);
        bytes.freeze()
    }

    /// # Test
    ///
    /// ```
    /// use rtp_transport_codec::feedback::{FeedbackMessage, FeedbackType, ps};
    ///
    /// let buffer = [
    ///     0x81, 0xce, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01,
    ///     0x00, 0x00, 0x00, 0x02,
    /// ];
    ///
    /// let message = FeedbackMessage::decode(&buffer).unwrap();
    ///
    /// assert_eq!(message.payload_type(), FeedbackType::PayloadSpecific);
    /// assert_eq!(message.fmt(), ps::PLI);
    /// assert_eq!(message.sender_ssrc(), 1);
    /// assert_eq!(message.source_ssrc(), 2);
    ///
    /// // sender report, not feedback
    /// assert!(FeedbackMessage::decode(&[0x80, 0xc8, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]).is_none());
    /// ```
    ///
    /// A FIR shorter than its 20 bytes (header plus one FCI entry) is not
    /// decoded at all, so listeners never see a FIR without a source.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let payload_type = FeedbackType::try_from(bytes[1]).ok()?;
        let fmt = bytes[0] & 0x1F;
        let sender_ssrc = read_u32(bytes, 4)?;

        if payload_type == FeedbackType::PayloadSpecific && fmt == ps::FIR {
            if bytes.len() < HEADER_SIZE + FIR_ENTRY_SIZE {
                return None;
            }

            return Some(Self {
                source_ssrc: read_u32(bytes, HEADER_SIZE)?,
                sequence: bytes[HEADER_SIZE + 4],
                payload_type,
                sender_ssrc,
                fmt,
            });
        }

        Some(Self {
            source_ssrc: read_u32(bytes, 8)?,
            sequence: 0,
            payload_type,
            sender_ssrc,
            fmt,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(
        bytes.get(offset..offset + 4)?.try_into().ok()?,
    ))
}
