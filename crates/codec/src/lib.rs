//! ## RTP / RTCP wire handling
//!
//! [RFC3550]: https://tools.ietf.org/html/rfc3550
//! [RFC4585]: https://tools.ietf.org/html/rfc4585
//! [RFC5104]: https://tools.ietf.org/html/rfc5104
//! [RFC5761]: https://tools.ietf.org/html/rfc5761
//!
//! RTP [RFC3550] carries timestamped media payloads, RTCP carries the
//! statistics and control messages that go with them.  When both share a
//! transport address [RFC5761], the receiver has to tell them apart by
//! looking at the second octet of the packet, which is the payload type for
//! RTP and the packet type for RTCP.  Packet types 200-211 are reserved for
//! RTCP, so everything else carrying version 2 is treated as RTP.
//!
//! RTCP feedback messages [RFC4585] are the part of RTCP the transport layer
//! reacts to directly, the most common of them being the Full Intra Request
//! [RFC5104] used to ask a sender for a fresh key frame.

pub mod classifier;
pub mod feedback;
pub mod rtp;
pub mod sequence;
pub mod view;

pub use self::{
    classifier::{Classification, PacketClassifier, RejectReason, classify},
    feedback::{FeedbackMessage, FeedbackType},
    view::{Buffer, PacketView},
};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The requested window does not fit into the underlying buffer.
    InvalidArgument {
        offset: usize,
        length: usize,
        capacity: usize,
    },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument {
                offset,
                length,
                capacity,
            } => write!(
                f,
                "invalid argument: offset={offset} + length={length} exceeds capacity={capacity}"
            ),
        }
    }
}
