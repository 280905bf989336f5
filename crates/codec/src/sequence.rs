//! RTP sequence number ordering.
//!
//! [RFC3550 Appendix A.1]: https://tools.ietf.org/html/rfc3550#appendix-A.1
//!
//! Sequence numbers are 16 bits wide and wrap around, so plain integer
//! comparison breaks as soon as a stream crosses 65535. Two sequence numbers
//! are ordered by whichever of them is reachable from the other within a
//! forward distance of less than half the number space.
//!
//! # Precondition
//!
//! The relation is only a valid ordering over a contiguous window of at most
//! 32767 sequence numbers. Two values exactly 32768 apart are "after" each
//! other in both directions depending on which is larger, so sorting or
//! reordering a buffer that spans a wider window gives an undefined order.
//! This is why no [`Ord`] implementation is offered for sequence numbers.

use std::cmp::Ordering;

/// Half of the 16-bit sequence number space.
pub const HALF_SPACE: u32 = 1 << 15;

/// Compares two sequence numbers under wraparound.
///
/// `Ordering::Greater` means `a` comes after `b`.
///
/// # Test
///
/// ```
/// use std::cmp::Ordering;
/// use rtp_transport_codec::sequence::compare;
///
/// assert_eq!(compare(7, 7), Ordering::Equal);
/// assert_eq!(compare(5, 10), Ordering::Less);
/// assert_eq!(compare(65530, 5), Ordering::Less);
/// assert_eq!(compare(0, 32767), Ordering::Less);
/// ```
pub fn compare(a: u16, b: u16) -> Ordering {
    let (a, b) = (a as u32, b as u32);
    match a.cmp(&b) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater if a - b < HALF_SPACE => Ordering::Greater,
        Ordering::Greater => Ordering::Less,
        Ordering::Less if b - a < HALF_SPACE => Ordering::Less,
        Ordering::Less => Ordering::Greater,
    }
}

/// Whether `a` comes strictly after `b`.
pub fn is_after(a: u16, b: u16) -> bool {
    compare(a, b) == Ordering::Greater
}

/// Forward distance from `from` to `to`, modulo 2^16.
pub fn distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}
