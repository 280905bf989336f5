use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};

use crate::Error;

/// Byte storage a [`PacketView`] can sit on.
///
/// The capacity of a buffer is the length of its slice, the view never
/// grows or shrinks the storage itself.
pub trait Buffer: AsRef<[u8]> + AsMut<[u8]> {
    /// Whether the storage has been marked unusable, for example because the
    /// pool it was borrowed from has been shut down.
    fn is_invalid(&self) -> bool {
        false
    }
}

impl Buffer for Vec<u8> {}

impl Buffer for BytesMut {}

impl Buffer for Box<[u8]> {}

impl Buffer for &mut [u8] {}

impl<const N: usize> Buffer for [u8; N] {}

/// A mutable window (`offset`, `length`) over a byte buffer.
///
/// Every component of the transport reads and writes packets through the
/// same window, nothing is copied unless the caller asks for it with
/// [`PacketView::to_bytes`].
///
/// Invariant: `offset + length <= capacity`. Every mutator checks it
/// before committing, a failed mutation leaves the view unchanged.
#[derive(Debug, Clone)]
pub struct PacketView<B = BytesMut> {
    buffer: B,
    offset: usize,
    length: usize,
}

impl<B: Buffer> PacketView<B> {
    /// # Test
    ///
    /// ```
    /// use rtp_transport_codec::PacketView;
    ///
    /// let view = PacketView::new(vec![0u8; 16], 4, 8).unwrap();
    ///
    /// assert_eq!(view.offset(), 4);
    /// assert_eq!(view.length(), 8);
    /// assert_eq!(view.capacity(), 16);
    ///
    /// assert!(PacketView::new(vec![0u8; 16], 10, 8).is_err());
    /// ```
    pub fn new(buffer: B, offset: usize, length: usize) -> Result<Self, Error> {
        check(buffer.as_ref().len(), offset, length)?;

        Ok(Self {
            buffer,
            offset,
            length,
        })
    }

    /// A view covering the whole buffer.
    pub fn full(buffer: B) -> Self {
        let length = buffer.as_ref().len();
        Self {
            buffer,
            offset: 0,
            length,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().len()
    }

    pub fn set_offset(&mut self, offset: usize) -> Result<(), Error> {
        check(self.capacity(), offset, self.length)?;
        self.offset = offset;
        Ok(())
    }

    /// # Test
    ///
    /// ```
    /// use rtp_transport_codec::PacketView;
    ///
    /// let mut view = PacketView::new(vec![0u8; 16], 4, 8).unwrap();
    ///
    /// assert!(view.set_length(13).is_err());
    /// assert_eq!(view.length(), 8);
    ///
    /// view.set_length(12).unwrap();
    /// assert_eq!(view.length(), 12);
    /// ```
    pub fn set_length(&mut self, length: usize) -> Result<(), Error> {
        check(self.capacity(), self.offset, length)?;
        self.length = length;
        Ok(())
    }

    pub fn set_offset_length(&mut self, offset: usize, length: usize) -> Result<(), Error> {
        check(self.capacity(), offset, length)?;
        self.offset = offset;
        self.length = length;
        Ok(())
    }

    pub fn is_invalid(&self) -> bool {
        self.buffer.is_invalid()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer.as_ref()[self.offset..self.offset + self.length]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let range = self.offset..self.offset + self.length;
        &mut self.buffer.as_mut()[range]
    }

    /// Copies the window out, for callers that need the packet to outlive
    /// the buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Full mutable access to the underlying storage, used by receivers that
    /// fill the buffer before narrowing the window.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl<B: Buffer> Deref for PacketView<B> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl<B: Buffer> DerefMut for PacketView<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_bytes_mut()
    }
}

impl<B: Buffer> AsRef<[u8]> for PacketView<B> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

fn check(capacity: usize, offset: usize, length: usize) -> Result<(), Error> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Error::InvalidArgument {
            offset,
            length,
            capacity,
        }),
    }
}
