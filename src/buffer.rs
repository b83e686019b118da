//! Bounded per-side reassembly buffer.
//!
//! A [`ReassemblyBuffer`] holds bytes the parser has not yet consumed. It
//! never grows past its limit: [`append`](ReassemblyBuffer::append) accepts
//! only as many bytes as fit and reports how many it took, leaving the caller
//! to run the parser and apply the overflow policy before offering the rest.

use std::num::NonZeroUsize;

use bytes::BytesMut;

/// Byte accumulator for one side of a flow.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use memerge::buffer::ReassemblyBuffer;
///
/// let mut buffer = ReassemblyBuffer::new(NonZeroUsize::new(8).expect("non-zero"));
/// assert_eq!(buffer.append(b"HELO example"), 8);
/// assert!(buffer.is_full());
/// assert_eq!(buffer.clear(), 8);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug)]
pub struct ReassemblyBuffer {
    bytes: BytesMut,
    limit: NonZeroUsize,
    closed: bool,
}

impl ReassemblyBuffer {
    /// Create an empty buffer. No memory is reserved until bytes arrive.
    #[must_use]
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            bytes: BytesMut::new(),
            limit,
            closed: false,
        }
    }

    /// Append as much of `data` as fits under the limit.
    ///
    /// Returns the number of bytes taken from the front of `data`. A closed
    /// buffer takes nothing.
    pub fn append(&mut self, data: &[u8]) -> usize {
        if self.closed {
            return 0;
        }
        let take = self.remaining().min(data.len());
        self.bytes.extend_from_slice(&data[..take]);
        take
    }

    /// Bytes still accepted before the limit is reached.
    #[must_use]
    pub fn remaining(&self) -> usize { self.limit.get().saturating_sub(self.bytes.len()) }

    /// Whether the buffer holds `limit` bytes.
    #[must_use]
    pub fn is_full(&self) -> bool { self.remaining() == 0 }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Whether no bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Configured retained-bytes cap.
    #[must_use]
    pub fn limit(&self) -> NonZeroUsize { self.limit }

    /// Whether the side was closed by [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }

    /// Buffered bytes, oldest first.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    /// Mutable access for parsers, which consume complete units from the
    /// front and leave partial ones in place.
    pub fn bytes_mut(&mut self) -> &mut BytesMut { &mut self.bytes }

    /// Drop all buffered bytes, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.bytes.len();
        self.bytes.clear();
        dropped
    }

    /// Drop all buffered bytes and refuse further input.
    ///
    /// Returns how many bytes were dropped. The backing allocation is
    /// released.
    pub fn close(&mut self) -> usize {
        let dropped = self.bytes.len();
        self.bytes = BytesMut::new();
        self.closed = true;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use bytes::Buf;

    use super::*;

    fn buffer(limit: usize) -> ReassemblyBuffer {
        ReassemblyBuffer::new(NonZeroUsize::new(limit).expect("non-zero"))
    }

    #[test]
    fn append_stops_at_limit() {
        let mut buf = buffer(10);

        assert_eq!(buf.append(b"abcdef"), 6);
        assert_eq!(buf.remaining(), 4);
        assert_eq!(buf.append(b"ghijkl"), 4);
        assert!(buf.is_full());
        assert_eq!(buf.append(b"m"), 0);
        assert_eq!(buf.as_bytes(), b"abcdefghij");
    }

    #[test]
    fn consumed_prefix_frees_room() {
        let mut buf = buffer(4);
        buf.append(b"abcd");
        buf.bytes_mut().advance(3);

        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.append(b"xyz!"), 3);
        assert_eq!(buf.as_bytes(), b"dxyz");
    }

    #[test]
    fn closed_buffer_rejects_input() {
        let mut buf = buffer(16);
        buf.append(b"partial");

        assert_eq!(buf.close(), 7);
        assert!(buf.is_closed());
        assert!(buf.is_empty());
        assert_eq!(buf.append(b"more"), 0);
    }
}
