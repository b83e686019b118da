//! CRLF line framing for line-oriented protocol parsers.
//!
//! [`LineDecoder`] implements [`tokio_util::codec::Decoder`] over a
//! [`BytesMut`] buffer. Only `\r\n` terminates a line; a bare `\n` is kept as
//! part of the line. An unterminated tail is left in the buffer untouched so a
//! later fragment can complete it.
//!
//! After an overflow the owning parser calls
//! [`discard_current`](LineDecoder::discard_current): the decoder then drops
//! bytes up to and including the next terminator before yielding lines again.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Line terminator recognised by [`LineDecoder`].
pub const CRLF: &[u8] = b"\r\n";

/// Strict CRLF line decoder with a resynchronisation mode.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use memerge::line::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// let mut buf = BytesMut::from(&b"EHLO a\r\nMAIL"[..]);
///
/// assert_eq!(decoder.next_line(&mut buf).as_deref(), Some(&b"EHLO a"[..]));
/// assert_eq!(decoder.next_line(&mut buf), None);
/// assert_eq!(&buf[..], b"MAIL");
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    // Offset already scanned without finding a terminator.
    next_index: usize,
    discarding: bool,
}

impl LineDecoder {
    /// Create a decoder in framing mode.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Whether the decoder is dropping bytes until the next terminator.
    #[must_use]
    pub fn is_discarding(&self) -> bool { self.discarding }

    /// Drop the remainder of the current line when more input arrives.
    ///
    /// Used after the owning buffer was cleared in the middle of an oversized
    /// line: the bytes that still belong to that line must not be framed as a
    /// fresh one.
    pub fn discard_current(&mut self) {
        self.discarding = true;
        self.next_index = 0;
    }

    /// Return to framing mode and forget any scan progress.
    pub fn reset(&mut self) {
        self.discarding = false;
        self.next_index = 0;
    }

    /// Split the next complete line off the front of `buf`.
    ///
    /// The returned line excludes its terminator. Returns `None` when `buf`
    /// holds no complete line; in discard mode the bytes of the abandoned
    /// line are dropped first, keeping only a trailing `\r` that may start
    /// the terminator.
    pub fn next_line(&mut self, buf: &mut BytesMut) -> Option<BytesMut> {
        loop {
            let Some(end) = self.find_terminator(buf) else {
                if self.discarding {
                    let keep = usize::from(buf.last() == Some(&b'\r'));
                    buf.advance(buf.len() - keep);
                }
                self.next_index = buf.len();
                return None;
            };
            self.next_index = 0;

            if self.discarding {
                buf.advance(end + 1);
                self.discarding = false;
                tracing::debug!(skipped_to = end + 1, "line decoder resynchronised");
                continue;
            }

            let mut line = buf.split_to(end + 1);
            line.truncate(end - 1);
            return Some(line);
        }
    }

    // Index of the `\n` of the first `\r\n` at or after the scan offset.
    fn find_terminator(&self, buf: &[u8]) -> Option<usize> {
        let start = self.next_index.min(buf.len());
        buf[start..]
            .iter()
            .enumerate()
            .filter(|&(_, &byte)| byte == b'\n')
            .map(|(offset, _)| start + offset)
            .find(|&idx| idx > 0 && buf[idx - 1] == b'\r')
    }
}

impl Decoder for LineDecoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.next_line(src))
    }
}
