//! HTTP/1.x message framing.
//!
//! [`HttpParser`] consumes header blocks and the bodies announced by
//! `Content-Length` on both sides so buffers stay bounded. It extracts no
//! metadata; the default [`ParserRegistry`](super::ParserRegistry) does not
//! register it.

use bytes::{Buf, BytesMut};
use log::debug;

use super::ProtocolParser;
use crate::{direction::Side, metadata::MetaRecord, protocol::Protocol};

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Default)]
struct Stream {
    body_remaining: u64,
    scanned: usize,
    discarding: bool,
    messages: u64,
}

/// Framing-only HTTP parser.
#[derive(Debug, Default)]
pub struct HttpParser {
    client: Stream,
    server: Stream,
}

impl HttpParser {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Header blocks consumed on `side`, skipped resync blocks excluded.
    #[must_use]
    pub fn messages(&self, side: Side) -> u64 {
        match side {
            Side::Client => self.client.messages,
            Side::Server => self.server.messages,
        }
    }

    fn stream(&mut self, side: Side) -> &mut Stream {
        match side {
            Side::Client => &mut self.client,
            Side::Server => &mut self.server,
        }
    }
}

impl ProtocolParser for HttpParser {
    fn protocol(&self) -> Protocol { Protocol::Http }

    fn parse(&mut self, side: Side, buf: &mut BytesMut, _events: &mut Vec<MetaRecord>) {
        self.stream(side).consume(side, buf);
    }

    fn resync(&mut self, side: Side) {
        let stream = self.stream(side);
        stream.discarding = true;
        stream.body_remaining = 0;
        stream.scanned = 0;
    }
}

impl Stream {
    fn consume(&mut self, side: Side, buf: &mut BytesMut) {
        loop {
            if self.body_remaining > 0 {
                let skip = usize::try_from(self.body_remaining)
                    .map_or(buf.len(), |remaining| remaining.min(buf.len()));
                buf.advance(skip);
                self.body_remaining -= skip as u64;
                if self.body_remaining > 0 {
                    return;
                }
            }

            let start = self.scanned.min(buf.len());
            let Some(end) = buf[start..]
                .windows(HEADER_END.len())
                .position(|window| window == HEADER_END)
                .map(|offset| start + offset + HEADER_END.len())
            else {
                if self.discarding {
                    // Keep a possible partial terminator.
                    let keep = buf.len().min(HEADER_END.len() - 1);
                    buf.advance(buf.len() - keep);
                }
                self.scanned = buf.len().saturating_sub(HEADER_END.len() - 1);
                return;
            };
            self.scanned = 0;

            let head = buf.split_to(end);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.messages += 1;
            self.body_remaining = content_length(&head).unwrap_or(0);
            debug!(
                "http {} header block of {} bytes, body {} bytes",
                side.as_str(),
                head.len(),
                self.body_remaining
            );
        }
    }
}

fn content_length(head: &[u8]) -> Option<u64> {
    head.split(|&byte| byte == b'\n').skip(1).find_map(|line| {
        let line = std::str::from_utf8(line).ok()?;
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("Content-Length")
            .then(|| value.trim().parse().ok())
            .flatten()
    })
}
