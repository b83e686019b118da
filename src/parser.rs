//! Incremental protocol parsers.
//!
//! A [`ProtocolParser`] is a state machine advanced by its owning
//! [`Task`](crate::Task). Each call hands it one side's buffer; the parser
//! consumes every complete unit from the front, appends zero or one
//! [`MetaRecord`] per unit to `events`, and leaves a trailing partial unit in
//! place for the next call.
//!
//! Parsers are created through a [`ParserRegistry`], which maps a
//! [`Protocol`] tag to a constructor.

use std::fmt;

use bytes::BytesMut;

use crate::{direction::Side, metadata::MetaRecord, protocol::Protocol};

pub mod http;
pub mod registry;
pub mod smtp;

pub use http::HttpParser;
pub use registry::{ParserConstructor, ParserRegistry};
pub use smtp::{SmtpParser, SmtpState};

/// Per-flow protocol state machine.
///
/// Implementations must never panic on malformed input: unrecognised units
/// are consumed without an event and the parser stays ready for the next
/// one.
pub trait ProtocolParser: fmt::Debug + Send + Sync + 'static {
    /// Protocol this parser understands.
    fn protocol(&self) -> Protocol;

    /// Consume complete units from `buf`, which holds the unparsed bytes of
    /// `side`, pushing extracted records onto `events` in wire order.
    fn parse(&mut self, side: Side, buf: &mut BytesMut, events: &mut Vec<MetaRecord>);

    /// The buffer for `side` was cleared mid-unit. Skip input up to the next
    /// unit boundary before interpreting bytes again.
    fn resync(&mut self, side: Side);
}
