//! Extracted metadata and the snapshots handed to callers.
//!
//! A parser emits [`MetaRecord`] values as units complete. The task keeps the
//! most recent one as a pending [`Snapshot`]; retrieval moves it out, so a
//! snapshot owns every byte it refers to and outlives the task that produced
//! it.

use std::ffi::c_int;

use bincode::{
    Decode,
    Encode,
    error::{DecodeError, EncodeError},
};
use serde::{Deserialize, Serialize};

use crate::{error::InvalidDiscriminant, protocol::Protocol};

/// Category of an SMTP extraction.
///
/// The discriminants are part of the C ABI (`MetaSmtpType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum SmtpKind {
    /// Login name from `USER` or an `AUTH` exchange.
    User = 0,
    /// Password from `PASS` or an `AUTH LOGIN` exchange.
    Pass = 1,
    /// Envelope sender from `MAIL FROM`.
    MailFrom = 2,
    /// Envelope recipient from `RCPT TO`.
    RcptTo = 3,
    /// `Subject` header of a message.
    Subject = 4,
    /// No value.
    None = 5,
}

impl SmtpKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SmtpKind::User => "user",
            SmtpKind::Pass => "pass",
            SmtpKind::MailFrom => "mail_from",
            SmtpKind::RcptTo => "rcpt_to",
            SmtpKind::Subject => "subject",
            SmtpKind::None => "none",
        }
    }
}

impl TryFrom<c_int> for SmtpKind {
    type Error = InvalidDiscriminant;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SmtpKind::User),
            1 => Ok(SmtpKind::Pass),
            2 => Ok(SmtpKind::MailFrom),
            3 => Ok(SmtpKind::RcptTo),
            4 => Ok(SmtpKind::Subject),
            5 => Ok(SmtpKind::None),
            _ => Err(InvalidDiscriminant::new("smtp metadata kind", value)),
        }
    }
}

/// One SMTP extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SmtpMeta {
    kind: SmtpKind,
    value: Option<String>,
}

impl SmtpMeta {
    /// Build a record carrying `value`.
    #[must_use]
    pub fn new(kind: SmtpKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: Some(value.into()),
        }
    }

    /// The empty record, kind [`SmtpKind::None`] with no value.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            kind: SmtpKind::None,
            value: None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SmtpKind { self.kind }

    #[must_use]
    pub fn value(&self) -> Option<&str> { self.value.as_deref() }
}

/// Protocol-specific extraction emitted by a parser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum MetaRecord {
    /// An SMTP field.
    Smtp(SmtpMeta),
}

impl MetaRecord {
    /// Shorthand for an SMTP record with a value.
    #[must_use]
    pub fn smtp(kind: SmtpKind, value: impl Into<String>) -> Self {
        MetaRecord::Smtp(SmtpMeta::new(kind, value))
    }

    /// Label of the record kind, used in logs and metrics.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            MetaRecord::Smtp(meta) => meta.kind.as_str(),
        }
    }
}

/// Immutable, owned copy of the latest extraction from a task.
///
/// # Examples
///
/// ```
/// use memerge::{MetaRecord, Protocol, SmtpKind, Snapshot};
///
/// let snapshot = Snapshot::new(Protocol::Smtp, MetaRecord::smtp(SmtpKind::User, "alice"));
/// assert_eq!(snapshot.smtp_kind(), Some(SmtpKind::User));
/// assert_eq!(snapshot.value(), Some("alice"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Snapshot {
    protocol: Protocol,
    record: MetaRecord,
}

impl Snapshot {
    #[must_use]
    pub fn new(protocol: Protocol, record: MetaRecord) -> Self { Self { protocol, record } }

    /// Protocol of the task the record was extracted from.
    #[must_use]
    pub fn protocol(&self) -> Protocol { self.protocol }

    #[must_use]
    pub fn record(&self) -> &MetaRecord { &self.record }

    /// The SMTP record, if this snapshot carries one.
    #[must_use]
    pub fn smtp(&self) -> Option<&SmtpMeta> {
        match &self.record {
            MetaRecord::Smtp(meta) => Some(meta),
        }
    }

    #[must_use]
    pub fn smtp_kind(&self) -> Option<SmtpKind> { self.smtp().map(SmtpMeta::kind) }

    /// The extracted text, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match &self.record {
            MetaRecord::Smtp(meta) => meta.value(),
        }
    }

    /// Encode with `bincode`'s standard configuration for out-of-process
    /// sinks.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        bincode::encode_to_vec(self, bincode::config::standard())
    }

    /// Decode a snapshot produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if `bytes` is not a valid encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        bincode::decode_from_slice(bytes, bincode::config::standard()).map(|(snapshot, _)| snapshot)
    }
}
