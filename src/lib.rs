#![doc(html_root_url = "https://docs.rs/memerge/latest")]
//! Public API for the `memerge` library.
//!
//! `memerge` reassembles application-layer messages from the TCP payload
//! fragments of a single flow and extracts metadata from them as they
//! complete: SMTP login credentials, envelope addresses and subject lines.
//!
//! A [`Task`] is created per flow and bound to a [`Protocol`]. The caller
//! feeds fragments with a [`Direction`] and [`Timestamp`] through
//! [`Task::run`] and collects [`Snapshot`]s with [`Task::take_metadata`].
//! [`FlowTable`] shards many tasks across threads, and the [`ffi`] module
//! exposes the same operations to C.

pub mod buffer;
pub mod config;
pub mod direction;
pub mod error;
pub mod ffi;
pub mod flow;
pub mod line;
pub mod metadata;
pub mod metrics;
pub mod parser;
pub mod protocol;
pub mod task;
pub mod timestamp;

pub use config::{AmbiguousDirectionPolicy, OverflowPolicy, TaskConfig};
pub use direction::{Direction, Side};
pub use error::{InvalidDiscriminant, RegistryError, TaskError};
pub use flow::FlowTable;
pub use metadata::{MetaRecord, SmtpKind, SmtpMeta, Snapshot};
pub use self::metrics::{BUFFER_OVERFLOWS, BYTES_FED, DISCARDED_BYTES, EXTRACTIONS, TASKS_ACTIVE};
pub use parser::{
    HttpParser,
    ParserConstructor,
    ParserRegistry,
    ProtocolParser,
    SmtpParser,
    SmtpState,
};
pub use protocol::Protocol;
pub use task::{DiscardReason, Task, TaskStats};
pub use timestamp::Timestamp;
