//! Error types for task setup and parser registration.
//!
//! Runtime feeding never fails: malformed input and overflow are handled by
//! parser recovery and [`OverflowPolicy`](crate::config::OverflowPolicy).
//! The errors here cover the setup-time outcomes a caller must branch on.

use std::ffi::c_int;

use thiserror::Error;

use crate::protocol::Protocol;

/// Failure to create or bind a task.
///
/// `Unsupported` is an expected outcome for identifiers that exist but have
/// no registered parser; it is distinct from allocation failure, which never
/// surfaces as a `TaskError`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// No parser constructor is registered for the protocol.
    #[error("no parser registered for protocol {0}")]
    Unsupported(Protocol),

    /// The task already has a protocol; bindings are permanent.
    #[error("task already bound to {bound}, refusing to bind {requested}")]
    AlreadyBound {
        /// Protocol the task is bound to.
        bound: Protocol,
        /// Protocol the caller asked for.
        requested: Protocol,
    },
}

/// Failure to register a parser constructor.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A constructor for this protocol was already registered.
    #[error("parser for protocol {0} was already registered")]
    DuplicateParser(Protocol),
}

/// An integer received across the C boundary that names no enum variant.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} value {value}")]
pub struct InvalidDiscriminant {
    kind: &'static str,
    value: c_int,
}

impl InvalidDiscriminant {
    pub(crate) const fn new(kind: &'static str, value: c_int) -> Self { Self { kind, value } }

    /// The rejected raw value.
    #[must_use]
    pub const fn value(&self) -> c_int { self.value }
}
