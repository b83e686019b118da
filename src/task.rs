//! Per-flow reassembly task.
//!
//! A [`Task`] owns one [`ReassemblyBuffer`] per side of a flow and the parser
//! bound to it. Each call to [`Task::run`] appends a payload fragment to the
//! right side, drives the parser over complete units, and keeps the most
//! recent extraction as a pending [`Snapshot`] until the caller takes it.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    buffer::ReassemblyBuffer,
    config::{AmbiguousDirectionPolicy, OverflowPolicy, TaskConfig},
    direction::{Direction, Side},
    error::TaskError,
    metadata::{MetaRecord, Snapshot},
    metrics,
    parser::{ParserRegistry, ProtocolParser},
    protocol::Protocol,
    timestamp::Timestamp,
};

/// Why payload bytes were dropped without reaching a parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// The task has no protocol yet.
    Unbound,
    /// The fragment was `BiDirectional` or `Unknown` and the policy drops it.
    AmbiguousDirection,
    /// The side was closed by [`OverflowPolicy::Close`].
    SideClosed,
    /// A buffered partial unit was dropped on overflow.
    Overflow,
}

impl DiscardReason {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Unbound => "unbound",
            DiscardReason::AmbiguousDirection => "ambiguous_direction",
            DiscardReason::SideClosed => "side_closed",
            DiscardReason::Overflow => "overflow",
        }
    }
}

/// Running counters for one task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Bytes appended to a side buffer.
    pub accepted_bytes: u64,
    /// Bytes dropped without being parsed, for any [`DiscardReason`].
    pub discarded_bytes: u64,
    /// Times a side buffer filled without a complete unit.
    pub overflows: u64,
    /// Extraction events emitted by the parser.
    pub extracted: u64,
    /// Events replaced by a newer one before the caller took them.
    pub superseded: u64,
    /// Fragments whose timestamp was older than the previous fragment's.
    pub out_of_order_timestamps: u64,
}

#[derive(Debug)]
struct Binding {
    protocol: Protocol,
    parser: Box<dyn ProtocolParser>,
}

/// Reassembly and extraction state for one flow.
///
/// A task is single-owner: every mutating operation takes `&mut self`. Use
/// [`FlowTable`](crate::FlowTable) to share many flows across threads.
///
/// # Examples
///
/// ```
/// use memerge::{Direction, Protocol, SmtpKind, Task, Timestamp};
///
/// let mut task = Task::with_protocol(Protocol::Smtp).expect("smtp is registered");
/// task.run(b"USER ali", Direction::ClientToServer, Timestamp::new(1));
/// assert!(task.take_metadata().is_none());
///
/// task.run(b"ce\r\n", Direction::ClientToServer, Timestamp::new(2));
/// let snapshot = task.take_metadata().expect("user extracted");
/// assert_eq!(snapshot.smtp_kind(), Some(SmtpKind::User));
/// assert_eq!(snapshot.value(), Some("alice"));
/// assert!(task.take_metadata().is_none());
/// ```
#[derive(Debug)]
pub struct Task {
    binding: Option<Binding>,
    client: ReassemblyBuffer,
    server: ReassemblyBuffer,
    pending: Option<Snapshot>,
    events: Vec<MetaRecord>,
    last_timestamp: Option<Timestamp>,
    last_direction: Option<Direction>,
    stats: TaskStats,
    config: TaskConfig,
}

impl Default for Task {
    fn default() -> Self { Self::new() }
}

impl Task {
    /// Create a task with no protocol and the default configuration.
    ///
    /// Payload fed before [`bind_protocol`](Self::bind_protocol) is
    /// discarded.
    #[must_use]
    pub fn new() -> Self { Self::with_config(TaskConfig::default()) }

    /// Create an unbound task with `config`.
    #[must_use]
    pub fn with_config(config: TaskConfig) -> Self {
        metrics::inc_tasks();
        Self {
            binding: None,
            client: ReassemblyBuffer::new(config.max_buffered_bytes),
            server: ReassemblyBuffer::new(config.max_buffered_bytes),
            pending: None,
            events: Vec::new(),
            last_timestamp: None,
            last_direction: None,
            stats: TaskStats::default(),
            config,
        }
    }

    /// Create a task bound to `protocol` using the default registry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unsupported`] if no parser is registered for
    /// `protocol`.
    pub fn with_protocol(protocol: Protocol) -> Result<Self, TaskError> {
        Self::with_registry(protocol, &ParserRegistry::default(), TaskConfig::default())
    }

    /// Create a task bound to `protocol` using `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unsupported`] if `registry` has no parser for
    /// `protocol`.
    pub fn with_registry(
        protocol: Protocol,
        registry: &ParserRegistry,
        config: TaskConfig,
    ) -> Result<Self, TaskError> {
        let mut task = Self::with_config(config);
        task.bind_with(protocol, registry)?;
        Ok(task)
    }

    /// Bind an unbound task to `protocol` using the default registry.
    ///
    /// # Errors
    ///
    /// See [`bind_with`](Self::bind_with).
    pub fn bind_protocol(&mut self, protocol: Protocol) -> Result<(), TaskError> {
        self.bind_with(protocol, &ParserRegistry::default())
    }

    /// Bind an unbound task to `protocol` using `registry`.
    ///
    /// On error the task is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::AlreadyBound`] if the task already has a
    /// protocol, or [`TaskError::Unsupported`] if `registry` has no parser
    /// for `protocol`.
    pub fn bind_with(
        &mut self,
        protocol: Protocol,
        registry: &ParserRegistry,
    ) -> Result<(), TaskError> {
        if let Some(binding) = &self.binding {
            return Err(TaskError::AlreadyBound {
                bound: binding.protocol,
                requested: protocol,
            });
        }
        let parser = registry.create(protocol)?;
        self.binding = Some(Binding { protocol, parser });
        Ok(())
    }

    /// Feed one payload fragment.
    ///
    /// The fragment is appended to the buffer of the side selected by
    /// `direction` and the parser consumes every complete unit. Malformed
    /// input and overflow are absorbed here: this never fails and never
    /// panics on payload content.
    pub fn run(&mut self, payload: &[u8], direction: Direction, timestamp: Timestamp) {
        self.observe(direction, timestamp);
        metrics::add_bytes_fed(direction, payload.len());
        if payload.is_empty() {
            return;
        }

        if self.binding.is_none() {
            debug!("discarding {} bytes fed to unbound task", payload.len());
            self.discard(DiscardReason::Unbound, payload.len());
            return;
        }
        let Some(side) = self.route(direction) else {
            debug!(
                "discarding {} bytes with {} direction",
                payload.len(),
                direction.as_str()
            );
            self.discard(DiscardReason::AmbiguousDirection, payload.len());
            return;
        };

        self.feed(side, payload);
        self.publish();
    }

    /// Take the pending snapshot, leaving none behind.
    ///
    /// Returns `None` when nothing was extracted since the last call.
    pub fn take_metadata(&mut self) -> Option<Snapshot> { self.pending.take() }

    /// Whether a snapshot is waiting to be taken.
    #[must_use]
    pub fn has_metadata(&self) -> bool { self.pending.is_some() }

    /// Bound protocol, or `None` for a bare task.
    #[must_use]
    pub fn protocol(&self) -> Option<Protocol> { self.binding.as_ref().map(|b| b.protocol) }

    #[must_use]
    pub fn config(&self) -> &TaskConfig { &self.config }

    #[must_use]
    pub fn stats(&self) -> TaskStats { self.stats }

    /// Timestamp of the most recent fragment.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<Timestamp> { self.last_timestamp }

    /// Direction of the most recent fragment.
    #[must_use]
    pub fn last_direction(&self) -> Option<Direction> { self.last_direction }

    /// Bytes buffered on `side` awaiting a complete unit.
    #[must_use]
    pub fn buffered(&self, side: Side) -> usize { self.buffer(side).len() }

    /// Whether `side` was closed by [`OverflowPolicy::Close`].
    #[must_use]
    pub fn is_side_closed(&self, side: Side) -> bool { self.buffer(side).is_closed() }

    fn buffer(&self, side: Side) -> &ReassemblyBuffer {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }

    fn observe(&mut self, direction: Direction, timestamp: Timestamp) {
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                self.stats.out_of_order_timestamps += 1;
                debug!("timestamp {timestamp} precedes previous fragment at {previous}");
            }
        }
        self.last_timestamp = Some(timestamp);
        self.last_direction = Some(direction);
    }

    fn route(&self, direction: Direction) -> Option<Side> {
        direction.side().or(match self.config.ambiguous_direction {
            AmbiguousDirectionPolicy::Discard => None,
            AmbiguousDirectionPolicy::Client => Some(Side::Client),
            AmbiguousDirectionPolicy::Server => Some(Side::Server),
        })
    }

    fn discard(&mut self, reason: DiscardReason, len: usize) {
        self.stats.discarded_bytes += len as u64;
        metrics::add_discarded(reason, len);
    }

    // Append in slices that fit, parsing after each so complete units free
    // room before the next slice lands.
    fn feed(&mut self, side: Side, payload: &[u8]) {
        let Self {
            binding,
            client,
            server,
            events,
            stats,
            config,
            ..
        } = self;
        let Some(Binding { parser, .. }) = binding.as_mut() else {
            return;
        };
        let buffer = match side {
            Side::Client => client,
            Side::Server => server,
        };

        let mut rest = payload;
        while !rest.is_empty() {
            if buffer.is_closed() {
                stats.discarded_bytes += rest.len() as u64;
                metrics::add_discarded(DiscardReason::SideClosed, rest.len());
                return;
            }

            let taken = buffer.append(rest);
            rest = &rest[taken..];
            stats.accepted_bytes += taken as u64;
            parser.parse(side, buffer.bytes_mut(), events);

            if buffer.is_full() {
                stats.overflows += 1;
                metrics::inc_overflows();
                let dropped = match config.overflow_policy {
                    OverflowPolicy::Discard => {
                        // The parser trims the abandoned unit itself so a
                        // partial terminator at the cap survives.
                        parser.resync(side);
                        let full = buffer.len();
                        parser.parse(side, buffer.bytes_mut(), events);
                        if buffer.is_full() {
                            buffer.clear();
                        }
                        full - buffer.len()
                    }
                    OverflowPolicy::Close => buffer.close(),
                };
                stats.discarded_bytes += dropped as u64;
                metrics::add_discarded(DiscardReason::Overflow, dropped);
                if config.log_overflows {
                    warn!(
                        "{} buffer overflow: dropped {dropped} bytes of an unterminated unit \
                         (limit {}, policy {:?})",
                        side.as_str(),
                        buffer.limit(),
                        config.overflow_policy
                    );
                }
            }
        }
    }

    fn publish(&mut self) {
        let Some(protocol) = self.protocol() else {
            self.events.clear();
            return;
        };
        for record in self.events.drain(..) {
            self.stats.extracted += 1;
            metrics::inc_extractions(protocol, &record);
            if let Some(previous) = self.pending.replace(Snapshot::new(protocol, record)) {
                self.stats.superseded += 1;
                debug!(
                    "{protocol} {} event superseded before retrieval",
                    previous.record().kind_str()
                );
            }
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) { metrics::dec_tasks(); }
}
