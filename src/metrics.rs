//! Metric names and recording helpers for `memerge`.
//!
//! Recording goes through the [`metrics`](https://docs.rs/metrics) facade; the
//! embedding application installs whatever recorder it likes. With the
//! `metrics` feature disabled every helper compiles to nothing.

use crate::{direction::Direction, metadata::MetaRecord, protocol::Protocol, task::DiscardReason};

/// Gauge of live tasks.
pub const TASKS_ACTIVE: &str = "memerge_tasks_active";
/// Counter of payload bytes fed to tasks, labelled by `direction`.
pub const BYTES_FED: &str = "memerge_bytes_fed_total";
/// Counter of extraction events, labelled by `protocol` and `kind`.
pub const EXTRACTIONS: &str = "memerge_extractions_total";
/// Counter of side buffers that filled without a complete unit.
pub const BUFFER_OVERFLOWS: &str = "memerge_buffer_overflows_total";
/// Counter of bytes dropped without parsing, labelled by `reason`.
pub const DISCARDED_BYTES: &str = "memerge_discarded_bytes_total";

/// Increment the active tasks gauge.
pub fn inc_tasks() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(TASKS_ACTIVE).increment(1.0);
}

/// Decrement the active tasks gauge.
pub fn dec_tasks() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(TASKS_ACTIVE).decrement(1.0);
}

/// Record `len` payload bytes fed in `direction`.
pub fn add_bytes_fed(direction: Direction, len: usize) {
    #[cfg(feature = "metrics")]
    metrics::counter!(BYTES_FED, "direction" => direction.as_str()).increment(as_u64(len));
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, len);
}

/// Record an extraction event.
pub fn inc_extractions(protocol: Protocol, record: &MetaRecord) {
    #[cfg(feature = "metrics")]
    metrics::counter!(
        EXTRACTIONS,
        "protocol" => protocol.as_str(),
        "kind" => record.kind_str()
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (protocol, record);
}

/// Record a buffer overflow.
pub fn inc_overflows() {
    #[cfg(feature = "metrics")]
    metrics::counter!(BUFFER_OVERFLOWS).increment(1);
}

/// Record `len` bytes dropped for `reason`.
pub fn add_discarded(reason: DiscardReason, len: usize) {
    #[cfg(feature = "metrics")]
    metrics::counter!(DISCARDED_BYTES, "reason" => reason.as_str()).increment(as_u64(len));
    #[cfg(not(feature = "metrics"))]
    let _ = (reason, len);
}

#[cfg(feature = "metrics")]
fn as_u64(len: usize) -> u64 { u64::try_from(len).unwrap_or(u64::MAX) }
