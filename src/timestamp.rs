//! Caller-supplied packet timestamps.
//!
//! The engine never interprets the unit; it only compares values for anomaly
//! accounting and idle eviction.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Opaque, monotonically-intended timestamp attached to each fragment.
///
/// # Examples
///
/// ```
/// use memerge::Timestamp;
/// let ts = Timestamp::from(999_u64);
/// assert_eq!(ts.get(), 999);
/// assert_eq!(ts.to_string(), "999");
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    From,
    Serialize,
    Deserialize,
)]
#[display("{_0}")]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct a timestamp from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self { Self(value) }

    /// Return the raw value.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    #[must_use]
    pub const fn saturating_since(self, earlier: Timestamp) -> u64 { self.0.saturating_sub(earlier.0) }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self { value.0 }
}
