//! Task configuration.
//!
//! [`TaskConfig`] bounds per-side memory and selects the deterministic
//! policies applied when a flow misbehaves: a unit that never terminates, or
//! traffic whose direction cannot be attributed to one side.

use std::num::NonZeroUsize;

use serde::{Deserialize, Deserializer, Serialize};

/// Default retained-bytes cap for each side of a task (32 KiB).
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 32 * 1024;

/// Upper bound applied to configured caps (16 MiB).
pub const MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_buffered_bytes(value: NonZeroUsize) -> NonZeroUsize {
    NonZeroUsize::new(value.get().min(MAX_BUFFERED_BYTES)).unwrap_or(value)
}

fn deserialize_buffered_bytes<'de, D>(deserializer: D) -> Result<NonZeroUsize, D::Error>
where
    D: Deserializer<'de>,
{
    NonZeroUsize::deserialize(deserializer).map(clamp_buffered_bytes)
}

/// What a task does when a side's buffer fills without the parser finding a
/// complete unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the buffered partial unit and resynchronise the parser at the
    /// next unit boundary. The side keeps processing subsequent input.
    #[default]
    Discard,

    /// Drop the buffered bytes and close the side. Later bytes for that side
    /// are discarded; the other side is unaffected.
    Close,
}

/// Where `BiDirectional` and `Unknown` fragments are routed.
///
/// Neither value has a buffer of its own, so the task needs an explicit rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiguousDirectionPolicy {
    /// Drop the fragment and count the bytes as discarded.
    #[default]
    Discard,
    /// Append the fragment to the client-side buffer.
    Client,
    /// Append the fragment to the server-side buffer.
    Server,
}

/// Per-task settings.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use memerge::config::{AmbiguousDirectionPolicy, OverflowPolicy, TaskConfig};
///
/// let config = TaskConfig::default()
///     .max_buffered_bytes(NonZeroUsize::new(4096).expect("non-zero"))
///     .overflow_policy(OverflowPolicy::Close)
///     .ambiguous_direction(AmbiguousDirectionPolicy::Client);
///
/// assert_eq!(config.max_buffered_bytes.get(), 4096);
/// assert_eq!(config.overflow_policy, OverflowPolicy::Close);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum bytes retained per side while waiting for a unit to complete.
    ///
    /// A unit (including its terminator) of up to this many bytes is always
    /// reassembled; a longer one triggers [`overflow_policy`](Self::overflow_policy).
    ///
    /// Default: 32 KiB. Deserialized values are clamped like the builder's.
    #[serde(deserialize_with = "deserialize_buffered_bytes")]
    pub max_buffered_bytes: NonZeroUsize,

    /// Policy applied when a side's buffer fills.
    ///
    /// Default: [`OverflowPolicy::Discard`].
    pub overflow_policy: OverflowPolicy,

    /// Routing for fragments without a single-side direction.
    ///
    /// Default: [`AmbiguousDirectionPolicy::Discard`].
    pub ambiguous_direction: AmbiguousDirectionPolicy,

    /// Whether overflows are logged at warn level.
    ///
    /// Default: true.
    pub log_overflows: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: NonZeroUsize::new(DEFAULT_MAX_BUFFERED_BYTES)
                .unwrap_or(NonZeroUsize::MIN),
            overflow_policy: OverflowPolicy::default(),
            ambiguous_direction: AmbiguousDirectionPolicy::default(),
            log_overflows: true,
        }
    }
}

impl TaskConfig {
    /// Set the per-side retained-bytes cap, clamped to
    /// [`MAX_BUFFERED_BYTES`].
    #[must_use]
    pub fn max_buffered_bytes(mut self, limit: NonZeroUsize) -> Self {
        self.max_buffered_bytes = clamp_buffered_bytes(limit);
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the routing for `BiDirectional` and `Unknown` fragments.
    #[must_use]
    pub fn ambiguous_direction(mut self, policy: AmbiguousDirectionPolicy) -> Self {
        self.ambiguous_direction = policy;
        self
    }

    /// Set whether overflows are logged.
    #[must_use]
    pub fn log_overflows(mut self, enabled: bool) -> Self {
        self.log_overflows = enabled;
        self
    }
}
