//! Concurrent table of tasks keyed by flow.
//!
//! `FlowTable` lets a capture pipeline shard flows across threads without
//! wrapping each [`Task`] in its own lock. Entries are locked per shard by
//! [`DashMap`], so fragments for different flows proceed in parallel while
//! fragments for one flow are applied in call order.

use std::hash::Hash;

use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;

use crate::{
    config::TaskConfig,
    direction::Direction,
    error::TaskError,
    metadata::Snapshot,
    parser::ParserRegistry,
    protocol::Protocol,
    task::{Task, TaskStats},
    timestamp::Timestamp,
};

/// Tasks keyed by a caller-defined flow identifier.
///
/// # Examples
///
/// ```
/// use memerge::{Direction, FlowTable, Protocol, Timestamp};
///
/// let flows = FlowTable::new();
/// flows
///     .run(7_u32, Protocol::Smtp, b"RCPT TO:<b@example.org>\r\n", Direction::ClientToServer, Timestamp::new(1))
///     .expect("smtp is registered");
/// let snapshot = flows.take_metadata(&7).expect("recipient extracted");
/// assert_eq!(snapshot.value(), Some("b@example.org"));
/// ```
#[derive(Debug)]
pub struct FlowTable<K: Eq + Hash> {
    tasks: DashMap<K, Task>,
    registry: ParserRegistry,
    config: TaskConfig,
}

impl<K: Eq + Hash> Default for FlowTable<K> {
    fn default() -> Self { Self::new() }
}

impl<K: Eq + Hash> FlowTable<K> {
    /// Create an empty table using the default registry and configuration.
    #[must_use]
    pub fn new() -> Self { Self::with_registry(ParserRegistry::default(), TaskConfig::default()) }

    /// Create an empty table whose tasks use `registry` and `config`.
    #[must_use]
    pub fn with_registry(registry: ParserRegistry, config: TaskConfig) -> Self {
        Self {
            tasks: DashMap::new(),
            registry,
            config,
        }
    }

    /// Feed a fragment to the task for `key`, creating it on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unsupported`] if a new flow names a protocol with
    /// no registered parser (no entry is created), or
    /// [`TaskError::AlreadyBound`] if the flow exists with another protocol.
    pub fn run(
        &self,
        key: K,
        protocol: Protocol,
        payload: &[u8],
        direction: Direction,
        timestamp: Timestamp,
    ) -> Result<(), TaskError> {
        match self.tasks.entry(key) {
            Entry::Occupied(mut entry) => {
                let task = entry.get_mut();
                if let Some(bound) = task.protocol().filter(|&bound| bound != protocol) {
                    return Err(TaskError::AlreadyBound {
                        bound,
                        requested: protocol,
                    });
                }
                task.run(payload, direction, timestamp);
            }
            Entry::Vacant(entry) => {
                let mut task = Task::with_registry(protocol, &self.registry, self.config)?;
                task.run(payload, direction, timestamp);
                entry.insert(task);
            }
        }
        Ok(())
    }

    /// Take the pending snapshot of the flow, if any.
    pub fn take_metadata(&self, key: &K) -> Option<Snapshot> {
        self.tasks.get_mut(key)?.take_metadata()
    }

    /// Remove the flow, returning its pending snapshot.
    pub fn close(&self, key: &K) -> Option<Snapshot> {
        let (_, mut task) = self.tasks.remove(key)?;
        task.take_metadata()
    }

    /// Counters for the flow.
    #[must_use]
    pub fn stats(&self, key: &K) -> Option<TaskStats> { self.tasks.get(key).map(|task| task.stats()) }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool { self.tasks.contains_key(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.tasks.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }
}

impl<K: Eq + Hash + Clone> FlowTable<K> {
    /// Take every pending snapshot.
    ///
    /// Holds per-shard write locks while iterating.
    #[must_use]
    pub fn drain_metadata(&self) -> Vec<(K, Snapshot)> {
        let mut drained = Vec::new();
        for mut entry in self.tasks.iter_mut() {
            if let Some(snapshot) = entry.value_mut().take_metadata() {
                drained.push((entry.key().clone(), snapshot));
            }
        }
        drained
    }

    /// Remove flows whose last fragment is at least `idle` older than `now`,
    /// returning their keys.
    ///
    /// Pending snapshots of evicted flows are dropped; call
    /// [`drain_metadata`](Self::drain_metadata) first to keep them.
    pub fn evict_idle(&self, now: Timestamp, idle: u64) -> Vec<K> {
        let mut evicted = Vec::new();
        self.tasks.retain(|key, task| {
            let fresh = task
                .last_timestamp()
                .is_none_or(|last| now.saturating_since(last) < idle);
            if !fresh {
                evicted.push(key.clone());
            }
            fresh
        });
        if !evicted.is_empty() {
            debug!("evicted {} idle flows at {now}", evicted.len());
        }
        evicted
    }
}
