//! Test utilities for `memerge`.
//!
//! Fixtures for bound tasks and log capture, helpers that feed a transcript
//! to a [`Task`](memerge::Task) in arbitrary fragment splits, and a metrics
//! capture wrapper around `metrics_util`'s debugging recorder.
//!
//! ```rust
//! use memerge_testing::{SMTP_TRANSCRIPT, feed_collect, records, smtp_task, smtp_transcript_records};
//!
//! let mut task = smtp_task();
//! let snapshots = feed_collect(&mut task, SMTP_TRANSCRIPT.chunks(1));
//! assert_eq!(records(&snapshots), smtp_transcript_records());
//! ```

pub mod feed;
pub mod logging;
pub mod metrics;

pub use feed::{
    SMTP_TRANSCRIPT,
    feed_collect,
    feed_collect_dir,
    records,
    smtp_task,
    smtp_transcript_records,
    split_at_offsets,
};
pub use logging::{LoggerHandle, logger};
pub use self::metrics::{Recorded, capture, counter, gauge};
