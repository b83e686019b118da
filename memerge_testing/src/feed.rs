//! Helpers for feeding transcripts to tasks in arbitrary fragment splits.

use memerge::{Direction, MetaRecord, Protocol, Snapshot, Task, Timestamp};
use rstest::fixture;

/// Task bound to SMTP with the default configuration.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn smtp_task() -> Task { Task::with_protocol(Protocol::Smtp).expect("smtp is registered") }

/// Client side of an SMTP dialogue exercising every extracted field.
///
/// The folded `Subject` continuation is written as `\x20` because a string
/// continuation escape swallows leading spaces.
pub const SMTP_TRANSCRIPT: &[u8] = b"EHLO client.example.org\r\n\
AUTH LOGIN\r\n\
YWxpY2U=\r\n\
c2VjcmV0\r\n\
MAIL FROM:<alice@example.org> SIZE=120\r\n\
RCPT TO:<bob@example.org>\r\n\
RCPT TO:\r\n\
<carol@example.org>\r\n\
DATA\r\n\
From: alice@example.org\r\n\
Subject: Quarterly\r\n\
\x20numbers\r\n\
\r\n\
USER not-a-command\r\n\
.\r\n\
QUIT\r\n";

/// Records extracted from [`SMTP_TRANSCRIPT`], in wire order.
#[must_use]
pub fn smtp_transcript_records() -> Vec<MetaRecord> {
    use memerge::SmtpKind::{MailFrom, Pass, RcptTo, Subject, User};

    vec![
        MetaRecord::smtp(User, "YWxpY2U="),
        MetaRecord::smtp(Pass, "c2VjcmV0"),
        MetaRecord::smtp(MailFrom, "alice@example.org"),
        MetaRecord::smtp(RcptTo, "bob@example.org"),
        MetaRecord::smtp(RcptTo, "carol@example.org"),
        MetaRecord::smtp(Subject, "Quarterly numbers"),
    ]
}

/// Split `payload` at the given offsets. Offsets past the end, duplicates and
/// unsorted input are tolerated.
#[must_use]
pub fn split_at_offsets<'a>(payload: &'a [u8], offsets: &[usize]) -> Vec<&'a [u8]> {
    let mut cuts: Vec<usize> = offsets.iter().map(|&o| o.min(payload.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(&payload[start..cut]);
        start = cut;
    }
    chunks.push(&payload[start..]);
    chunks
}

/// Feed `chunks` client-to-server with increasing timestamps, taking the
/// pending snapshot after every fragment.
pub fn feed_collect<'a>(task: &mut Task, chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<Snapshot> {
    feed_collect_dir(task, Direction::ClientToServer, chunks)
}

/// As [`feed_collect`] for an arbitrary direction.
pub fn feed_collect_dir<'a>(
    task: &mut Task,
    direction: Direction,
    chunks: impl IntoIterator<Item = &'a [u8]>,
) -> Vec<Snapshot> {
    let start = task.last_timestamp().map_or(0, |ts| ts.get() + 1);
    chunks
        .into_iter()
        .zip(start..)
        .filter_map(|(chunk, ts)| {
            task.run(chunk, direction, Timestamp::new(ts));
            task.take_metadata()
        })
        .collect()
}

/// Records carried by `snapshots`.
#[must_use]
pub fn records(snapshots: &[Snapshot]) -> Vec<MetaRecord> {
    snapshots.iter().map(|s| s.record().clone()).collect()
}
