//! Reassembly behaviour across fragment boundaries.
//!
//! Properties are checked with generated split points: the records a parser
//! extracts must not depend on how the caller's capture layer fragmented the
//! byte stream.

use std::num::NonZeroUsize;

use bytes::BytesMut;
use memerge::{
    Direction,
    MetaRecord,
    OverflowPolicy,
    ParserRegistry,
    Protocol,
    ProtocolParser,
    Side,
    SmtpKind,
    SmtpParser,
    Task,
    TaskConfig,
    Timestamp,
};
use memerge_testing::{
    SMTP_TRANSCRIPT,
    feed_collect,
    records,
    smtp_task,
    smtp_transcript_records,
    split_at_offsets,
};
use proptest::prelude::*;
use rstest::rstest;

fn parse_chunks(chunks: &[&[u8]]) -> Vec<MetaRecord> {
    let mut parser = SmtpParser::new();
    let mut buf = BytesMut::new();
    let mut events = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        parser.parse(Side::Client, &mut buf, &mut events);
    }
    events
}

fn is_subsequence(needle: &[MetaRecord], haystack: &[MetaRecord]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|item| rest.any(|candidate| candidate == item))
}

prop_compose! {
    fn split_points()
        (offsets in proptest::collection::vec(0..=SMTP_TRANSCRIPT.len(), 0..24))
        -> Vec<usize> {
            offsets
        }
}

prop_compose! {
    fn noise()
        (bytes in proptest::collection::vec(
            any::<u8>().prop_filter("letters and LF form commands", |b| {
                !b.is_ascii_alphabetic() && *b != b'\n'
            }),
            0..300,
        )) -> Vec<u8> {
            bytes
        }
}

proptest! {
    #[test]
    fn parser_events_ignore_fragmentation(offsets in split_points()) {
        let chunks = split_at_offsets(SMTP_TRANSCRIPT, &offsets);
        prop_assert_eq!(parse_chunks(&chunks), smtp_transcript_records());
    }

    #[test]
    fn task_snapshots_follow_wire_order(offsets in split_points()) {
        let mut task = smtp_task();
        let snapshots = feed_collect(&mut task, split_at_offsets(SMTP_TRANSCRIPT, &offsets));
        let expected = smtp_transcript_records();
        let seen = records(&snapshots);

        prop_assert!(is_subsequence(&seen, &expected));
        prop_assert_eq!(seen.last(), expected.last());
        let stats = task.stats();
        prop_assert_eq!(stats.extracted, expected.len() as u64);
        prop_assert_eq!(stats.superseded + seen.len() as u64, stats.extracted);
    }

    #[test]
    fn noise_is_absorbed_and_parsing_recovers(noise in noise()) {
        let config = TaskConfig::default()
            .max_buffered_bytes(NonZeroUsize::new(64).expect("non-zero"))
            .overflow_policy(OverflowPolicy::Discard)
            .log_overflows(false);
        let mut task = Task::with_registry(Protocol::Smtp, &ParserRegistry::default(), config)
            .expect("smtp is registered");

        task.run(b"EHLO a\r\n", Direction::ClientToServer, Timestamp::new(0));
        task.run(&noise, Direction::ClientToServer, Timestamp::new(1));
        task.run(b"\r\nUSER zed\r\n", Direction::ClientToServer, Timestamp::new(2));

        let snapshot = task.take_metadata();
        prop_assert_eq!(snapshot.as_ref().and_then(|s| s.value()), Some("zed"));
        prop_assert!(task.buffered(Side::Client) < 64);
    }
}

#[rstest]
#[case::whole(&[])]
#[case::every_byte(&(1..SMTP_TRANSCRIPT.len()).collect::<Vec<_>>()[..])]
#[case::mid_terminator(&[24, 25, 26][..])]
fn fixed_splits_extract_full_transcript(#[case] offsets: &[usize]) {
    let chunks = split_at_offsets(SMTP_TRANSCRIPT, offsets);
    assert_eq!(parse_chunks(&chunks), smtp_transcript_records());
}

#[test]
fn user_split_mid_value() {
    let mut task = smtp_task();
    let snapshots = feed_collect(&mut task, [&b"USER ali"[..], b"ce\r\n"]);

    assert_eq!(records(&snapshots), vec![MetaRecord::smtp(SmtpKind::User, "alice")]);
    assert!(task.take_metadata().is_none());
}

#[test]
fn envelope_order_is_preserved_per_fragment() {
    let mut task = smtp_task();
    let snapshots = feed_collect(
        &mut task,
        [&b"MAIL FROM:<a@example.org>\r\n"[..], b"RCPT TO:<b@example.org>\r\n"],
    );

    assert_eq!(
        records(&snapshots),
        vec![
            MetaRecord::smtp(SmtpKind::MailFrom, "a@example.org"),
            MetaRecord::smtp(SmtpKind::RcptTo, "b@example.org"),
        ]
    );
}

#[test]
fn garbage_then_recovery() {
    let mut task = smtp_task();
    let snapshots = feed_collect(
        &mut task,
        [&b"\x16\x03\x01 not smtp at all\r\n"[..], b"USER ok\r\n"],
    );

    assert_eq!(records(&snapshots), vec![MetaRecord::smtp(SmtpKind::User, "ok")]);
}
