#![cfg(feature = "metrics")]
//! Tests for `memerge` metrics emission.
//!
//! Counters and gauges are captured with
//! `metrics_util::debugging::DebuggingRecorder` installed as a thread-local
//! recorder around each scenario.

use std::num::NonZeroUsize;

use memerge::{
    Direction,
    OverflowPolicy,
    ParserRegistry,
    Protocol,
    Task,
    TaskConfig,
    Timestamp,
    metrics,
};
use memerge_testing::{capture, counter, gauge};
use rstest::rstest;

#[test]
fn task_lifetime_moves_active_gauge() {
    let mut live = None;
    let recorded = capture(|| {
        let first = Task::new();
        live = Some(Task::new());
        drop(first);
    });
    assert!(live.is_some());
    assert_eq!(gauge(&recorded, metrics::TASKS_ACTIVE), Some(1.0));

    let recorded = capture(|| drop(live.take()));
    assert_eq!(gauge(&recorded, metrics::TASKS_ACTIVE), Some(-1.0));
}

#[test]
fn unsupported_protocol_leaves_gauge_balanced() {
    let recorded = capture(|| {
        assert!(Task::with_protocol(Protocol::Http).is_err());
    });
    assert_eq!(gauge(&recorded, metrics::TASKS_ACTIVE), Some(0.0));
}

#[rstest]
#[case(Direction::ClientToServer, "c2s")]
#[case(Direction::ServerToClient, "s2c")]
#[case(Direction::Unknown, "unknown")]
fn fed_bytes_are_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let recorded = capture(|| {
        let mut task = Task::with_protocol(Protocol::Smtp).expect("smtp is registered");
        task.run(b"NOOP\r\n", direction, Timestamp::new(0));
    });
    assert_eq!(counter(&recorded, metrics::BYTES_FED, &[("direction", label)]), 6);
}

#[test]
fn extractions_are_labelled_by_kind() {
    let recorded = capture(|| {
        let mut task = Task::with_protocol(Protocol::Smtp).expect("smtp is registered");
        task.run(
            b"USER a\r\nPASS b\r\nRCPT TO:<c@example.org>\r\nRCPT TO:<d@example.org>\r\n",
            Direction::ClientToServer,
            Timestamp::new(0),
        );
    });

    let smtp = ("protocol", "smtp");
    assert_eq!(counter(&recorded, metrics::EXTRACTIONS, &[smtp, ("kind", "user")]), 1);
    assert_eq!(counter(&recorded, metrics::EXTRACTIONS, &[smtp, ("kind", "pass")]), 1);
    assert_eq!(counter(&recorded, metrics::EXTRACTIONS, &[smtp, ("kind", "rcpt_to")]), 2);
    assert_eq!(counter(&recorded, metrics::EXTRACTIONS, &[smtp]), 4);
}

#[test]
fn overflow_and_discards_are_counted() {
    let recorded = capture(|| {
        let config = TaskConfig::default()
            .max_buffered_bytes(NonZeroUsize::new(8).expect("non-zero"))
            .overflow_policy(OverflowPolicy::Discard)
            .log_overflows(false);
        let mut task = Task::with_registry(Protocol::Smtp, &ParserRegistry::default(), config)
            .expect("smtp is registered");
        task.run(b"0123456789", Direction::ClientToServer, Timestamp::new(0));
        task.run(b"ambiguous", Direction::BiDirectional, Timestamp::new(1));

        let mut bare = Task::new();
        bare.run(b"early", Direction::ClientToServer, Timestamp::new(2));
    });

    assert_eq!(counter(&recorded, metrics::BUFFER_OVERFLOWS, &[]), 1);
    assert_eq!(counter(&recorded, metrics::DISCARDED_BYTES, &[("reason", "overflow")]), 8);
    assert_eq!(
        counter(&recorded, metrics::DISCARDED_BYTES, &[("reason", "ambiguous_direction")]),
        9
    );
    assert_eq!(counter(&recorded, metrics::DISCARDED_BYTES, &[("reason", "unbound")]), 5);
}
