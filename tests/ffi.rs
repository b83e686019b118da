//! Round trips through the C ABI.
//!
//! These tests call the exported functions the way a C caller would: raw
//! handles, integer enum values and strings released with `meta_str_free`.

use std::ffi::{CStr, c_char, c_int};

use memerge::ffi::{
    PARSER_UNDEFINED,
    meta_free,
    meta_protocol,
    meta_str_free,
    smtp_meta_mail_from,
    smtp_meta_pass,
    smtp_meta_rcpt_to,
    smtp_meta_subject,
    smtp_meta_type,
    smtp_meta_user,
    smtp_meta_value,
    task_free,
    task_get_meta,
    task_init_parser,
    task_new,
    task_new_with_parser,
    task_protocol,
    task_run,
};
use memerge::{Task, ffi};
use rstest::rstest;

const SMTP: c_int = 0;
const HTTP: c_int = 1;
const C2S: c_int = 0;
const S2C: c_int = 1;
const BIDIR: c_int = 2;

const META_USER: c_int = 0;
const META_PASS: c_int = 1;
const META_MAIL_FROM: c_int = 2;
const META_RCPT_TO: c_int = 3;
const META_SUBJECT: c_int = 4;
const META_NONE: c_int = 5;

fn run(task: *mut Task, bytes: &[u8], dir: c_int, ts: u64) {
    // SAFETY: `task` is live and `bytes` is a valid slice.
    unsafe { task_run(task, bytes.as_ptr(), bytes.len(), dir, ts) };
}

// Copy and release a string returned by an accessor.
fn take_string(raw: *mut c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    // SAFETY: non-null accessor results are NUL-terminated and owned by us.
    let value = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
    // SAFETY: released exactly once.
    unsafe { meta_str_free(raw) };
    Some(value)
}

#[test]
fn smtp_user_extracted_across_packets() {
    let task = task_new_with_parser(SMTP);
    assert!(!task.is_null());

    run(task, b"USER ali", C2S, 1);
    // SAFETY: `task` is live.
    assert!(unsafe { task_get_meta(task) }.is_null());
    run(task, b"ce\r\n", C2S, 2);

    // SAFETY: `task` is live.
    let meta = unsafe { task_get_meta(task) };
    assert!(!meta.is_null());
    // SAFETY: `meta` is live until `meta_free` below.
    unsafe {
        assert_eq!(meta_protocol(meta), SMTP);
        assert_eq!(smtp_meta_type(meta), META_USER);
        assert_eq!(take_string(smtp_meta_user(meta)).as_deref(), Some("alice"));
        assert_eq!(take_string(smtp_meta_value(meta)).as_deref(), Some("alice"));
        assert_eq!(take_string(smtp_meta_pass(meta)), None);
        meta_free(meta);
    }

    // SAFETY: `task` is live, then freed exactly once.
    unsafe {
        assert!(task_get_meta(task).is_null());
        task_free(task);
    }
}

#[rstest]
#[case(b"PASS pw\r\n", META_PASS, "pw")]
#[case(b"MAIL FROM:<a@example.org>\r\n", META_MAIL_FROM, "a@example.org")]
#[case(b"RCPT TO:<b@example.org>\r\n", META_RCPT_TO, "b@example.org")]
#[case(b"DATA\r\nSubject: hi\r\n\r\n", META_SUBJECT, "hi")]
fn typed_accessors_match_kind(#[case] input: &[u8], #[case] kind: c_int, #[case] value: &str) {
    let task = task_new_with_parser(SMTP);
    run(task, input, C2S, 0);

    // SAFETY: `task` and `meta` are live until freed at the end.
    unsafe {
        let meta = task_get_meta(task);
        assert!(!meta.is_null());
        assert_eq!(smtp_meta_type(meta), kind);

        let accessors: [(c_int, unsafe extern "C" fn(*const memerge::Snapshot) -> *mut c_char); 5] = [
            (META_USER, smtp_meta_user),
            (META_PASS, smtp_meta_pass),
            (META_MAIL_FROM, smtp_meta_mail_from),
            (META_RCPT_TO, smtp_meta_rcpt_to),
            (META_SUBJECT, smtp_meta_subject),
        ];
        for (accessor_kind, accessor) in accessors {
            let expected = (accessor_kind == kind).then_some(value);
            assert_eq!(take_string(accessor(meta)).as_deref(), expected);
        }

        meta_free(meta);
        task_free(task);
    }
}

#[rstest]
#[case::http_unsupported(HTTP)]
#[case::out_of_range(7)]
#[case::negative(-1)]
fn task_new_with_parser_rejects(#[case] parser_type: c_int) {
    assert!(task_new_with_parser(parser_type).is_null());
}

#[test]
fn bare_task_binds_once() {
    let task = task_new();
    assert!(!task.is_null());

    // SAFETY: `task` is live until `task_free`.
    unsafe {
        assert_eq!(task_protocol(task), PARSER_UNDEFINED);
        run(task, b"USER early\r\n", C2S, 0);
        assert!(task_get_meta(task).is_null());

        assert!(task_init_parser(task, HTTP).is_null());
        assert!(task_init_parser(task, 42).is_null());
        assert_eq!(task_protocol(task), PARSER_UNDEFINED);

        assert_eq!(task_init_parser(task, SMTP), task);
        assert_eq!(task_protocol(task), SMTP);
        assert!(task_init_parser(task, SMTP).is_null());

        run(task, b"USER late\r\n", C2S, 1);
        let meta = task_get_meta(task);
        assert_eq!(take_string(smtp_meta_user(meta)).as_deref(), Some("late"));
        meta_free(meta);
        task_free(task);
    }
}

#[test]
fn snapshot_survives_task_free() {
    let task = task_new_with_parser(SMTP);
    run(task, b"RCPT TO:<keep@example.org>\r\n", C2S, 0);

    // SAFETY: the snapshot is independent of the task it came from.
    unsafe {
        let meta = task_get_meta(task);
        task_free(task);
        assert_eq!(
            take_string(smtp_meta_rcpt_to(meta)).as_deref(),
            Some("keep@example.org")
        );
        meta_free(meta);
    }
}

#[test]
fn invalid_direction_and_null_payload_are_ignored() {
    let task = task_new_with_parser(SMTP);

    run(task, b"USER nobody\r\n", 9, 0);
    run(task, b"USER server\r\n", S2C, 1);
    run(task, b"USER both\r\n", BIDIR, 2);
    // SAFETY: a null payload with non-zero length is rejected before reading.
    unsafe { task_run(task, std::ptr::null(), 5, C2S, 3) };
    // SAFETY: a null payload with zero length is an empty fragment.
    unsafe { task_run(task, std::ptr::null(), 0, C2S, 4) };

    // SAFETY: `task` is live until freed.
    unsafe {
        assert!(task_get_meta(task).is_null());
        task_free(task);
    }
}

#[test]
fn null_handles_are_tolerated() {
    let null_task: *mut Task = std::ptr::null_mut();
    // SAFETY: every entry point accepts null.
    unsafe {
        task_free(null_task);
        task_run(null_task, b"x".as_ptr(), 1, C2S, 0);
        assert!(task_get_meta(null_task).is_null());
        assert!(task_init_parser(null_task, SMTP).is_null());
        assert_eq!(task_protocol(null_task), PARSER_UNDEFINED);

        meta_free(std::ptr::null_mut());
        meta_str_free(std::ptr::null_mut());
        assert_eq!(meta_protocol(std::ptr::null()), PARSER_UNDEFINED);
        assert_eq!(smtp_meta_type(std::ptr::null()), META_NONE);
        assert!(smtp_meta_value(std::ptr::null()).is_null());
    }
}

#[test]
fn log_init_succeeds_at_most_once() {
    let first = ffi::memerge_log_init();
    assert!(first == 0 || first == -1);
    assert_eq!(ffi::memerge_log_init(), -1);
}
