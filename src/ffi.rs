//! C ABI over [`Task`] and [`Snapshot`].
//!
//! Handles are opaque pointers produced by `Box::into_raw` and reclaimed by
//! the matching free function. Enum arguments arrive as plain integers and
//! are validated with `TryFrom`; out-of-range values produce the function's
//! null or no-op result. Every entry point catches panics so unwinding never
//! crosses into C. `include/memerge.h` declares the same surface.
//!
//! Strings returned by the `smtp_meta_*` accessors are allocated here and must
//! be released with [`meta_str_free`], never with the C allocator.

use std::{
    any::Any,
    ffi::{CString, c_char, c_int},
    panic::{self, AssertUnwindSafe},
    ptr,
};

use log::{error, warn};

use crate::{
    direction::Direction,
    metadata::{SmtpKind, SmtpMeta, Snapshot},
    protocol::Protocol,
    task::Task,
    timestamp::Timestamp,
};

/// `ParserType` value reported for a task with no protocol.
pub const PARSER_UNDEFINED: c_int = -1;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or("non-string panic payload")
}

// Run `f`, mapping a panic to `fallback`.
fn guard<T>(entry: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        error!("panic in {entry}: {}", panic_message(&*payload));
        fallback
    })
}

fn into_handle<T>(value: T) -> *mut T { Box::into_raw(Box::new(value)) }

fn smtp_string(meta: &SmtpMeta, wanted: Option<SmtpKind>) -> *mut c_char {
    if wanted.is_some_and(|kind| kind != meta.kind()) {
        return ptr::null_mut();
    }
    let Some(value) = meta.value() else {
        return ptr::null_mut();
    };
    // C strings end at the first NUL.
    let value = value.split('\0').next().unwrap_or_default();
    CString::new(value).map_or(ptr::null_mut(), CString::into_raw)
}

/// # Safety
///
/// `meta` must be null or a live pointer returned by [`task_get_meta`].
unsafe fn smtp_accessor(
    entry: &'static str,
    meta: *const Snapshot,
    wanted: Option<SmtpKind>,
) -> *mut c_char {
    // SAFETY: guaranteed by the caller.
    let Some(meta) = (unsafe { meta.as_ref() }) else {
        return ptr::null_mut();
    };
    guard(entry, ptr::null_mut(), || {
        meta.smtp()
            .map_or(ptr::null_mut(), |smtp| smtp_string(smtp, wanted))
    })
}

/// Allocate a task with no protocol.
///
/// Bytes fed before [`task_init_parser`] binds a protocol are discarded.
/// Returns null only if allocation panics.
#[unsafe(no_mangle)]
pub extern "C" fn task_new() -> *mut Task { guard("task_new", ptr::null_mut(), || into_handle(Task::new())) }

/// Allocate a task bound to `parser_type`.
///
/// Returns null when `parser_type` is not a `ParserType` value or has no
/// registered parser (`Http` with the default registry).
#[unsafe(no_mangle)]
pub extern "C" fn task_new_with_parser(parser_type: c_int) -> *mut Task {
    guard("task_new_with_parser", ptr::null_mut(), || {
        let protocol = match Protocol::try_from(parser_type) {
            Ok(protocol) => protocol,
            Err(err) => {
                warn!("task_new_with_parser: {err}");
                return ptr::null_mut();
            }
        };
        match Task::with_protocol(protocol) {
            Ok(task) => into_handle(task),
            Err(err) => {
                warn!("task_new_with_parser: {err}");
                ptr::null_mut()
            }
        }
    })
}

/// Bind an unbound task to `parser_type`.
///
/// Returns `task` on success. Returns null, leaving the task unchanged and
/// still owned by the caller, when `task` is null, the value is invalid, the
/// protocol is unsupported, or the task is already bound.
///
/// # Safety
///
/// `task` must be null or a live pointer from [`task_new`] or
/// [`task_new_with_parser`] not used concurrently from another thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn task_init_parser(task: *mut Task, parser_type: c_int) -> *mut Task {
    // SAFETY: guaranteed by the caller.
    let Some(handle) = (unsafe { task.as_mut() }) else {
        return ptr::null_mut();
    };
    guard("task_init_parser", ptr::null_mut(), || {
        let bound = Protocol::try_from(parser_type)
            .map_err(|err| err.to_string())
            .and_then(|protocol| handle.bind_protocol(protocol).map_err(|err| err.to_string()));
        match bound {
            Ok(()) => task,
            Err(err) => {
                warn!("task_init_parser: {err}");
                ptr::null_mut()
            }
        }
    })
}

/// Destroy a task and its buffers. Null is ignored.
///
/// Snapshots already taken from the task stay valid.
///
/// # Safety
///
/// `task` must be null or a pointer from [`task_new`] or
/// [`task_new_with_parser`] that has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn task_free(task: *mut Task) {
    if task.is_null() {
        return;
    }
    // SAFETY: the caller transfers the unique owner back.
    let task = unsafe { Box::from_raw(task) };
    guard("task_free", (), move || drop(task));
}

/// Feed `pkt_len` payload bytes travelling in `pkt_dir` at `ts`.
///
/// No-op when `task` is null, `pkt_dir` is not a `PacketDir` value, or `pkt`
/// is null with a non-zero length.
///
/// # Safety
///
/// `task` must be null or a live task pointer not used concurrently from
/// another thread. `pkt` must be valid for reads of `pkt_len` bytes unless
/// null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn task_run(
    task: *mut Task,
    pkt: *const u8,
    pkt_len: usize,
    pkt_dir: c_int,
    ts: u64,
) {
    // SAFETY: guaranteed by the caller.
    let Some(task) = (unsafe { task.as_mut() }) else {
        return;
    };
    let payload: &[u8] = if pkt_len == 0 {
        &[]
    } else if pkt.is_null() {
        warn!("task_run: null payload with length {pkt_len}");
        return;
    } else {
        // SAFETY: `pkt` is non-null and readable for `pkt_len` bytes.
        unsafe { std::slice::from_raw_parts(pkt, pkt_len) }
    };
    let direction = match Direction::try_from(pkt_dir) {
        Ok(direction) => direction,
        Err(err) => {
            warn!("task_run: {err}");
            return;
        }
    };
    guard("task_run", (), || task.run(payload, direction, Timestamp::new(ts)));
}

/// Protocol the task is bound to, or [`PARSER_UNDEFINED`].
///
/// # Safety
///
/// `task` must be null or a live task pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn task_protocol(task: *const Task) -> c_int {
    // SAFETY: guaranteed by the caller.
    unsafe { task.as_ref() }
        .and_then(Task::protocol)
        .map_or(PARSER_UNDEFINED, |protocol| protocol as c_int)
}

/// Take the task's pending snapshot.
///
/// Returns null when nothing was extracted since the previous call. The
/// snapshot is owned by the caller and released with [`meta_free`]; it
/// stays valid after the task is freed.
///
/// # Safety
///
/// `task` must be null or a live task pointer not used concurrently from
/// another thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn task_get_meta(task: *mut Task) -> *mut Snapshot {
    // SAFETY: guaranteed by the caller.
    let Some(task) = (unsafe { task.as_mut() }) else {
        return ptr::null_mut();
    };
    guard("task_get_meta", ptr::null_mut(), || {
        task.take_metadata().map_or(ptr::null_mut(), into_handle)
    })
}

/// Release a snapshot. Null is ignored.
///
/// # Safety
///
/// `meta` must be null or a pointer from [`task_get_meta`] that has not been
/// freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meta_free(meta: *mut Snapshot) {
    if meta.is_null() {
        return;
    }
    // SAFETY: the caller transfers the unique owner back.
    let meta = unsafe { Box::from_raw(meta) };
    guard("meta_free", (), move || drop(meta));
}

/// `ParserType` of the task the snapshot came from, or
/// [`PARSER_UNDEFINED`] for null.
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meta_protocol(meta: *const Snapshot) -> c_int {
    // SAFETY: guaranteed by the caller.
    unsafe { meta.as_ref() }.map_or(PARSER_UNDEFINED, |meta| meta.protocol() as c_int)
}

/// `MetaSmtpType` of the snapshot; `None` (5) for null or non-SMTP
/// snapshots.
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_type(meta: *const Snapshot) -> c_int {
    // SAFETY: guaranteed by the caller.
    let kind = unsafe { meta.as_ref() }
        .and_then(Snapshot::smtp_kind)
        .unwrap_or(SmtpKind::None);
    kind as c_int
}

/// Login name of a `User` snapshot, else null. Free with [`meta_str_free`].
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_user(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_user", meta, Some(SmtpKind::User)) }
}

/// Password of a `Pass` snapshot, else null. Free with [`meta_str_free`].
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_pass(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_pass", meta, Some(SmtpKind::Pass)) }
}

/// Sender of a `MailFrom` snapshot, else null. Free with [`meta_str_free`].
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_mail_from(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_mail_from", meta, Some(SmtpKind::MailFrom)) }
}

/// Recipient of an `RcptTo` snapshot, else null. Free with [`meta_str_free`].
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_rcpt_to(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_rcpt_to", meta, Some(SmtpKind::RcptTo)) }
}

/// Subject of a `Subject` snapshot, else null. Free with [`meta_str_free`].
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_subject(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_subject", meta, Some(SmtpKind::Subject)) }
}

/// Value of an SMTP snapshot whatever its kind; null for `None`.
///
/// # Safety
///
/// `meta` must be null or a live snapshot pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smtp_meta_value(meta: *const Snapshot) -> *mut c_char {
    // SAFETY: forwarded caller contract.
    unsafe { smtp_accessor("smtp_meta_value", meta, None) }
}

/// Release a string returned by an `smtp_meta_*` accessor. Null is ignored.
///
/// # Safety
///
/// `s` must be null or a pointer from an `smtp_meta_*` accessor that has not
/// been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meta_str_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: `s` came from `CString::into_raw`.
    drop(unsafe { CString::from_raw(s) });
}

/// Install a `tracing` subscriber writing to stderr so library log records
/// become visible to C callers.
///
/// Returns 0 on success and -1 if a global subscriber or logger is already
/// installed.
#[unsafe(no_mangle)]
pub extern "C" fn memerge_log_init() -> c_int {
    guard("memerge_log_init", -1, || {
        match tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .try_init()
        {
            Ok(()) => 0,
            Err(_) => -1,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_formatted() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
        let borrowed: Box<dyn Any + Send> = Box::new("bang");
        let other: Box<dyn Any + Send> = Box::new(5_u32);

        assert_eq!(panic_message(&*owned), "boom");
        assert_eq!(panic_message(&*borrowed), "bang");
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }

    #[test]
    fn guard_maps_panic_to_fallback() {
        let result = guard("test", -1, || -> c_int { panic!("deliberate") });
        assert_eq!(result, -1);
    }

    #[test]
    fn interior_nul_truncates_string() {
        let meta = SmtpMeta::new(SmtpKind::User, "ali\0ce");
        let raw = smtp_string(&meta, Some(SmtpKind::User));
        assert!(!raw.is_null());
        // SAFETY: `raw` was just returned by `CString::into_raw`.
        let value = unsafe { CString::from_raw(raw) };
        assert_eq!(value.to_str(), Ok("ali"));
    }
}
