//! Argument conversion and error reporting shared by the exported functions.
//!
//! Every export runs its body through [`guarded`]: errors are logged at
//! their severity and turned into the export's null result, panics and
//! corrupted state abort the process.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, trace, warn};

use gpi_core::{fatal, global, CallbackId, Gpi, GpiError, HandleId, IterId, Severity};

use crate::error::{FfiError, Result};

thread_local! {
    static SCRATCH: RefCell<CString> = RefCell::new(CString::default());
}

/// Run an export body, returning `fallback` when it fails.
pub(crate) fn guarded<T>(operation: &'static str, fallback: T, f: impl FnOnce() -> Result<T>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(FfiError::Gpi(err @ GpiError::Corrupted { .. }))) => fatal(&err),
        Ok(Err(err)) => {
            report(operation, &err);
            fallback
        }
        Err(_) => {
            error!(critical = true, operation, "panic at the C boundary");
            std::process::abort()
        }
    }
}

fn report(operation: &'static str, err: &FfiError) {
    match err.severity() {
        Severity::Trace => trace!(operation, %err, "call failed"),
        Severity::Debug => debug!(operation, %err, "call failed"),
        Severity::Info => info!(operation, %err, "call failed"),
        Severity::Warning => warn!(operation, %err, "call failed"),
        Severity::Error => error!(operation, %err, "call failed"),
        Severity::Critical => error!(critical = true, operation, %err, "call failed"),
    }
}

pub(crate) fn with_gpi<R>(f: impl FnOnce(&mut Gpi) -> gpi_core::Result<R>) -> Result<R> {
    global::with(f).map_err(FfiError::from)
}

pub(crate) fn handle_arg(raw: u64) -> Result<HandleId> {
    if raw == 0 {
        return Err(FfiError::NullArgument { what: "handle" });
    }
    Ok(HandleId::from_raw(raw))
}

pub(crate) fn iter_arg(raw: u64) -> Result<IterId> {
    if raw == 0 {
        return Err(FfiError::NullArgument { what: "iterator" });
    }
    Ok(IterId::from_raw(raw))
}

pub(crate) fn callback_arg(raw: u64) -> Result<CallbackId> {
    if raw == 0 {
        return Err(FfiError::NullArgument { what: "callback" });
    }
    Ok(CallbackId::from_raw(raw))
}

/// # Safety
///
/// `ptr` is null or points to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn bytes_arg<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a [u8]> {
    if ptr.is_null() {
        return Err(FfiError::NullArgument { what });
    }
    Ok(CStr::from_ptr(ptr).to_bytes())
}

/// # Safety
///
/// As for [`bytes_arg`].
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str> {
    std::str::from_utf8(bytes_arg(ptr, what)?).map_err(|_| FfiError::InvalidUtf8 { what })
}

/// A string argument where null means "not given".
///
/// # Safety
///
/// As for [`bytes_arg`].
pub(crate) unsafe fn opt_str_arg<'a>(
    ptr: *const c_char,
    what: &'static str,
) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        str_arg(ptr, what).map(Some)
    }
}

/// # Safety
///
/// `out` is null or valid for a write of `T`.
pub(crate) unsafe fn store<T>(out: *mut T, value: T, what: &'static str) -> Result<()> {
    if out.is_null() {
        return Err(FfiError::NullArgument { what });
    }
    out.write(value);
    Ok(())
}

/// Copy `bytes` into this thread's return buffer, up to the first NUL.
///
/// The pointer stays valid until the next export on this thread that
/// returns a string.
pub(crate) fn scratch(bytes: &[u8]) -> *const c_char {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let owned = CString::new(&bytes[..end]).unwrap_or_default();
    SCRATCH.with(|cell| {
        let mut slot = cell.borrow_mut();
        *slot = owned;
        slot.as_ptr()
    })
}

pub(crate) fn flag(value: bool) -> c_int {
    c_int::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn errors_become_the_fallback() {
        let value = guarded("lookup", -1, || Err(GpiError::not_found("top.x").into()));
        assert_eq!(value, -1);
        assert_eq!(guarded("lookup", -1, || Ok(7)), 7);
    }

    #[test]
    fn null_ids_are_rejected() {
        assert!(matches!(
            handle_arg(0),
            Err(FfiError::NullArgument { what: "handle" })
        ));
        assert_eq!(handle_arg(3).unwrap().raw(), 3);
        assert!(iter_arg(0).is_err());
        assert!(callback_arg(0).is_err());
    }

    #[test]
    fn string_arguments() {
        let name = CString::new("clk").unwrap();
        unsafe {
            assert_eq!(str_arg(name.as_ptr(), "name").unwrap(), "clk");
            assert!(str_arg(ptr::null(), "name").is_err());
            assert_eq!(opt_str_arg(ptr::null(), "name").unwrap(), None);
        }
        let bad = CString::new(vec![0xff, 0xfe]).unwrap();
        unsafe {
            assert!(matches!(
                str_arg(bad.as_ptr(), "name"),
                Err(FfiError::InvalidUtf8 { .. })
            ));
            assert_eq!(bytes_arg(bad.as_ptr(), "name").unwrap(), &[0xff, 0xfe]);
        }
    }

    #[test]
    fn scratch_stops_at_nul() {
        let ptr = scratch(b"ab\0cd");
        let text = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(text.to_bytes(), b"ab");
    }

    #[test]
    fn store_needs_a_target() {
        let mut out = 0i64;
        unsafe {
            store(&mut out, 42, "value").unwrap();
            assert!(store(ptr::null_mut::<i64>(), 1, "value").is_err());
        }
        assert_eq!(out, 42);
    }
}
