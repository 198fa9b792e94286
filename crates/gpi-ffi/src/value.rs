//! Exported signal reads and writes.

use std::ffi::{c_char, c_int};
use std::ptr;

use gpi_core::{SetAction, Value};

use crate::boundary::{bytes_arg, guarded, handle_arg, scratch, store, str_arg, with_gpi};
use crate::error::{FfiError, Result};

fn action_arg(code: c_int) -> Result<SetAction> {
    SetAction::from_code(code).ok_or(FfiError::InvalidCode {
        what: "set action",
        code,
    })
}

fn write(handle: u64, value: Value, action: c_int) -> Result<c_int> {
    let id = handle_arg(handle)?;
    let action = action_arg(action)?;
    with_gpi(|gpi| gpi.write(id, &value, action))?;
    Ok(0)
}

/// Logic value, one character per bit, most significant first.
#[no_mangle]
pub extern "C" fn gpi_get_signal_value_binstr(handle: u64) -> *const c_char {
    guarded("get_signal_value_binstr", ptr::null(), || {
        let id = handle_arg(handle)?;
        with_gpi(|gpi| Ok(scratch(gpi.read_binstr(id)?.as_bytes())))
    })
}

/// Raw bytes of a string object, cut at the first NUL.
#[no_mangle]
pub extern "C" fn gpi_get_signal_value_str(handle: u64) -> *const c_char {
    guarded("get_signal_value_str", ptr::null(), || {
        let id = handle_arg(handle)?;
        with_gpi(|gpi| Ok(scratch(&gpi.read_str(id)?)))
    })
}

/// # Safety
///
/// `out` is valid for a write.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_real(handle: u64, out: *mut f64) -> c_int {
    guarded("get_signal_value_real", -1, || {
        let id = handle_arg(handle)?;
        let value = with_gpi(|gpi| gpi.read_real(id))?;
        store(out, value, "out")?;
        Ok(0)
    })
}

/// # Safety
///
/// `out` is valid for a write.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_signal_value_long(handle: u64, out: *mut i64) -> c_int {
    guarded("get_signal_value_long", -1, || {
        let id = handle_arg(handle)?;
        let value = with_gpi(|gpi| gpi.read_long(id))?;
        store(out, value, "out")?;
        Ok(0)
    })
}

/// Write a binary string. `action` is 0 deposit, 1 force, 2 release or
/// 3 no-delay.
///
/// # Safety
///
/// `value` is a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_binstr(
    handle: u64,
    value: *const c_char,
    action: c_int,
) -> c_int {
    guarded("set_signal_value_binstr", -1, || {
        let bits = str_arg(value, "value")?;
        write(handle, Value::BinStr(bits.to_string()), action)
    })
}

/// # Safety
///
/// `value` is a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_set_signal_value_str(
    handle: u64,
    value: *const c_char,
    action: c_int,
) -> c_int {
    guarded("set_signal_value_str", -1, || {
        let bytes = bytes_arg(value, "value")?;
        write(handle, Value::Str(bytes.to_vec()), action)
    })
}

#[no_mangle]
pub extern "C" fn gpi_set_signal_value_real(handle: u64, value: f64, action: c_int) -> c_int {
    guarded("set_signal_value_real", -1, || {
        write(handle, Value::Real(value), action)
    })
}

#[no_mangle]
pub extern "C" fn gpi_set_signal_value_int(handle: u64, value: i64, action: c_int) -> c_int {
    guarded("set_signal_value_int", -1, || write(handle, Value::Int(value), action))
}
