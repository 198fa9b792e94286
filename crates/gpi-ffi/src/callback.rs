//! Exported callback registration.
//!
//! Each registration takes a C function and an opaque context pointer; the
//! function is called with the context whenever the callback fires and its
//! return value is passed back to the simulator. Ids are non-zero; 0 means
//! the registration failed.

use std::ffi::{c_int, c_void};

use gpi_core::{CallbackKind, Edge, UserFn};

use crate::boundary::{callback_arg, guarded, handle_arg, with_gpi};
use crate::error::{FfiError, Result};

/// Function called when a callback fires.
pub type GpiCallbackFn = unsafe extern "C" fn(*mut c_void) -> c_int;

fn user_fn(func: Option<GpiCallbackFn>, ctx: *mut c_void) -> Result<UserFn> {
    let func = func.ok_or(FfiError::NullArgument { what: "function" })?;
    let ctx = ctx as usize;
    // SAFETY: the caller promised `func` may be called with `ctx` until the
    // callback is removed.
    Ok(Box::new(move || unsafe { func(ctx as *mut c_void) }))
}

fn register(kind: CallbackKind, func: Option<GpiCallbackFn>, ctx: *mut c_void) -> Result<u64> {
    let func = user_fn(func, ctx)?;
    let id = with_gpi(|gpi| gpi.register_callback(kind, func))?;
    Ok(id.raw())
}

/// Called after `signal` changes; `edge` is 1 rising, 2 falling or 3 any.
#[no_mangle]
pub extern "C" fn gpi_register_value_change_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
    signal: u64,
    edge: c_int,
) -> u64 {
    guarded("register_value_change_callback", 0, || {
        let signal = handle_arg(signal)?;
        let edge = Edge::from_code(edge).ok_or(FfiError::InvalidCode {
            what: "edge",
            code: edge,
        })?;
        register(CallbackKind::ValueChange { signal, edge }, func, ctx)
    })
}

/// Called after `delay` units of simulator precision.
#[no_mangle]
pub extern "C" fn gpi_register_timed_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
    delay: u64,
) -> u64 {
    guarded("register_timed_callback", 0, || {
        register(CallbackKind::Timer { delay }, func, ctx)
    })
}

#[no_mangle]
pub extern "C" fn gpi_register_readonly_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
) -> u64 {
    guarded("register_readonly_callback", 0, || {
        register(CallbackKind::ReadOnly, func, ctx)
    })
}

#[no_mangle]
pub extern "C" fn gpi_register_readwrite_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
) -> u64 {
    guarded("register_readwrite_callback", 0, || {
        register(CallbackKind::ReadWrite, func, ctx)
    })
}

#[no_mangle]
pub extern "C" fn gpi_register_nexttime_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
) -> u64 {
    guarded("register_nexttime_callback", 0, || {
        register(CallbackKind::NextTimeStep, func, ctx)
    })
}

#[no_mangle]
pub extern "C" fn gpi_register_start_of_sim_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
) -> u64 {
    guarded("register_start_of_sim_callback", 0, || {
        register(CallbackKind::StartOfSim, func, ctx)
    })
}

#[no_mangle]
pub extern "C" fn gpi_register_end_of_sim_callback(
    func: Option<GpiCallbackFn>,
    ctx: *mut c_void,
) -> u64 {
    guarded("register_end_of_sim_callback", 0, || {
        register(CallbackKind::EndOfSim, func, ctx)
    })
}

/// Cancel a callback. Safe to call from inside its own function.
#[no_mangle]
pub extern "C" fn gpi_remove_callback(callback: u64) -> c_int {
    guarded("remove_callback", -1, || {
        let id = callback_arg(callback)?;
        with_gpi(|gpi| gpi.remove_callback(id))?;
        Ok(0)
    })
}

/// Arm a one-shot callback again after it fired.
#[no_mangle]
pub extern "C" fn gpi_prime_callback(callback: u64) -> c_int {
    guarded("prime_callback", -1, || {
        let id = callback_arg(callback)?;
        with_gpi(|gpi| gpi.prime_callback(id))?;
        Ok(0)
    })
}
