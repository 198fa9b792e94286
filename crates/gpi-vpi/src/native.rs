//! [`NativeVpi`]: [`VpiApi`] over the `vpi_*` routines exported by the
//! hosting simulator.

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use gpi_core::{RawRef, SimInfo};

use crate::api::{VpiApi, VpiDiagnostic, VpiValue};
use crate::consts::*;

type VpiHandle = *mut c_void;

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct VpiTime {
    kind: i32,
    high: u32,
    low: u32,
    real: f64,
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
union ValueUnion {
    string: *mut c_char,
    scalar: i32,
    integer: i32,
    real: f64,
    time: *mut VpiTime,
    misc: *mut c_char,
}

#[repr(C)]
struct VpiValueRaw {
    format: i32,
    value: ValueUnion,
}

#[allow(dead_code)]
#[repr(C)]
struct CbData {
    reason: i32,
    cb_rtn: Option<extern "C" fn(*mut CbData) -> i32>,
    obj: VpiHandle,
    time: *mut VpiTime,
    value: *mut VpiValueRaw,
    index: i32,
    user_data: *mut c_char,
}

#[allow(dead_code)]
#[repr(C)]
struct ErrorInfo {
    state: i32,
    level: i32,
    message: *mut c_char,
    product: *mut c_char,
    code: *mut c_char,
    file: *mut c_char,
    line: i32,
}

#[allow(dead_code)]
#[repr(C)]
struct VlogInfo {
    argc: i32,
    argv: *mut *mut c_char,
    product: *mut c_char,
    version: *mut c_char,
}

extern "C" {
    fn vpi_handle_by_name(name: *mut c_char, scope: VpiHandle) -> VpiHandle;
    fn vpi_handle_by_index(object: VpiHandle, index: i32) -> VpiHandle;
    fn vpi_handle(kind: i32, object: VpiHandle) -> VpiHandle;
    fn vpi_iterate(kind: i32, object: VpiHandle) -> VpiHandle;
    fn vpi_scan(iterator: VpiHandle) -> VpiHandle;
    fn vpi_get(property: i32, object: VpiHandle) -> i32;
    fn vpi_get_str(property: i32, object: VpiHandle) -> *mut c_char;
    fn vpi_get_value(object: VpiHandle, value: *mut VpiValueRaw);
    fn vpi_put_value(
        object: VpiHandle,
        value: *mut VpiValueRaw,
        time: *mut VpiTime,
        flags: i32,
    ) -> VpiHandle;
    fn vpi_get_time(object: VpiHandle, time: *mut VpiTime);
    fn vpi_register_cb(data: *mut CbData) -> VpiHandle;
    fn vpi_remove_cb(cb: VpiHandle) -> i32;
    fn vpi_release_handle(object: VpiHandle) -> i32;
    fn vpi_chk_error(info: *mut ErrorInfo) -> i32;
    fn vpi_get_vlog_info(info: *mut VlogInfo) -> i32;
    fn vpi_control(operation: i32, ...) -> i32;
}

fn handle(raw: Option<RawRef>) -> VpiHandle {
    raw.map_or(ptr::null_mut(), |r| r.as_ptr())
}

/// Copy a simulator-owned C string.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string.
unsafe fn owned(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    Some(CStr::from_ptr(s).to_string_lossy().into_owned())
}

/// Callback entry point handed to `vpi_register_cb`.
extern "C" fn on_callback(data: *mut CbData) -> i32 {
    if data.is_null() {
        return 0;
    }
    // SAFETY: the simulator passes back the cb_data registered below,
    // whose user_data carries the callback token.
    let token = unsafe { (*data).user_data as usize as u64 };
    match std::panic::catch_unwind(|| gpi_core::global::fire(token)) {
        Ok(ret) => ret,
        Err(_) => {
            tracing::error!(critical = true, token, "callback panicked");
            std::process::abort()
        }
    }
}

/// The simulator's own VPI implementation. Only valid inside a simulator
/// that exports the routines.
#[derive(Debug, Default)]
pub struct NativeVpi;

impl NativeVpi {
    pub fn new() -> Self {
        Self
    }
}

impl VpiApi for NativeVpi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef> {
        let name = CString::new(name).ok()?;
        // SAFETY: name outlives the call; the simulator does not keep it.
        RawRef::from_ptr(unsafe { vpi_handle_by_name(name.as_ptr().cast_mut(), handle(scope)) })
    }

    fn handle_by_index(&mut self, parent: RawRef, index: i32) -> Option<RawRef> {
        // SAFETY: parent is a live handle from this simulator.
        RawRef::from_ptr(unsafe { vpi_handle_by_index(parent.as_ptr(), index) })
    }

    fn handle(&mut self, relation: i32, obj: RawRef) -> Option<RawRef> {
        // SAFETY: obj is a live handle.
        RawRef::from_ptr(unsafe { vpi_handle(relation, obj.as_ptr()) })
    }

    fn iterate(&mut self, relation: i32, parent: Option<RawRef>) -> Option<RawRef> {
        // SAFETY: parent is null or a live handle.
        RawRef::from_ptr(unsafe { vpi_iterate(relation, handle(parent)) })
    }

    fn scan(&mut self, iterator: RawRef) -> Option<RawRef> {
        // SAFETY: iterator is live until scan returns null.
        RawRef::from_ptr(unsafe { vpi_scan(iterator.as_ptr()) })
    }

    fn release_handle(&mut self, obj: RawRef) -> bool {
        // SAFETY: obj is live and not used again.
        unsafe { vpi_release_handle(obj.as_ptr()) != 0 }
    }

    fn get(&mut self, property: i32, obj: Option<RawRef>) -> i32 {
        // SAFETY: obj is null or a live handle.
        unsafe { vpi_get(property, handle(obj)) }
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        // SAFETY: the returned string is valid until the next VPI call.
        unsafe { owned(vpi_get_str(property, obj.as_ptr())) }
    }

    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VpiValue> {
        let mut raw = VpiValueRaw {
            format,
            value: ValueUnion { integer: 0 },
        };
        // SAFETY: raw is a valid s_vpi_value; string results stay valid
        // until the next VPI call and are copied at once.
        unsafe {
            vpi_get_value(obj.as_ptr(), &mut raw);
            match format {
                VPI_BIN_STR_VAL => owned(raw.value.string).map(VpiValue::BinStr),
                VPI_STRING_VAL => {
                    if raw.value.string.is_null() {
                        return None;
                    }
                    Some(VpiValue::Str(CStr::from_ptr(raw.value.string).to_bytes().to_vec()))
                }
                VPI_INT_VAL => Some(VpiValue::Int(raw.value.integer)),
                VPI_REAL_VAL => Some(VpiValue::Real(raw.value.real)),
                _ => None,
            }
        }
    }

    fn put_value(&mut self, obj: RawRef, value: &VpiValue, flags: i32) {
        // Keeps string payloads alive across the call.
        let text;
        let mut raw = match value {
            VpiValue::BinStr(bits) => {
                text = CString::new(bits.as_bytes()).unwrap_or_default();
                VpiValueRaw {
                    format: VPI_BIN_STR_VAL,
                    value: ValueUnion {
                        string: text.as_ptr().cast_mut(),
                    },
                }
            }
            VpiValue::Str(bytes) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                text = CString::new(&bytes[..end]).unwrap_or_default();
                VpiValueRaw {
                    format: VPI_STRING_VAL,
                    value: ValueUnion {
                        string: text.as_ptr().cast_mut(),
                    },
                }
            }
            VpiValue::Int(v) => VpiValueRaw {
                format: VPI_INT_VAL,
                value: ValueUnion { integer: *v },
            },
            VpiValue::Real(v) => VpiValueRaw {
                format: VPI_REAL_VAL,
                value: ValueUnion { real: *v },
            },
        };
        let mut time = VpiTime {
            kind: VPI_SIM_TIME,
            high: 0,
            low: 0,
            real: 0.0,
        };
        // SAFETY: raw and time are valid for the duration of the call.
        unsafe {
            vpi_put_value(obj.as_ptr(), &mut raw, &mut time, flags);
        }
    }

    fn register_cb(
        &mut self,
        reason: i32,
        obj: Option<RawRef>,
        delay: u64,
        user_data: u64,
    ) -> Option<RawRef> {
        let mut time = VpiTime {
            kind: VPI_SIM_TIME,
            high: (delay >> 32) as u32,
            low: delay as u32,
            real: 0.0,
        };
        let mut value = VpiValueRaw {
            format: VPI_INT_VAL,
            value: ValueUnion { integer: 0 },
        };
        let timed = reason != CB_VALUE_CHANGE;
        if !timed {
            time.kind = VPI_SUPPRESS_TIME;
        }
        let mut data = CbData {
            reason,
            cb_rtn: Some(on_callback),
            obj: handle(obj),
            time: &mut time,
            value: if timed { ptr::null_mut() } else { &mut value },
            index: 0,
            user_data: user_data as usize as *mut c_char,
        };
        // SAFETY: the simulator copies cb_data, time and value.
        RawRef::from_ptr(unsafe { vpi_register_cb(&mut data) })
    }

    fn remove_cb(&mut self, cb: RawRef) -> bool {
        // SAFETY: cb is a live registration.
        unsafe { vpi_remove_cb(cb.as_ptr()) != 0 }
    }

    fn sim_time(&mut self) -> u64 {
        let mut time = VpiTime {
            kind: VPI_SIM_TIME,
            high: 0,
            low: 0,
            real: 0.0,
        };
        // SAFETY: time is a valid s_vpi_time.
        unsafe { vpi_get_time(ptr::null_mut(), &mut time) };
        (u64::from(time.high) << 32) | u64::from(time.low)
    }

    fn finish(&mut self) {
        // SAFETY: vpiFinish takes one integer diagnostic level.
        unsafe {
            vpi_control(VPI_FINISH, 1i32);
        }
    }

    fn info(&mut self) -> SimInfo {
        let mut info = VlogInfo {
            argc: 0,
            argv: ptr::null_mut(),
            product: ptr::null_mut(),
            version: ptr::null_mut(),
        };
        // SAFETY: info is a valid s_vpi_vlog_info; its strings are owned
        // by the simulator and copied here.
        unsafe {
            if vpi_get_vlog_info(&mut info) == 0 {
                return SimInfo::default();
            }
            SimInfo {
                product: owned(info.product).unwrap_or_default(),
                version: owned(info.version).unwrap_or_default(),
            }
        }
    }

    fn chk_error(&mut self) -> Option<VpiDiagnostic> {
        let mut info = ErrorInfo {
            state: 0,
            level: 0,
            message: ptr::null_mut(),
            product: ptr::null_mut(),
            code: ptr::null_mut(),
            file: ptr::null_mut(),
            line: 0,
        };
        // SAFETY: info is a valid s_vpi_error_info.
        unsafe {
            let level = vpi_chk_error(&mut info);
            if level == 0 {
                return None;
            }
            Some(VpiDiagnostic {
                level,
                message: owned(info.message).unwrap_or_default(),
                file: owned(info.file),
                line: u32::try_from(info.line).ok(),
            })
        }
    }
}
