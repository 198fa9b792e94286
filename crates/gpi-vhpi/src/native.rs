//! [`NativeVhpi`]: [`VhpiApi`] over the `vhpi_*` routines exported by the
//! hosting simulator.
//!
//! Variable-size values (binary strings, strings, vectors) are read in two
//! calls: the first with an empty buffer returns the size needed.

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use gpi_core::RawRef;

use crate::api::{VhpiApi, VhpiDiagnostic, VhpiValue};
use crate::consts::*;

type VhpiHandle = *mut c_void;

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct VhpiPhys {
    high: i32,
    low: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct VhpiTime {
    high: u32,
    low: u32,
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
union ValueUnion {
    enumv: u32,
    enumvs: *mut u32,
    intg: i32,
    real: f64,
    ch: c_char,
    str: *mut c_char,
    ptr: *mut c_void,
}

#[repr(C)]
struct VhpiValueRaw {
    format: i32,
    buf_size: usize,
    num_elems: i32,
    unit: VhpiPhys,
    value: ValueUnion,
}

impl VhpiValueRaw {
    fn new(format: i32) -> Self {
        Self {
            format,
            buf_size: 0,
            num_elems: 0,
            unit: VhpiPhys { high: 0, low: 0 },
            value: ValueUnion { ptr: ptr::null_mut() },
        }
    }
}

#[allow(dead_code)]
#[repr(C)]
struct CbData {
    reason: i32,
    cb_rtn: Option<extern "C" fn(*const CbData)>,
    obj: VhpiHandle,
    time: *mut VhpiTime,
    value: *mut VhpiValueRaw,
    user_data: *mut c_void,
}

#[allow(dead_code)]
#[repr(C)]
struct ErrorInfo {
    severity: i32,
    message: *mut c_char,
    str: *mut c_char,
    file: *mut c_char,
    line: i32,
}

extern "C" {
    fn vhpi_handle_by_name(name: *const c_char, scope: VhpiHandle) -> VhpiHandle;
    fn vhpi_handle_by_index(relation: i32, parent: VhpiHandle, index: i32) -> VhpiHandle;
    fn vhpi_handle(relation: i32, object: VhpiHandle) -> VhpiHandle;
    fn vhpi_iterator(relation: i32, object: VhpiHandle) -> VhpiHandle;
    fn vhpi_scan(iterator: VhpiHandle) -> VhpiHandle;
    fn vhpi_get(property: i32, object: VhpiHandle) -> i32;
    fn vhpi_get_str(property: i32, object: VhpiHandle) -> *const c_char;
    fn vhpi_get_phys(property: i32, object: VhpiHandle) -> VhpiPhys;
    fn vhpi_get_value(object: VhpiHandle, value: *mut VhpiValueRaw) -> i32;
    fn vhpi_put_value(object: VhpiHandle, value: *mut VhpiValueRaw, mode: i32) -> i32;
    fn vhpi_register_cb(data: *mut CbData, flags: i32) -> VhpiHandle;
    fn vhpi_remove_cb(cb: VhpiHandle) -> i32;
    fn vhpi_release_handle(object: VhpiHandle) -> i32;
    fn vhpi_get_time(time: *mut VhpiTime, cycles: *mut i64);
    fn vhpi_control(command: i32, ...) -> i32;
    fn vhpi_check_error(info: *mut ErrorInfo) -> i32;
}

/// `vhpiReturnCb`: keep the registration handle after the callback fires.
const VHPI_RETURN_CB: i32 = 1 << 12;

fn handle(raw: Option<RawRef>) -> VhpiHandle {
    raw.map_or(ptr::null_mut(), |r| r.as_ptr())
}

/// # Safety
/// `s` must be null or point to a NUL-terminated string.
unsafe fn owned(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    Some(CStr::from_ptr(s).to_string_lossy().into_owned())
}

/// Callback entry point handed to `vhpi_register_cb`.
extern "C" fn on_callback(data: *const CbData) {
    if data.is_null() {
        return;
    }
    // SAFETY: the simulator passes back the cb_data registered below,
    // whose user_data carries the callback token.
    let token = unsafe { (*data).user_data as usize as u64 };
    if std::panic::catch_unwind(|| gpi_core::global::fire(token)).is_err() {
        tracing::error!(critical = true, token, "callback panicked");
        std::process::abort()
    }
}

/// The simulator's own VHPI implementation. Only valid inside a simulator
/// that exports the routines.
#[derive(Debug, Default)]
pub struct NativeVhpi;

impl NativeVhpi {
    pub fn new() -> Self {
        Self
    }

    /// Read a variable-size value into a buffer of `T`.
    ///
    /// # Safety
    /// `obj` must be a live handle and `format` one whose payload is an
    /// array of `T`.
    unsafe fn read_buffer<T: Copy + Default>(
        obj: RawRef,
        format: i32,
        store: impl Fn(&mut ValueUnion, *mut T),
    ) -> Option<Vec<T>> {
        let mut raw = VhpiValueRaw::new(format);
        let needed = vhpi_get_value(obj.as_ptr(), &mut raw);
        let bytes = usize::try_from(needed).ok().filter(|&n| n > 0)?;
        let mut buf = vec![T::default(); bytes.div_ceil(std::mem::size_of::<T>())];
        raw.buf_size = buf.len() * std::mem::size_of::<T>();
        store(&mut raw.value, buf.as_mut_ptr());
        if vhpi_get_value(obj.as_ptr(), &mut raw) != 0 {
            return None;
        }
        if let Ok(n) = usize::try_from(raw.num_elems) {
            if n > 0 && n < buf.len() {
                buf.truncate(n);
            }
        }
        Some(buf)
    }
}

impl VhpiApi for NativeVhpi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef> {
        let name = CString::new(name).ok()?;
        // SAFETY: name outlives the call; the simulator does not keep it.
        RawRef::from_ptr(unsafe { vhpi_handle_by_name(name.as_ptr(), handle(scope)) })
    }

    fn handle_by_index(&mut self, relation: i32, parent: RawRef, index: i32) -> Option<RawRef> {
        // SAFETY: parent is a live handle from this simulator.
        RawRef::from_ptr(unsafe { vhpi_handle_by_index(relation, parent.as_ptr(), index) })
    }

    fn handle(&mut self, relation: i32, obj: Option<RawRef>) -> Option<RawRef> {
        // SAFETY: obj is null or a live handle.
        RawRef::from_ptr(unsafe { vhpi_handle(relation, handle(obj)) })
    }

    fn iterator(&mut self, relation: i32, parent: RawRef) -> Option<RawRef> {
        // SAFETY: parent is a live handle.
        RawRef::from_ptr(unsafe { vhpi_iterator(relation, parent.as_ptr()) })
    }

    fn scan(&mut self, iterator: RawRef) -> Option<RawRef> {
        // SAFETY: iterator is live until scan returns null.
        RawRef::from_ptr(unsafe { vhpi_scan(iterator.as_ptr()) })
    }

    fn release_handle(&mut self, obj: RawRef) -> bool {
        // SAFETY: obj is live and not used again.
        unsafe { vhpi_release_handle(obj.as_ptr()) == 0 }
    }

    fn get(&mut self, property: i32, obj: RawRef) -> i32 {
        // SAFETY: obj is a live handle.
        unsafe { vhpi_get(property, obj.as_ptr()) }
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        // SAFETY: the returned string is valid until the next VHPI call.
        unsafe { owned(vhpi_get_str(property, obj.as_ptr())) }
    }

    fn get_phys(&mut self, property: i32, obj: Option<RawRef>) -> i64 {
        // SAFETY: obj is null or a live handle.
        let phys = unsafe { vhpi_get_phys(property, handle(obj)) };
        (i64::from(phys.high) << 32) | i64::from(phys.low)
    }

    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VhpiValue> {
        // SAFETY: every buffer handed to the simulator is sized from its
        // own answer and outlives the call.
        unsafe {
            match format {
                VHPI_BIN_STR_VAL | VHPI_STR_VAL => {
                    let mut buf =
                        Self::read_buffer::<u8>(obj, format, |v, p| v.str = p.cast())?;
                    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                    buf.truncate(end);
                    Some(if format == VHPI_BIN_STR_VAL {
                        VhpiValue::BinStr(String::from_utf8_lossy(&buf).into_owned())
                    } else {
                        VhpiValue::Str(buf)
                    })
                }
                VHPI_LOGIC_VEC_VAL => {
                    let buf = Self::read_buffer::<u32>(obj, format, |v, p| v.enumvs = p)?;
                    Some(VhpiValue::LogicVec(
                        buf.into_iter().map(|e| e as u8).collect(),
                    ))
                }
                VHPI_ENUM_VEC_VAL => Some(VhpiValue::EnumVec(Self::read_buffer::<u32>(
                    obj,
                    format,
                    |v, p| v.enumvs = p,
                )?)),
                _ => {
                    let mut raw = VhpiValueRaw::new(format);
                    if vhpi_get_value(obj.as_ptr(), &mut raw) != 0 {
                        return None;
                    }
                    match format {
                        VHPI_LOGIC_VAL => Some(VhpiValue::Logic(raw.value.enumv as u8)),
                        VHPI_ENUM_VAL => Some(VhpiValue::Enum(raw.value.enumv)),
                        VHPI_INT_VAL => Some(VhpiValue::Int(raw.value.intg)),
                        VHPI_REAL_VAL => Some(VhpiValue::Real(raw.value.real)),
                        VHPI_CHAR_VAL => Some(VhpiValue::Char(raw.value.ch as u8)),
                        _ => None,
                    }
                }
            }
        }
    }

    fn put_value(&mut self, obj: RawRef, value: &VhpiValue, mode: i32) {
        // Keep buffers alive across the call.
        let mut text: Vec<u8> = Vec::new();
        let mut elems: Vec<u32> = Vec::new();
        let mut raw = match value {
            VhpiValue::BinStr(bits) => {
                text = bits.as_bytes().to_vec();
                text.push(0);
                let mut raw = VhpiValueRaw::new(VHPI_BIN_STR_VAL);
                raw.buf_size = text.len();
                raw.value.str = text.as_mut_ptr().cast();
                raw
            }
            VhpiValue::Str(bytes) => {
                text = bytes.clone();
                if text.last() != Some(&0) {
                    text.push(0);
                }
                let mut raw = VhpiValueRaw::new(VHPI_STR_VAL);
                raw.buf_size = text.len();
                raw.value.str = text.as_mut_ptr().cast();
                raw
            }
            VhpiValue::LogicVec(positions) => {
                elems = positions.iter().map(|&p| u32::from(p)).collect();
                let mut raw = VhpiValueRaw::new(VHPI_LOGIC_VEC_VAL);
                raw.num_elems = i32::try_from(elems.len()).unwrap_or(i32::MAX);
                raw.buf_size = elems.len() * std::mem::size_of::<u32>();
                raw.value.enumvs = elems.as_mut_ptr();
                raw
            }
            VhpiValue::EnumVec(positions) => {
                elems = positions.clone();
                let mut raw = VhpiValueRaw::new(VHPI_ENUM_VEC_VAL);
                raw.num_elems = i32::try_from(elems.len()).unwrap_or(i32::MAX);
                raw.buf_size = elems.len() * std::mem::size_of::<u32>();
                raw.value.enumvs = elems.as_mut_ptr();
                raw
            }
            VhpiValue::Logic(pos) => {
                let mut raw = VhpiValueRaw::new(VHPI_LOGIC_VAL);
                raw.value.enumv = u32::from(*pos);
                raw
            }
            VhpiValue::Enum(pos) => {
                let mut raw = VhpiValueRaw::new(VHPI_ENUM_VAL);
                raw.value.enumv = *pos;
                raw
            }
            VhpiValue::Int(v) => {
                let mut raw = VhpiValueRaw::new(VHPI_INT_VAL);
                raw.value.intg = *v;
                raw
            }
            VhpiValue::Real(v) => {
                let mut raw = VhpiValueRaw::new(VHPI_REAL_VAL);
                raw.value.real = *v;
                raw
            }
            VhpiValue::Char(c) => {
                let mut raw = VhpiValueRaw::new(VHPI_CHAR_VAL);
                raw.value.ch = *c as c_char;
                raw
            }
        };
        // SAFETY: raw and the buffers it points into are valid for the
        // duration of the call.
        unsafe {
            vhpi_put_value(obj.as_ptr(), &mut raw, mode);
        }
        drop(text);
        drop(elems);
    }

    fn register_cb(
        &mut self,
        reason: i32,
        obj: Option<RawRef>,
        delay: u64,
        user_data: u64,
    ) -> Option<RawRef> {
        let mut time = VhpiTime {
            high: (delay >> 32) as u32,
            low: delay as u32,
        };
        let mut value = VhpiValueRaw::new(VHPI_BIN_STR_VAL);
        let value_change = reason == VHPI_CB_VALUE_CHANGE;
        let mut data = CbData {
            reason,
            cb_rtn: Some(on_callback),
            obj: handle(obj),
            time: if reason == VHPI_CB_AFTER_DELAY {
                &mut time
            } else {
                ptr::null_mut()
            },
            value: if value_change {
                &mut value
            } else {
                ptr::null_mut()
            },
            user_data: user_data as usize as *mut c_void,
        };
        // SAFETY: the simulator copies cb_data, time and value.
        RawRef::from_ptr(unsafe { vhpi_register_cb(&mut data, VHPI_RETURN_CB) })
    }

    fn remove_cb(&mut self, cb: RawRef) -> bool {
        // SAFETY: cb is a live registration.
        unsafe { vhpi_remove_cb(cb.as_ptr()) == 0 }
    }

    fn sim_time(&mut self) -> u64 {
        let mut time = VhpiTime { high: 0, low: 0 };
        // SAFETY: time is a valid vhpiTimeT; cycles may be null.
        unsafe { vhpi_get_time(&mut time, ptr::null_mut()) };
        (u64::from(time.high) << 32) | u64::from(time.low)
    }

    fn finish(&mut self) {
        // SAFETY: vhpiFinish takes one integer diagnostic level.
        unsafe {
            vhpi_control(VHPI_FINISH, 0i32);
        }
    }

    fn check_error(&mut self) -> Option<VhpiDiagnostic> {
        let mut info = ErrorInfo {
            severity: 0,
            message: ptr::null_mut(),
            str: ptr::null_mut(),
            file: ptr::null_mut(),
            line: 0,
        };
        // SAFETY: info is a valid vhpiErrorInfoT.
        unsafe {
            if vhpi_check_error(&mut info) == 0 {
                return None;
            }
            Some(VhpiDiagnostic {
                severity: info.severity,
                message: owned(info.message).unwrap_or_default(),
                file: owned(info.file),
                line: u32::try_from(info.line).ok(),
            })
        }
    }
}
