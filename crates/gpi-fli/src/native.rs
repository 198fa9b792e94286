//! [`NativeFli`]: [`FliApi`] over the `mti_*` routines exported by the
//! hosting simulator.
//!
//! Signal, variable, region, type and process ids are opaque pointers.
//! Strings returned by `*Indirect` and `*FullName` routines, and the id
//! arrays from `*Subelements`, are owned by the caller and freed with
//! `mti_VsimFree`.

use std::ffi::{c_char, c_int, c_long, c_void, CStr, CString};
use std::ptr;

use gpi_core::RawRef;

use crate::api::{FliApi, FliType, FliValue, ProcessFn};
use crate::consts::*;

type MtiId = *mut c_void;

extern "C" {
    fn mti_GetTopRegion() -> MtiId;
    fn mti_NextRegion(region: MtiId) -> MtiId;
    fn mti_FirstLowerRegion(region: MtiId) -> MtiId;
    fn mti_FindRegion(name: *const c_char) -> MtiId;
    fn mti_GetRegionKind(region: MtiId) -> c_int;
    fn mti_GetRegionName(region: MtiId) -> *mut c_char;
    fn mti_GetRegionFullName(region: MtiId) -> *mut c_char;
    fn mti_GetRegionSourceName(region: MtiId) -> *mut c_char;
    fn mti_GetPrimaryName(region: MtiId) -> *mut c_char;

    fn mti_FirstSignal(region: MtiId) -> MtiId;
    fn mti_NextSignal() -> MtiId;
    fn mti_FirstVarByRegion(region: MtiId) -> MtiId;
    fn mti_NextVar() -> MtiId;
    fn mti_FindSignal(name: *const c_char) -> MtiId;
    fn mti_FindVar(name: *const c_char) -> MtiId;
    fn mti_GetSignalName(signal: MtiId) -> *mut c_char;
    fn mti_GetVarName(var: MtiId) -> *mut c_char;
    fn mti_GetSignalSubelements(signal: MtiId, buffer: *mut MtiId) -> *mut MtiId;
    fn mti_GetVarSubelements(var: MtiId, buffer: *mut MtiId) -> *mut MtiId;

    fn mti_GetSignalType(signal: MtiId) -> MtiId;
    fn mti_GetVarType(var: MtiId) -> MtiId;
    fn mti_GetTypeKind(ty: MtiId) -> c_int;
    fn mti_TickLeft(ty: MtiId) -> c_int;
    fn mti_TickRight(ty: MtiId) -> c_int;
    fn mti_TickDir(ty: MtiId) -> c_int;
    fn mti_TickLength(ty: MtiId) -> c_int;
    fn mti_GetArrayElementType(ty: MtiId) -> MtiId;
    fn mti_GetEnumValues(ty: MtiId) -> *mut *mut c_char;
    fn mti_GetNumRecordElements(ty: MtiId) -> c_int;

    fn mti_GetSignalValue(signal: MtiId) -> c_int;
    fn mti_GetSignalValueIndirect(signal: MtiId, buffer: *mut c_void) -> *mut c_void;
    fn mti_GetArraySignalValue(signal: MtiId, buffer: *mut c_void) -> *mut c_void;
    fn mti_GetVarValue(var: MtiId) -> c_int;
    fn mti_GetVarValueIndirect(var: MtiId, buffer: *mut c_void) -> *mut c_void;
    fn mti_GetArrayVarValue(var: MtiId, buffer: *mut c_void) -> *mut c_void;
    fn mti_SetSignalValue(signal: MtiId, value: c_long);
    fn mti_SetVarValue(var: MtiId, value: c_long);
    fn mti_ForceSignal(
        signal: MtiId,
        value: *const c_char,
        delay: c_int,
        force_type: c_int,
        cancel_period: c_int,
        repeat_period: c_int,
    ) -> c_int;
    fn mti_ReleaseSignal(signal: MtiId) -> c_int;

    fn mti_CreateProcessWithPriority(
        name: *const c_char,
        func: ProcessFn,
        param: *mut c_void,
        priority: c_int,
    ) -> MtiId;
    fn mti_Sensitize(process: MtiId, signal: MtiId, when: c_int);
    fn mti_Desensitize(process: MtiId);
    fn mti_ScheduleWakeup64(process: MtiId, delay: MtiTime64);
    fn mti_AddLoadDoneCB(func: ProcessFn, param: *mut c_void);
    fn mti_RemoveLoadDoneCB(func: ProcessFn, param: *mut c_void);
    fn mti_AddQuitCB(func: ProcessFn, param: *mut c_void);
    fn mti_RemoveQuitCB(func: ProcessFn, param: *mut c_void);

    fn mti_GetProductVersion() -> *mut c_char;
    fn mti_Now() -> c_int;
    fn mti_NowUpper() -> c_int;
    fn mti_GetResolutionLimit() -> c_int;
    fn mti_Quit();
    fn mti_VsimFree(ptr: *mut c_void);
}

/// `mtiTime64T` in its two-word form.
#[repr(C)]
#[derive(Clone, Copy)]
struct MtiTime64 {
    hi: i32,
    lo: u32,
}

/// `MTI_EVENT`: wake on every event of the signal.
const MTI_EVENT: c_int = 0;

/// # Safety
/// `s` must be null or point to a NUL-terminated string.
unsafe fn owned(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    Some(CStr::from_ptr(s).to_string_lossy().into_owned())
}

/// # Safety
/// `s` must be null or a string allocated by the simulator for the caller.
unsafe fn owned_and_freed(s: *mut c_char) -> Option<String> {
    let out = owned(s);
    if !s.is_null() {
        mti_VsimFree(s.cast());
    }
    out
}

/// Collect a `First*`/`Next*` chain.
fn chain(first: MtiId, mut next: impl FnMut(MtiId) -> MtiId) -> Vec<RawRef> {
    let mut out = Vec::new();
    let mut current = first;
    while let Some(raw) = RawRef::from_ptr(current) {
        out.push(raw);
        current = next(current);
    }
    out
}

/// # Safety
/// `ty` must be a type id from this simulator.
unsafe fn fli_type(ty: MtiId) -> Option<FliType> {
    if ty.is_null() {
        return None;
    }
    let kind = mti_GetTypeKind(ty);
    let length = usize::try_from(mti_TickLength(ty)).unwrap_or(0);
    let out = match kind {
        MTI_TYPE_ENUM => {
            let values = mti_GetEnumValues(ty);
            let literals = if values.is_null() {
                Vec::new()
            } else {
                (0..length)
                    .map(|i| owned(*values.add(i)).unwrap_or_default())
                    .collect()
            };
            FliType::enumeration(literals)
        }
        MTI_TYPE_ARRAY => {
            let element = fli_type(mti_GetArrayElementType(ty))?;
            let mut array = FliType::array(
                i64::from(mti_TickLeft(ty)),
                i64::from(mti_TickRight(ty)),
                element,
            );
            array.descending = mti_TickDir(ty) < 0;
            array
        }
        MTI_TYPE_RECORD => {
            let mut record = FliType::scalar(MTI_TYPE_RECORD);
            record.length = usize::try_from(mti_GetNumRecordElements(ty)).unwrap_or(0);
            record
        }
        other => FliType::scalar(other),
    };
    Some(out)
}

/// Bytes per array element in a value buffer.
fn element_size(element: &FliType) -> usize {
    match element.kind {
        MTI_TYPE_ENUM if element.length <= 256 => 1,
        MTI_TYPE_REAL | MTI_TYPE_TIME => 8,
        _ => 4,
    }
}

/// The simulator's own FLI. Only valid inside a simulator that exports the
/// routines.
#[derive(Debug, Default)]
pub struct NativeFli;

impl NativeFli {
    pub fn new() -> Self {
        Self
    }

    fn type_id(obj: RawRef, var: bool) -> MtiId {
        // SAFETY: obj is a live signal or variable id of the requested family.
        unsafe {
            if var {
                mti_GetVarType(obj.as_ptr())
            } else {
                mti_GetSignalType(obj.as_ptr())
            }
        }
    }
}

impl FliApi for NativeFli {
    fn top_regions(&mut self) -> Vec<RawRef> {
        // SAFETY: region ids come straight from the simulator.
        unsafe { chain(mti_GetTopRegion(), |r| mti_NextRegion(r)) }
    }

    fn find_region(&mut self, path: &str) -> Option<RawRef> {
        let path = CString::new(path).ok()?;
        // SAFETY: path outlives the call.
        RawRef::from_ptr(unsafe { mti_FindRegion(path.as_ptr()) })
    }

    fn child_regions(&mut self, region: RawRef) -> Vec<RawRef> {
        // SAFETY: region is a live region id.
        unsafe { chain(mti_FirstLowerRegion(region.as_ptr()), |r| mti_NextRegion(r)) }
    }

    fn region_kind(&mut self, obj: RawRef) -> Option<i32> {
        // SAFETY: FLI ids are tagged; a non-region yields a kind no region
        // has.
        let kind = unsafe { mti_GetRegionKind(obj.as_ptr()) };
        (kind != 0).then_some(kind)
    }

    fn region_name(&mut self, region: RawRef) -> Option<String> {
        // SAFETY: the name is owned by the simulator.
        unsafe { owned(mti_GetRegionName(region.as_ptr())) }
    }

    fn region_full_name(&mut self, region: RawRef) -> Option<String> {
        // SAFETY: the full name is allocated for the caller.
        unsafe { owned_and_freed(mti_GetRegionFullName(region.as_ptr())) }
    }

    fn region_source(&mut self, region: RawRef) -> Option<(String, String)> {
        // SAFETY: both strings are owned by the simulator.
        unsafe {
            let unit = owned(mti_GetPrimaryName(region.as_ptr()))?;
            let file = owned(mti_GetRegionSourceName(region.as_ptr()))?;
            Some((unit, file))
        }
    }

    fn signals(&mut self, region: RawRef) -> Vec<RawRef> {
        // SAFETY: region is live; the signal cursor is global to the FLI
        // and fully drained here.
        unsafe { chain(mti_FirstSignal(region.as_ptr()), |_| mti_NextSignal()) }
    }

    fn variables(&mut self, region: RawRef) -> Vec<RawRef> {
        // SAFETY: as for signals.
        unsafe { chain(mti_FirstVarByRegion(region.as_ptr()), |_| mti_NextVar()) }
    }

    fn find_signal(&mut self, path: &str) -> Option<RawRef> {
        let path = CString::new(path).ok()?;
        // SAFETY: path outlives the call.
        RawRef::from_ptr(unsafe { mti_FindSignal(path.as_ptr()) })
    }

    fn find_var(&mut self, path: &str) -> Option<RawRef> {
        let path = CString::new(path).ok()?;
        // SAFETY: path outlives the call.
        RawRef::from_ptr(unsafe { mti_FindVar(path.as_ptr()) })
    }

    fn sub_elements(&mut self, obj: RawRef, var: bool) -> Vec<RawRef> {
        let count = match self.type_of(obj, var) {
            Some(ty) => ty.length,
            None => return Vec::new(),
        };
        // SAFETY: the simulator allocates an array of `count` ids for the
        // caller, freed below.
        unsafe {
            let ids = if var {
                mti_GetVarSubelements(obj.as_ptr(), ptr::null_mut())
            } else {
                mti_GetSignalSubelements(obj.as_ptr(), ptr::null_mut())
            };
            if ids.is_null() {
                return Vec::new();
            }
            let out = (0..count)
                .filter_map(|i| RawRef::from_ptr(*ids.add(i)))
                .collect();
            mti_VsimFree(ids.cast());
            out
        }
    }

    fn object_name(&mut self, obj: RawRef, var: bool) -> Option<String> {
        // SAFETY: names are owned by the simulator.
        unsafe {
            if var {
                owned(mti_GetVarName(obj.as_ptr()))
            } else {
                owned(mti_GetSignalName(obj.as_ptr()))
            }
        }
    }

    fn type_of(&mut self, obj: RawRef, var: bool) -> Option<FliType> {
        // SAFETY: the type id belongs to a live object.
        unsafe { fli_type(Self::type_id(obj, var)) }
    }

    fn get_value(&mut self, obj: RawRef, var: bool) -> Option<FliValue> {
        let ty = self.type_of(obj, var)?;
        let id = obj.as_ptr();
        // SAFETY: every buffer is sized from the object's type and outlives
        // the call that fills it.
        unsafe {
            match ty.kind {
                MTI_TYPE_ENUM | MTI_TYPE_SCALAR | MTI_TYPE_PHYSICAL => {
                    let v = if var { mti_GetVarValue(id) } else { mti_GetSignalValue(id) };
                    Some(FliValue::Int(i64::from(v)))
                }
                MTI_TYPE_REAL => {
                    let mut v = 0f64;
                    let buf = (&mut v as *mut f64).cast();
                    if var {
                        mti_GetVarValueIndirect(id, buf);
                    } else {
                        mti_GetSignalValueIndirect(id, buf);
                    }
                    Some(FliValue::Real(v))
                }
                MTI_TYPE_TIME => {
                    let mut t = MtiTime64 { hi: 0, lo: 0 };
                    let buf = (&mut t as *mut MtiTime64).cast();
                    if var {
                        mti_GetVarValueIndirect(id, buf);
                    } else {
                        mti_GetSignalValueIndirect(id, buf);
                    }
                    Some(FliValue::Int((i64::from(t.hi) << 32) | i64::from(t.lo)))
                }
                MTI_TYPE_ARRAY => {
                    let element = ty.element.as_deref()?;
                    if element.kind != MTI_TYPE_ENUM || element_size(element) != 1 {
                        return None;
                    }
                    let mut buf = vec![0u8; ty.length];
                    let out = buf.as_mut_ptr().cast();
                    if var {
                        mti_GetArrayVarValue(id, out);
                    } else {
                        mti_GetArraySignalValue(id, out);
                    }
                    Some(FliValue::Bytes(buf))
                }
                _ => None,
            }
        }
    }

    fn set_signal(&mut self, signal: RawRef, value: &FliValue) -> bool {
        set_value(value, |v| {
            // SAFETY: v is an immediate or points at a buffer alive for the
            // call.
            unsafe { mti_SetSignalValue(signal.as_ptr(), v) }
        })
    }

    fn set_var(&mut self, var: RawRef, value: &FliValue) -> bool {
        set_value(value, |v| {
            // SAFETY: as for signals.
            unsafe { mti_SetVarValue(var.as_ptr(), v) }
        })
    }

    fn force(&mut self, signal: RawRef, literal: &str) -> bool {
        let Ok(literal) = CString::new(literal) else {
            return false;
        };
        // SAFETY: literal outlives the call; -1 periods mean never cancel
        // and never repeat.
        unsafe {
            mti_ForceSignal(
                signal.as_ptr(),
                literal.as_ptr(),
                0,
                MTI_FORCE_FREEZE,
                -1,
                -1,
            ) != 0
        }
    }

    fn release(&mut self, signal: RawRef) -> bool {
        // SAFETY: signal is a live signal id.
        unsafe { mti_ReleaseSignal(signal.as_ptr()) != 0 }
    }

    fn create_process(
        &mut self,
        name: &str,
        func: ProcessFn,
        param: *mut c_void,
        priority: i32,
    ) -> Option<RawRef> {
        let name = CString::new(name).ok()?;
        // SAFETY: the simulator copies the name; param stays valid for the
        // life of the process.
        RawRef::from_ptr(unsafe {
            mti_CreateProcessWithPriority(name.as_ptr(), func, param, priority)
        })
    }

    fn sensitize(&mut self, process: RawRef, signal: RawRef) {
        // SAFETY: both ids are live.
        unsafe { mti_Sensitize(process.as_ptr(), signal.as_ptr(), MTI_EVENT) }
    }

    fn desensitize(&mut self, process: RawRef) {
        // SAFETY: process is a live process id.
        unsafe { mti_Desensitize(process.as_ptr()) }
    }

    fn schedule_wakeup(&mut self, process: RawRef, delay: u64) {
        let delay = MtiTime64 {
            hi: (delay >> 32) as i32,
            lo: delay as u32,
        };
        // SAFETY: process is a live process id.
        unsafe { mti_ScheduleWakeup64(process.as_ptr(), delay) }
    }

    fn add_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        // SAFETY: param outlives the registration.
        unsafe { mti_AddLoadDoneCB(func, param) }
    }

    fn remove_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        // SAFETY: removal matches on the pair only.
        unsafe { mti_RemoveLoadDoneCB(func, param) }
    }

    fn add_quit_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        // SAFETY: param outlives the registration.
        unsafe { mti_AddQuitCB(func, param) }
    }

    fn remove_quit_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        // SAFETY: removal matches on the pair only.
        unsafe { mti_RemoveQuitCB(func, param) }
    }

    fn product(&mut self) -> String {
        // SAFETY: the version string is owned by the simulator.
        unsafe { owned(mti_GetProductVersion()).unwrap_or_default() }
    }

    fn now(&mut self) -> u64 {
        // SAFETY: plain queries.
        let (hi, lo) = unsafe { (mti_NowUpper(), mti_Now()) };
        (u64::from(hi as u32) << 32) | u64::from(lo as u32)
    }

    fn resolution(&mut self) -> i32 {
        // SAFETY: plain query.
        unsafe { mti_GetResolutionLimit() }
    }

    fn finish(&mut self) {
        // SAFETY: ends the simulation after the current callback returns.
        unsafe { mti_Quit() }
    }
}

/// Pass `value` to a `mti_Set*Value` routine: integers by value, reals and
/// arrays by address. The routines return nothing, so any value that could
/// be encoded counts as accepted.
fn set_value(value: &FliValue, set: impl FnOnce(c_long)) -> bool {
    match value {
        FliValue::Int(v) => match c_long::try_from(*v) {
            Ok(v) => set(v),
            Err(_) => return false,
        },
        FliValue::Real(v) => {
            let mut v = *v;
            set(&mut v as *mut f64 as c_long);
        }
        FliValue::Bytes(bytes) => {
            let mut buf = bytes.clone();
            set(buf.as_mut_ptr() as c_long);
        }
    }
    true
}
