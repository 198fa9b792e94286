//! The slice of the FLI routine set the adapter uses, with Rust types at
//! the seam.
//!
//! FLI keeps separate routine families for signals and variables
//! (`mti_GetSignalValue` / `mti_GetVarValue`, ...); object routines take a
//! `var` flag choosing between them. There is no error poll: failures come
//! back as `None` or `false`.

use std::ffi::c_void;

use gpi_core::RawRef;

/// Body of a simulator process, or of a load-done / quit callback.
pub type ProcessFn = extern "C" fn(*mut c_void);

/// Type of a signal or variable, as far as the adapter needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct FliType {
    /// `MTI_TYPE_*`
    pub kind: i32,
    /// Index bounds of an array type (`mti_TickLeft` / `mti_TickRight`).
    pub left: i64,
    pub right: i64,
    /// `mti_TickDir` is -1.
    pub descending: bool,
    /// Element count of an array, literal count of an enumeration.
    pub length: usize,
    /// Literal images of an enumeration (`mti_GetEnumValues`).
    pub literals: Vec<String>,
    /// Element type of an array.
    pub element: Option<Box<FliType>>,
}

impl FliType {
    pub fn scalar(kind: i32) -> Self {
        Self {
            kind,
            left: 0,
            right: 0,
            descending: false,
            length: 1,
            literals: Vec::new(),
            element: None,
        }
    }

    pub fn enumeration(literals: Vec<String>) -> Self {
        Self {
            length: literals.len(),
            literals,
            ..Self::scalar(crate::consts::MTI_TYPE_ENUM)
        }
    }

    pub fn array(left: i64, right: i64, element: FliType) -> Self {
        Self {
            kind: crate::consts::MTI_TYPE_ARRAY,
            left,
            right,
            descending: left > right,
            length: (left - right).unsigned_abs() as usize + 1,
            literals: Vec::new(),
            element: Some(Box::new(element)),
        }
    }
}

/// A value crossing `mti_Get*Value` / `mti_Set*Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum FliValue {
    /// Integer, physical, or enumeration position.
    Int(i64),
    Real(f64),
    /// Array of enumeration positions or characters, left element first.
    Bytes(Vec<u8>),
}

pub trait FliApi {
    // ---- Regions ----

    /// `mti_GetTopRegion` and its siblings.
    fn top_regions(&mut self) -> Vec<RawRef>;
    /// `mti_FindRegion` on a `/`-separated path.
    fn find_region(&mut self, path: &str) -> Option<RawRef>;
    /// `mti_FirstLowerRegion` / `mti_NextRegion`.
    fn child_regions(&mut self, region: RawRef) -> Vec<RawRef>;
    /// `mti_GetRegionKind`; `None` when `obj` is not a region.
    fn region_kind(&mut self, obj: RawRef) -> Option<i32>;
    fn region_name(&mut self, region: RawRef) -> Option<String>;
    /// `/`-separated path of a region.
    fn region_full_name(&mut self, region: RawRef) -> Option<String>;
    /// Design unit name and source file (`mti_GetPrimaryName`,
    /// `mti_GetRegionSourceName`).
    fn region_source(&mut self, region: RawRef) -> Option<(String, String)>;

    // ---- Objects ----

    /// `mti_FirstSignal` / `mti_NextSignal`.
    fn signals(&mut self, region: RawRef) -> Vec<RawRef>;
    /// Variables declared in the region's processes.
    fn variables(&mut self, region: RawRef) -> Vec<RawRef>;
    fn find_signal(&mut self, path: &str) -> Option<RawRef>;
    fn find_var(&mut self, path: &str) -> Option<RawRef>;
    /// Elements of an array or fields of a record, left element first.
    fn sub_elements(&mut self, obj: RawRef, var: bool) -> Vec<RawRef>;
    fn object_name(&mut self, obj: RawRef, var: bool) -> Option<String>;
    fn type_of(&mut self, obj: RawRef, var: bool) -> Option<FliType>;
    fn get_value(&mut self, obj: RawRef, var: bool) -> Option<FliValue>;
    fn set_signal(&mut self, signal: RawRef, value: &FliValue) -> bool;
    fn set_var(&mut self, var: RawRef, value: &FliValue) -> bool;
    /// `mti_ForceSignal` with a VHDL literal, freezing the signal.
    fn force(&mut self, signal: RawRef, literal: &str) -> bool;
    fn release(&mut self, signal: RawRef) -> bool;

    // ---- Processes and callbacks ----

    /// `mti_CreateProcessWithPriority`. Processes cannot be deleted.
    fn create_process(
        &mut self,
        name: &str,
        func: ProcessFn,
        param: *mut c_void,
        priority: i32,
    ) -> Option<RawRef>;
    /// Wake `process` on every event on `signal`.
    fn sensitize(&mut self, process: RawRef, signal: RawRef);
    fn desensitize(&mut self, process: RawRef);
    /// Wake `process` once, `delay` precision units from now.
    fn schedule_wakeup(&mut self, process: RawRef, delay: u64);
    fn add_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void);
    fn remove_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void);
    fn add_quit_cb(&mut self, func: ProcessFn, param: *mut c_void);
    fn remove_quit_cb(&mut self, func: ProcessFn, param: *mut c_void);

    // ---- Simulator ----

    /// `mti_GetProductVersion`, e.g. `Questa Sim-64 2024.1`.
    fn product(&mut self) -> String;
    fn now(&mut self) -> u64;
    /// `mti_GetResolutionLimit`: power-of-ten exponent.
    fn resolution(&mut self) -> i32;
    fn finish(&mut self);
}
