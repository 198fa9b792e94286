//! The slice of the VPI routine set the adapter uses, with Rust types at
//! the seam. The simulator build binds it to the real `vpi_*` symbols;
//! tests bind it to an in-memory simulation.

use gpi_core::{RawRef, SimInfo};

/// A value crossing `vpi_get_value` / `vpi_put_value`.
#[derive(Debug, Clone, PartialEq)]
pub enum VpiValue {
    /// `vpiBinStrVal`
    BinStr(String),
    /// `vpiIntVal`
    Int(i32),
    /// `vpiRealVal`
    Real(f64),
    /// `vpiStringVal`, without the terminating NUL.
    Str(Vec<u8>),
}

/// Error state reported by `vpi_chk_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpiDiagnostic {
    /// `vpiNotice` .. `vpiInternal`
    pub level: i32,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

pub trait VpiApi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef>;
    fn handle_by_index(&mut self, parent: RawRef, index: i32) -> Option<RawRef>;
    /// One-to-one relation (`vpiLeftRange`, ...).
    fn handle(&mut self, relation: i32, obj: RawRef) -> Option<RawRef>;
    /// One-to-many relation; `None` when it is empty.
    fn iterate(&mut self, relation: i32, parent: Option<RawRef>) -> Option<RawRef>;
    /// Next object of an iterator. The simulator frees the iterator when
    /// this returns `None`.
    fn scan(&mut self, iterator: RawRef) -> Option<RawRef>;
    fn release_handle(&mut self, obj: RawRef) -> bool;

    fn get(&mut self, property: i32, obj: Option<RawRef>) -> i32;
    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String>;
    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VpiValue>;
    fn put_value(&mut self, obj: RawRef, value: &VpiValue, flags: i32);

    /// Register a callback that passes `user_data` back when it fires.
    fn register_cb(
        &mut self,
        reason: i32,
        obj: Option<RawRef>,
        delay: u64,
        user_data: u64,
    ) -> Option<RawRef>;
    fn remove_cb(&mut self, cb: RawRef) -> bool;

    fn sim_time(&mut self) -> u64;
    fn finish(&mut self);
    fn info(&mut self) -> SimInfo;
    fn chk_error(&mut self) -> Option<VpiDiagnostic>;
}
