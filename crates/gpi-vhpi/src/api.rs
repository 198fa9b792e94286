//! The slice of the VHPI routine set the adapter uses, with Rust types at
//! the seam.

use gpi_core::RawRef;

/// A value crossing `vhpi_get_value` / `vhpi_put_value`.
#[derive(Debug, Clone, PartialEq)]
pub enum VhpiValue {
    /// `vhpiBinStrVal`: one character per scalar element.
    BinStr(String),
    /// `vhpiLogicVal`: `std_ulogic` position.
    Logic(u8),
    /// `vhpiLogicVecVal`
    LogicVec(Vec<u8>),
    /// `vhpiEnumVal`: literal position.
    Enum(u32),
    /// `vhpiEnumVecVal`
    EnumVec(Vec<u32>),
    /// `vhpiIntVal`
    Int(i32),
    /// `vhpiRealVal`
    Real(f64),
    /// `vhpiStrVal`. Written values carry their terminating NUL.
    Str(Vec<u8>),
    /// `vhpiCharVal`
    Char(u8),
}

/// Error state reported by `vhpi_check_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhpiDiagnostic {
    /// `vhpiNote` .. `vhpiFailure`
    pub severity: i32,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

pub trait VhpiApi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef>;
    /// Element `index` of the one-to-many `relation` below `parent`.
    fn handle_by_index(&mut self, relation: i32, parent: RawRef, index: i32) -> Option<RawRef>;
    /// One-to-one relation; `obj` is `None` for the class relations
    /// (`vhpiRootInst`, `vhpiTool`).
    fn handle(&mut self, relation: i32, obj: Option<RawRef>) -> Option<RawRef>;
    /// One-to-many relation; `None` when it is empty.
    fn iterator(&mut self, relation: i32, parent: RawRef) -> Option<RawRef>;
    /// Next object of an iterator. The simulator frees the iterator when
    /// this returns `None`.
    fn scan(&mut self, iterator: RawRef) -> Option<RawRef>;
    fn release_handle(&mut self, obj: RawRef) -> bool;

    fn get(&mut self, property: i32, obj: RawRef) -> i32;
    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String>;
    /// Physical property in femtoseconds.
    fn get_phys(&mut self, property: i32, obj: Option<RawRef>) -> i64;
    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VhpiValue>;
    fn put_value(&mut self, obj: RawRef, value: &VhpiValue, mode: i32);

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
    fn check_error(&mut self) -> Option<VhpiDiagnostic>;
}
