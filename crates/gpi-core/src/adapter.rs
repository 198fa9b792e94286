//! The contract every native backend adapter satisfies.
//!
//! Adapters are flat implementations of [`Adapter`]; the registrar holds
//! them as trait objects and routes each request by the adapter id carried
//! on the handle.

use crate::callback::CallbackId;
use crate::error::Result;
use crate::handle::{AdapterId, ObjectHandle, RawRef};
use crate::iter::{IterState, NextChild};
use crate::value::{SetAction, Value};

/// Identity of the hosting simulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimInfo {
    pub product: String,
    pub version: String,
}

/// Native scheduling primitive requested for one callback.
#[derive(Debug, Clone, Copy)]
pub enum ArmRequest<'a> {
    ValueChange(&'a ObjectHandle),
    /// Relative delay in simulator precision units.
    Timer(u64),
    ReadOnly,
    ReadWrite,
    NextTimeStep,
    StartOfSim,
    EndOfSim,
}

impl ArmRequest<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueChange(_) => "value-change",
            Self::Timer(_) => "timer",
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::NextTimeStep => "next-time-step",
            Self::StartOfSim => "start-of-simulation",
            Self::EndOfSim => "end-of-simulation",
        }
    }
}

/// A native procedural-interface backend.
///
/// Resolution methods return `Ok(None)` when the object does not exist (or
/// belongs to another adapter) and reserve `Err` for failures worth
/// reporting.
pub trait Adapter {
    /// Short backend name (`"vpi"`, `"vhpi"`, `"fli"`).
    fn name(&self) -> &'static str;

    /// Called once when the adapter is registered.
    fn attach(&mut self, id: AdapterId);

    fn sim_info(&mut self) -> SimInfo;

    /// Toplevel unit. `name` filters it; a toplevel that exists but has
    /// another name is [`crate::GpiError::RootMismatch`].
    fn root(&mut self, name: Option<&str>) -> Result<Option<ObjectHandle>>;

    /// Top-level package scopes. Backends without packages have none.
    fn packages(&mut self) -> Result<Vec<ObjectHandle>> {
        Ok(Vec::new())
    }

    /// Child `name` of `parent`. `parent` may belong to another adapter;
    /// its native reference is then meaningless here and the child is
    /// looked up by its fully qualified name instead.
    fn by_name(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>>;

    fn by_index(&mut self, parent: &ObjectHandle, index: i64) -> Result<Option<ObjectHandle>>;

    /// Materialize a raw reference yielded by another adapter's traversal
    /// of `parent`, if this adapter owns it. `raw` is only inspected: the
    /// returned handle holds this adapter's own reference and `raw` stays
    /// with the adapter that yielded it.
    fn by_raw(&mut self, parent: &ObjectHandle, raw: RawRef) -> Result<Option<ObjectHandle>>;

    /// Start a traversal; `None` when the object is a leaf for this backend.
    fn iterate(&mut self, parent: &ObjectHandle) -> Result<Option<IterState>>;

    fn next_child(&mut self, state: &mut IterState) -> Result<NextChild>;

    /// Free a traversal abandoned before exhaustion.
    fn close_iterator(&mut self, state: IterState);

    /// Free a native object reference.
    fn release(&mut self, raw: RawRef);

    fn read_binstr(&mut self, handle: &ObjectHandle) -> Result<String>;

    fn read_str(&mut self, handle: &ObjectHandle) -> Result<Vec<u8>>;

    fn read_real(&mut self, handle: &ObjectHandle) -> Result<f64>;

    fn read_long(&mut self, handle: &ObjectHandle) -> Result<i64>;

    fn write(&mut self, handle: &ObjectHandle, value: &Value, action: SetAction) -> Result<()>;

    /// Register a native callback that reports `token` when it fires.
    /// Returns the native registration.
    fn arm(&mut self, token: CallbackId, request: ArmRequest<'_>) -> Result<RawRef>;

    /// Drop a native registration. `fired` is true when a one-shot
    /// registration was consumed by firing and only bookkeeping remains.
    fn disarm(&mut self, registration: RawRef, fired: bool) -> Result<()>;

    /// Current simulation time in precision units.
    fn sim_time(&mut self) -> u64;

    /// Time precision as a power-of-ten exponent of seconds.
    fn sim_precision(&mut self) -> i32;

    /// Ask the simulator to finish.
    fn finish(&mut self);
}
