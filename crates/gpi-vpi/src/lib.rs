//! SystemVerilog VPI adapter for the Generic Procedural Interface.
//!
//! ## Modules
//!
//! - [`api`] — The VPI routines the adapter calls, as a trait
//! - [`adapter`] — [`VpiAdapter`], mapping VPI objects, values and callbacks onto the GPI
//! - [`consts`] — Object types, properties and callback reasons
//! - `native` — Bindings to the simulator's `vpi_*` symbols (feature `native`)
//! - `mock` — The routines over an in-memory simulation (feature `testkit`)

pub mod adapter;
pub mod api;
pub mod consts;
#[cfg(any(test, feature = "testkit"))]
pub mod mock;
#[cfg(feature = "native")]
pub mod native;

// Re-export key types for convenience
pub use adapter::VpiAdapter;
pub use api::{VpiApi, VpiDiagnostic, VpiValue};
#[cfg(any(test, feature = "testkit"))]
pub use mock::MockVpi;
#[cfg(feature = "native")]
pub use native::NativeVpi;
