//! VHDL VHPI adapter for the Generic Procedural Interface.
//!
//! ## Modules
//!
//! - [`api`] — The VHPI routines the adapter calls, as a trait
//! - [`adapter`] — [`VhpiAdapter`], classifying VHDL objects by type and mapping values and callbacks
//! - [`consts`] — Kinds, relations, properties, value formats and callback reasons
//! - `native` — Bindings to the simulator's `vhpi_*` symbols (feature `native`)
//! - `mock` — The routines over an in-memory simulation (feature `testkit`)

pub mod adapter;
pub mod api;
pub mod consts;
#[cfg(any(test, feature = "testkit"))]
pub mod mock;
#[cfg(feature = "native")]
pub mod native;

pub use adapter::VhpiAdapter;
pub use api::{VhpiApi, VhpiDiagnostic, VhpiValue};
#[cfg(any(test, feature = "testkit"))]
pub use mock::MockVhpi;
#[cfg(feature = "native")]
pub use native::NativeVhpi;
