//! Proprietary FLI adapter for the Generic Procedural Interface.
//!
//! ## Modules
//!
//! - [`api`] — The FLI routines the adapter calls, as a trait
//! - [`adapter`] — [`FliAdapter`], mapping regions, signals and variables onto GPI handles
//! - [`consts`] — Region kinds, type kinds, process priorities and force types
//! - `pool` — Reusable simulator processes backing callbacks
//! - `native` — Bindings to the simulator's `mti_*` symbols (feature `native`)
//! - `mock` — The routines over an in-memory simulation (feature `testkit`)

pub mod adapter;
pub mod api;
pub mod consts;
#[cfg(any(test, feature = "testkit"))]
pub mod mock;
#[cfg(feature = "native")]
pub mod native;
mod pool;

pub use adapter::FliAdapter;
pub use api::{FliApi, FliType, FliValue, ProcessFn};
#[cfg(any(test, feature = "testkit"))]
pub use mock::{FliWaker, MockFli};
#[cfg(feature = "native")]
pub use native::NativeFli;
