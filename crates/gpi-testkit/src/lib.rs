//! Deterministic stand-in simulator for GPI tests.
//!
//! ## Modules
//!
//! - [`design`] — Elaborated hierarchy with typed values and force/release
//! - [`kernel`] — Simulation time, timers, watchers and phase callbacks
//! - [`sim`] — Design plus kernel plus the native object space mocks use
//! - [`fixture`] — Designs shared by the adapter and integration tests

pub mod design;
pub mod error;
pub mod fixture;
pub mod kernel;
pub mod sim;

pub use design::{Design, Drive, Lang, NodeId, NodeKind, NodeValue};
pub use error::TestkitError;
pub use kernel::{Kernel, Trigger};
pub use sim::{run_until, NativeObj, SharedSim, Sim};
