//! Backend-neutral core of the Generic Procedural Interface.
//!
//! Lets an embedded test runtime observe and drive a running hardware
//! simulation through whichever native procedural interfaces the simulator
//! exposes, behind one contract.
//!
//! ## Modules
//!
//! - [`handle`] — Object handles, native references and the handle arena
//! - [`iter`] — Relation-list traversal shared by the adapters
//! - [`callback`] — Callback handles and their lifecycle states
//! - [`logic`] / [`value`] — Multi-valued logic and value marshalling
//! - [`name`] — Hierarchical name synthesis
//! - [`adapter`] — The contract each native backend implements
//! - [`gpi`] — Registrar and dispatcher over the registered adapters
//! - [`global`] — Per-thread instance used by native entry points
//! - [`config`] / [`log`] — Configuration and logging

pub mod adapter;
pub mod callback;
pub mod config;
pub mod error;
pub mod global;
pub mod gpi;
pub mod handle;
pub mod iter;
pub mod kind;
pub mod log;
pub mod logic;
pub mod name;
pub mod value;

// Re-export key types for convenience
pub use adapter::{Adapter, ArmRequest, SimInfo};
pub use callback::{CallbackId, CallbackKind, CbState, Edge, UserFn};
pub use config::GpiConfig;
pub use error::{fatal, GpiError, Result};
pub use gpi::{dispatch, Fired, Gpi, IterId, LifecycleListener};
pub use handle::{AdapterId, HandleId, HandleMeta, ObjectHandle, RawRef};
pub use iter::{IterState, NativeWalk, NextChild, Relation, SubIter};
pub use kind::{ObjectKind, Range, RangeDirection};
pub use log::Severity;
pub use value::{SetAction, Value, ValueFormat};
