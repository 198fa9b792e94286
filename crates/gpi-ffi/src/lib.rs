//! C surface of the Generic Procedural Interface.
//!
//! Builds as the shared library a simulator loads. The `gpi_*` exports give
//! the embedded test runtime a stable calling convention over the GPI
//! running on the simulator's thread; none of them unwinds.
//!
//! ## Modules
//!
//! - [`bootstrap`] — Creating the per-thread GPI and registering adapters
//! - [`object`] — Handle resolution, traversal and metadata exports
//! - [`value`] — Signal read and write exports
//! - [`callback`] — Callback registration exports
//! - [`sim`] — Simulator time, identity, end request and teardown
//! - [`logging`] — Log handler override and level control
//! - [`lifecycle`] — Attach and shutdown hooks
//! - `entry` — Simulator load entry points (feature `native`)

mod boundary;
pub mod bootstrap;
pub mod callback;
#[cfg(feature = "native")]
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod object;
pub mod sim;
pub mod value;

// Re-export key types for convenience
pub use bootstrap::{load, load_with, AdapterFactory};
pub use callback::GpiCallbackFn;
pub use error::FfiError;
pub use lifecycle::{GpiAttachFn, GpiShutdownFn};
pub use logging::GpiLogHandler;
