//! Symbols the simulator looks up when it loads the library.
//!
//! VPI and VHPI simulators walk a null-terminated table of startup
//! routines; FLI calls a foreign-architecture init function. Each of them
//! brings up the GPI with its own backend as the one being registered.

use std::ffi::{c_char, c_void};
use std::panic;

use tracing::error;

use gpi_core::{Adapter, GpiConfig};
use gpi_fli::{FliAdapter, NativeFli};
use gpi_vhpi::{NativeVhpi, VhpiAdapter};
use gpi_vpi::{NativeVpi, VpiAdapter};

use crate::bootstrap;

/// Adapters over the simulator's exported interfaces.
pub fn native_adapter(name: &str, config: &GpiConfig) -> Option<Box<dyn Adapter>> {
    match name {
        "vpi" => Some(Box::new(VpiAdapter::new(NativeVpi::new()))),
        "vhpi" => Some(Box::new(VhpiAdapter::new(NativeVhpi::new()))),
        "fli" => Some(Box::new(
            FliAdapter::new(NativeFli::new()).with_timer_pool(config.fli.timer_pool),
        )),
        _ => None,
    }
}

fn start(backend: &'static str) {
    let outcome = panic::catch_unwind(|| bootstrap::load(backend, &native_adapter));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(backend, %err, "GPI failed to start"),
        Err(_) => {
            error!(critical = true, backend, "panic while starting the GPI");
            std::process::abort()
        }
    }
}

extern "C" fn vpi_startup() {
    start("vpi");
}

extern "C" fn vhpi_startup() {
    start("vhpi");
}

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static vlog_startup_routines: [Option<extern "C" fn()>; 2] = [Some(vpi_startup), None];

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static vhpi_startup_routines: [Option<extern "C" fn()>; 2] = [Some(vhpi_startup), None];

/// Foreign-architecture init called by FLI simulators. The arguments
/// describe the instantiating region and are not used.
#[no_mangle]
pub extern "C" fn gpi_fli_entry(
    _region: *mut c_void,
    _param: *mut c_char,
    _generics: *mut c_void,
    _ports: *mut c_void,
) {
    start("fli");
}
