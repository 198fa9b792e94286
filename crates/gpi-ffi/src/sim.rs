//! Exported simulator queries and control.

use std::ffi::{c_char, c_int};
use std::ptr;

use tracing::info;

use gpi_core::{global, GpiError};

use crate::boundary::{guarded, scratch, store, with_gpi};

/// Ask the simulator to finish; repeated requests are ignored.
#[no_mangle]
pub extern "C" fn gpi_sim_end() -> c_int {
    guarded("sim_end", -1, || {
        with_gpi(|gpi| gpi.sim_end())?;
        Ok(0)
    })
}

/// Current time in precision units, split into 32-bit words.
///
/// # Safety
///
/// `high` and `low` are valid for a write.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_sim_time(high: *mut u32, low: *mut u32) -> c_int {
    guarded("get_sim_time", -1, || {
        let (hi, lo) = with_gpi(|gpi| gpi.sim_time())?;
        store(high, hi, "high")?;
        store(low, lo, "low")?;
        Ok(0)
    })
}

/// Simulator time precision as a power of ten in seconds.
///
/// # Safety
///
/// `out` is valid for a write.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_sim_precision(out: *mut i32) -> c_int {
    guarded("get_sim_precision", -1, || {
        let precision = with_gpi(|gpi| gpi.sim_precision())?;
        store(out, precision, "out")?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn gpi_get_simulator_product() -> *const c_char {
    guarded("get_simulator_product", ptr::null(), || {
        let info = with_gpi(|gpi| gpi.sim_info())?;
        Ok(scratch(info.product.as_bytes()))
    })
}

#[no_mangle]
pub extern "C" fn gpi_get_simulator_version() -> *const c_char {
    guarded("get_simulator_version", ptr::null(), || {
        let info = with_gpi(|gpi| gpi.sim_info())?;
        Ok(scratch(info.version.as_bytes()))
    })
}

/// Drop the instance, deliver the shutdown notification if it is still
/// due, and free every handle, iterator and callback.
///
/// The instance is gone before the notification runs, so a shutdown
/// handler cannot call back into the GPI.
#[no_mangle]
pub extern "C" fn gpi_teardown() {
    guarded("teardown", (), || {
        if let Some(gpi) = global::uninstall() {
            let mut gpi = gpi
                .try_borrow_mut()
                .map_err(|_| GpiError::corrupted("teardown while the GPI was busy"))?;
            gpi.notify_shutdown();
            gpi.teardown();
            info!("GPI shut down");
        }
        Ok(())
    })
}
