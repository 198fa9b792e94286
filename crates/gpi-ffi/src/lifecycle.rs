//! Exported lifecycle hooks: attach and shutdown notifications.

use std::ffi::{c_char, c_int, c_void, CString};

use gpi_core::{LifecycleListener, SimInfo};

use crate::boundary::{guarded, with_gpi};

/// Called once when the simulation starts, with the simulator's product
/// name and version.
pub type GpiAttachFn =
    unsafe extern "C" fn(ctx: *mut c_void, product: *const c_char, version: *const c_char);

/// Called once when the simulator shuts down.
pub type GpiShutdownFn = unsafe extern "C" fn(ctx: *mut c_void);

struct HookListener {
    attach: Option<GpiAttachFn>,
    shutdown: Option<GpiShutdownFn>,
    ctx: usize,
}

impl LifecycleListener for HookListener {
    fn attached(&self, info: &SimInfo) {
        let Some(attach) = self.attach else {
            return;
        };
        let product = CString::new(info.product.replace('\0', "")).unwrap_or_default();
        let version = CString::new(info.version.replace('\0', "")).unwrap_or_default();
        // SAFETY: hooks and their context were registered together.
        unsafe { attach(self.ctx as *mut c_void, product.as_ptr(), version.as_ptr()) }
    }

    fn shutdown(&self) {
        if let Some(shutdown) = self.shutdown {
            // SAFETY: as above.
            unsafe { shutdown(self.ctx as *mut c_void) }
        }
    }
}

/// Install the lifecycle hooks. Either may be null. Returns 0, or -1 if no
/// GPI is running.
#[no_mangle]
pub extern "C" fn gpi_set_lifecycle(
    attach: Option<GpiAttachFn>,
    shutdown: Option<GpiShutdownFn>,
    ctx: *mut c_void,
) -> c_int {
    guarded("set_lifecycle", -1, || {
        let listener = HookListener {
            attach,
            shutdown,
            ctx: ctx as usize,
        };
        with_gpi(|gpi| gpi.install_lifecycle(Box::new(listener)))?;
        Ok(0)
    })
}
