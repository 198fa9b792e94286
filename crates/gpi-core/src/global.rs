//! The process's GPI instance, reachable from native entry points.
//!
//! Simulators call back through plain C function pointers that carry only a
//! user-data word. The trampolines in the adapter crates turn that word into
//! a [`CallbackId`] and hand it to [`fire`], which finds the instance here.
//! The instance lives on the simulator's delivery thread.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::error;

use crate::callback::CallbackId;
use crate::error::{fatal, GpiError, Result};
use crate::gpi::{dispatch, Fired, Gpi};

thread_local! {
    static INSTANCE: RefCell<Option<Rc<RefCell<Gpi>>>> = const { RefCell::new(None) };
}

/// Make `gpi` the instance for this thread, replacing any previous one.
pub fn install(gpi: Gpi) -> Rc<RefCell<Gpi>> {
    let shared = Rc::new(RefCell::new(gpi));
    INSTANCE.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&shared)));
    shared
}

pub fn instance() -> Option<Rc<RefCell<Gpi>>> {
    INSTANCE.with(|slot| slot.borrow().clone())
}

pub fn is_installed() -> bool {
    INSTANCE.with(|slot| slot.borrow().is_some())
}

/// Remove the instance, returning it.
pub fn uninstall() -> Option<Rc<RefCell<Gpi>>> {
    INSTANCE.with(|slot| slot.borrow_mut().take())
}

/// Run `f` against the instance.
///
/// Fails if no instance is installed, or if it is already borrowed further
/// up the stack.
pub fn with<R>(f: impl FnOnce(&mut Gpi) -> Result<R>) -> Result<R> {
    let gpi = instance().ok_or_else(|| GpiError::unsupported("GPI is not initialised"))?;
    let mut guard = gpi
        .try_borrow_mut()
        .map_err(|_| GpiError::corrupted("GPI re-entered while busy"))?;
    f(&mut guard)
}

/// Deliver a native callback fire. Returns the user function's result, or
/// 0 when nothing ran.
///
/// A fire that cannot be matched to a live callback means native and local
/// state have diverged; the process aborts.
pub fn fire(token: u64) -> i32 {
    let id = CallbackId::from_raw(token);
    let Some(gpi) = instance() else {
        fatal(&GpiError::corrupted(format!(
            "{id} fired before the GPI was initialised"
        )))
    };
    match dispatch(&gpi, id) {
        Ok(Fired::Called(ret)) => ret,
        Ok(Fired::Filtered | Fired::Squashed) => 0,
        Err(err @ GpiError::Corrupted { .. }) => fatal(&err),
        Err(err) => {
            error!(%id, %err, "callback dispatch failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpiConfig;

    #[test]
    fn install_and_uninstall() {
        assert!(with(|_| Ok(())).is_err());
        install(Gpi::new(GpiConfig::default()));
        assert!(is_installed());
        let names = with(|gpi| Ok(gpi.adapter_names())).unwrap();
        assert!(names.is_empty());
        assert!(uninstall().is_some());
        assert!(!is_installed());
    }

    #[test]
    fn nested_use_is_refused() {
        install(Gpi::new(GpiConfig::default()));
        let err = with(|_| with(|_| Ok(()))).unwrap_err();
        assert!(matches!(err, GpiError::Corrupted { .. }));
        uninstall();
    }
}
