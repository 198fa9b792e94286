//! Exported handle resolution, traversal and object metadata.
//!
//! Handles and iterators cross the boundary as non-zero `u64` ids; 0 is
//! the null result.

use std::ffi::{c_char, c_int};
use std::ptr;

use gpi_core::{global, ObjectHandle};

use crate::boundary::{
    flag, guarded, handle_arg, iter_arg, opt_str_arg, scratch, str_arg, with_gpi,
};
use crate::error::Result;

fn inspect<R>(handle: u64, f: impl FnOnce(&ObjectHandle) -> R) -> Result<R> {
    let id = handle_arg(handle)?;
    with_gpi(|gpi| Ok(f(gpi.handle(id)?)))
}

/// 1 when a GPI instance is running on this thread.
#[no_mangle]
pub extern "C" fn gpi_has_instance() -> c_int {
    flag(global::is_installed())
}

/// Toplevel handle, optionally required to be named `name`.
///
/// # Safety
///
/// `name` is null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_root_handle(name: *const c_char) -> u64 {
    guarded("get_root_handle", 0, || {
        let name = opt_str_arg(name, "name")?;
        with_gpi(|gpi| gpi.root(name)).map(|id| id.raw())
    })
}

/// Fill `out` with up to `capacity` package handles; returns how many
/// packages exist, or -1. Handles beyond `capacity` are released.
///
/// # Safety
///
/// `out` is valid for `capacity` writes, or null when `capacity` is 0.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_packages(out: *mut u64, capacity: usize) -> i64 {
    guarded("get_packages", -1, || {
        let found = with_gpi(|gpi| {
            let found = gpi.packages()?;
            for &surplus in found.iter().skip(capacity) {
                gpi.release(surplus)?;
            }
            Ok(found)
        })?;
        if !out.is_null() {
            for (i, id) in found.iter().take(capacity).enumerate() {
                out.add(i).write(id.raw());
            }
        }
        Ok(i64::try_from(found.len()).unwrap_or(i64::MAX))
    })
}

/// Child `name` of `parent`, searching every adapter.
///
/// # Safety
///
/// `name` is a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_handle_by_name(parent: u64, name: *const c_char) -> u64 {
    guarded("get_handle_by_name", 0, || {
        let parent = handle_arg(parent)?;
        let name = str_arg(name, "name")?;
        with_gpi(|gpi| gpi.handle_by_name(parent, name)).map(|id| id.raw())
    })
}

#[no_mangle]
pub extern "C" fn gpi_get_handle_by_index(parent: u64, index: i64) -> u64 {
    guarded("get_handle_by_index", 0, || {
        let parent = handle_arg(parent)?;
        with_gpi(|gpi| gpi.handle_by_index(parent, index)).map(|id| id.raw())
    })
}

/// 0 on success, -1 if the handle was not live.
#[no_mangle]
pub extern "C" fn gpi_release_handle(handle: u64) -> c_int {
    guarded("release_handle", -1, || {
        let id = handle_arg(handle)?;
        with_gpi(|gpi| gpi.release(id))?;
        Ok(0)
    })
}

/// Start a traversal of `parent`'s children; 0 when it has none.
#[no_mangle]
pub extern "C" fn gpi_iterate(parent: u64) -> u64 {
    guarded("iterate", 0, || {
        let parent = handle_arg(parent)?;
        let iter = with_gpi(|gpi| gpi.iterate(parent))?;
        Ok(iter.map_or(0, |id| id.raw()))
    })
}

/// Next child; 0 once the traversal is exhausted, which also ends the
/// iterator.
#[no_mangle]
pub extern "C" fn gpi_next(iter: u64) -> u64 {
    guarded("next", 0, || {
        let iter = iter_arg(iter)?;
        let child = with_gpi(|gpi| gpi.next(iter))?;
        Ok(child.map_or(0, |id| id.raw()))
    })
}

#[no_mangle]
pub extern "C" fn gpi_release_iterator(iter: u64) -> c_int {
    guarded("release_iterator", -1, || {
        let iter = iter_arg(iter)?;
        with_gpi(|gpi| gpi.release_iterator(iter))?;
        Ok(0)
    })
}

#[no_mangle]
pub extern "C" fn gpi_get_name_str(handle: u64) -> *const c_char {
    guarded("get_name_str", ptr::null(), || {
        inspect(handle, |h| scratch(h.name().as_bytes()))
    })
}

#[no_mangle]
pub extern "C" fn gpi_get_full_name_str(handle: u64) -> *const c_char {
    guarded("get_full_name_str", ptr::null(), || {
        inspect(handle, |h| scratch(h.full_name().as_bytes()))
    })
}

/// Object kind code; -1 for an invalid handle.
#[no_mangle]
pub extern "C" fn gpi_get_object_type(handle: u64) -> c_int {
    guarded("get_object_type", -1, || inspect(handle, |h| h.kind().code()))
}

/// Lower-case kind name, e.g. `generate-array`.
#[no_mangle]
pub extern "C" fn gpi_get_type_str(handle: u64) -> *const c_char {
    guarded("get_type_str", ptr::null(), || {
        inspect(handle, |h| scratch(h.kind().to_string().as_bytes()))
    })
}

#[no_mangle]
pub extern "C" fn gpi_is_constant(handle: u64) -> c_int {
    guarded("is_constant", -1, || inspect(handle, |h| flag(h.meta().is_const)))
}

#[no_mangle]
pub extern "C" fn gpi_is_indexable(handle: u64) -> c_int {
    guarded("is_indexable", -1, || inspect(handle, |h| flag(h.meta().indexable)))
}

#[no_mangle]
pub extern "C" fn gpi_get_num_elems(handle: u64) -> i64 {
    guarded("get_num_elems", -1, || {
        inspect(handle, |h| i64::try_from(h.meta().num_elems).unwrap_or(i64::MAX))
    })
}

/// Width in bits of a signal; -1 for anything else.
#[no_mangle]
pub extern "C" fn gpi_get_signal_width(handle: u64) -> i64 {
    guarded("get_signal_width", -1, || {
        let id = handle_arg(handle)?;
        let width = with_gpi(|gpi| Ok(gpi.handle(id)?.require_signal()?.width()))?;
        Ok(i64::try_from(width).unwrap_or(i64::MAX))
    })
}

/// Declared range of an indexable object. Returns 0 and fills the outputs
/// when there is one, 1 when the object has no range, -1 on error.
///
/// # Safety
///
/// Each output is null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn gpi_get_range(
    handle: u64,
    left: *mut i64,
    right: *mut i64,
    direction: *mut c_int,
) -> c_int {
    guarded("get_range", -1, || {
        let Some(range) = inspect(handle, |h| h.meta().range)? else {
            return Ok(1);
        };
        for (out, value) in [(left, range.left), (right, range.right)] {
            if !out.is_null() {
                out.write(value);
            }
        }
        if !direction.is_null() {
            direction.write(range.direction.code());
        }
        Ok(0)
    })
}

/// Name of the defining module or entity; null when there is none.
#[no_mangle]
pub extern "C" fn gpi_get_definition_name(handle: u64) -> *const c_char {
    guarded("get_definition_name", ptr::null(), || {
        inspect(handle, |h| match &h.meta().definition {
            Some(def) => scratch(def.name.as_bytes()),
            None => ptr::null(),
        })
    })
}

/// Source file of the definition; null when unknown.
#[no_mangle]
pub extern "C" fn gpi_get_definition_file(handle: u64) -> *const c_char {
    guarded("get_definition_file", ptr::null(), || {
        inspect(handle, |h| {
            match h.meta().definition.as_ref().and_then(|d| d.file.as_deref()) {
                Some(file) => scratch(file.as_bytes()),
                None => ptr::null(),
            }
        })
    })
}
