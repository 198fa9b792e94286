//! The exported functions over a mixed Verilog/VHDL simulation, with the
//! VPI and VHPI adapters registered side by side.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use gpi_core::{global, Adapter, GpiConfig, ObjectKind, RangeDirection};
use gpi_ffi::callback::*;
use gpi_ffi::lifecycle::gpi_set_lifecycle;
use gpi_ffi::object::*;
use gpi_ffi::sim::*;
use gpi_ffi::value::*;
use gpi_ffi::load_with;
use gpi_testkit::sim::{finish, start};
use gpi_testkit::{fixture, run_until, Drive, NodeValue, SharedSim, Sim};
use gpi_vhpi::{MockVhpi, VhpiAdapter};
use gpi_vpi::{MockVpi, VpiAdapter};

fn mocks(sim: SharedSim) -> impl Fn(&str, &GpiConfig) -> Option<Box<dyn Adapter>> {
    move |name: &str, _: &GpiConfig| -> Option<Box<dyn Adapter>> {
        match name {
            "vpi" => Some(Box::new(VpiAdapter::new(MockVpi::new(sim.clone())))),
            "vhpi" => Some(Box::new(VhpiAdapter::new(MockVhpi::new(sim.clone())))),
            _ => None,
        }
    }
}

/// Load both entry points the way a mixed-language simulator would.
fn boot(sim: &SharedSim) {
    let factory = mocks(sim.clone());
    load_with(GpiConfig::default(), "vpi", &factory).unwrap();
    load_with(GpiConfig::default(), "vhpi", &factory).unwrap();
}

fn mixed() -> SharedSim {
    Sim::new(fixture::mixed_design()).shared()
}

fn text(ptr: *const c_char) -> String {
    assert!(!ptr.is_null());
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn root() -> u64 {
    unsafe { gpi_get_root_handle(ptr::null()) }
}

fn by_name(parent: u64, name: &str) -> u64 {
    let name = c(name);
    unsafe { gpi_get_handle_by_name(parent, name.as_ptr()) }
}

fn long(handle: u64) -> i64 {
    let mut out = 0;
    assert_eq!(unsafe { gpi_get_signal_value_long(handle, &mut out) }, 0);
    out
}

fn deliver(sim: &SharedSim, until: u64) -> usize {
    run_until(sim, until, |ud| {
        global::fire(ud);
    })
}

unsafe extern "C" fn bump(ctx: *mut c_void) -> c_int {
    let hits = &*(ctx as *const Cell<i32>);
    hits.set(hits.get() + 1);
    hits.get()
}

fn ctx_of<T>(value: &T) -> *mut c_void {
    value as *const T as *mut c_void
}

#[test]
fn hierarchy_spans_both_languages() {
    let sim = mixed();
    boot(&sim);
    assert_eq!(gpi_has_instance(), 1);
    let top = root();
    assert_ne!(top, 0);
    assert_eq!(text(gpi_get_full_name_str(top)), "top");
    assert_eq!(gpi_get_object_type(top), ObjectKind::Module.code());

    let iter = gpi_iterate(top);
    assert_ne!(iter, 0);
    let mut children = Vec::new();
    loop {
        let child = gpi_next(iter);
        if child == 0 {
            break;
        }
        children.push(text(gpi_get_full_name_str(child)));
    }
    assert!(children.contains(&"top.clk".to_string()));
    assert!(children.contains(&"top.u_sub".to_string()));
    // Yielded by VPI as a foreign object, resolved by VHPI.
    assert!(children.contains(&"top.u_vhdl".to_string()));
    assert_eq!(gpi_next(iter), 0);

    let vhdl = by_name(top, "u_vhdl");
    assert_eq!(gpi_get_object_type(vhdl), ObjectKind::Module.code());
    assert_eq!(text(gpi_get_name_str(vhdl)), "u_vhdl");
    let vec = by_name(vhdl, "vec");
    assert_eq!(text(gpi_get_full_name_str(vec)), "top.u_vhdl.vec");
    assert_eq!(gpi_get_signal_width(vec), 4);
    assert_eq!(gpi_is_indexable(vec), 1);
    let (mut left, mut right, mut dir) = (0i64, 0i64, 0 as c_int);
    assert_eq!(unsafe { gpi_get_range(vec, &mut left, &mut right, &mut dir) }, 0);
    assert_eq!((left, right, dir), (3, 0, RangeDirection::Descending.code()));
    assert_eq!(
        unsafe { gpi_get_range(vhdl, ptr::null_mut(), ptr::null_mut(), ptr::null_mut()) },
        1
    );
    let bit = gpi_get_handle_by_index(vec, 3);
    assert_eq!(text(gpi_get_full_name_str(bit)), "top.u_vhdl.vec[3]");

    let sub = by_name(top, "u_sub");
    assert_eq!(text(gpi_get_definition_name(sub)), "sub");
    let width = by_name(top, "WIDTH");
    assert_eq!(gpi_is_constant(width), 1);
    assert_eq!(text(gpi_get_type_str(width)), "integer");

    gpi_teardown();
    assert_eq!(gpi_has_instance(), 0);
}

#[test]
fn packages_fill_the_callers_buffer() {
    let sim = mixed();
    boot(&sim);
    let mut out = [0u64; 4];
    let count = unsafe { gpi_get_packages(out.as_mut_ptr(), out.len()) };
    assert_eq!(count, 1);
    assert_eq!(text(gpi_get_full_name_str(out[0])), "pkg::");
    let depth = by_name(out[0], "DEPTH");
    assert_eq!(text(gpi_get_full_name_str(depth)), "pkg::DEPTH");
    assert_eq!(long(depth), 16);

    // Without room the count is still reported.
    assert_eq!(unsafe { gpi_get_packages(ptr::null_mut(), 0) }, 1);
    gpi_teardown();
}

#[test]
fn values_cross_the_boundary() {
    let sim = mixed();
    boot(&sim);
    let top = root();

    let data = by_name(top, "data");
    let bits = c("10100101");
    assert_eq!(unsafe { gpi_set_signal_value_binstr(data, bits.as_ptr(), 0) }, 0);
    assert_eq!(text(gpi_get_signal_value_binstr(data)), "10100101");
    assert_eq!(long(data), 0xA5);

    let count = by_name(top, "count");
    assert_eq!(gpi_set_signal_value_int(count, -5, 0), 0);
    assert_eq!(long(count), -5);

    let temp = by_name(top, "temp");
    assert_eq!(gpi_set_signal_value_real(temp, 2.5, 0), 0);
    let mut real = 0.0;
    assert_eq!(unsafe { gpi_get_signal_value_real(temp, &mut real) }, 0);
    assert_eq!(real, 2.5);

    let msg = by_name(top, "msg");
    let hi = c("hi");
    assert_eq!(unsafe { gpi_set_signal_value_str(msg, hi.as_ptr(), 0) }, 0);
    assert!(text(gpi_get_signal_value_str(msg)).starts_with("hi"));

    let vhdl = by_name(top, "u_vhdl");
    let cnt = by_name(vhdl, "cnt");
    assert_eq!(gpi_set_signal_value_int(cnt, 42, 0), 0);
    assert_eq!(long(cnt), 42);

    let (mut high, mut low) = (1u32, 1u32);
    assert_eq!(unsafe { gpi_get_sim_time(&mut high, &mut low) }, 0);
    assert_eq!((high, low), (0, 0));
    gpi_teardown();
}

#[test]
fn failures_map_to_null_results() {
    let sim = mixed();
    boot(&sim);
    let top = root();
    assert_eq!(by_name(top, "nope"), 0);
    let other = c("other");
    assert_eq!(unsafe { gpi_get_root_handle(other.as_ptr()) }, 0);
    assert_eq!(unsafe { gpi_get_handle_by_name(top, ptr::null()) }, 0);
    assert_eq!(by_name(0, "clk"), 0);

    let data = by_name(top, "data");
    assert_eq!(gpi_set_signal_value_int(data, 1, 9), -1);
    assert!(gpi_get_signal_value_binstr(top).is_null());
    assert_eq!(unsafe { gpi_get_signal_value_long(data, ptr::null_mut()) }, -1);
    assert_eq!(gpi_get_signal_width(top), -1);

    assert_eq!(gpi_release_handle(data), 0);
    assert_eq!(gpi_release_handle(data), -1);
    assert_eq!(gpi_release_handle(0), -1);
    assert_eq!(gpi_release_iterator(77), -1);
    assert_eq!(gpi_remove_callback(0), -1);
    gpi_teardown();

    // Nothing is running any more.
    assert_eq!(root(), 0);
    assert_eq!(gpi_sim_end(), -1);
}

#[test]
fn abandoned_iterator_is_released() {
    let sim = mixed();
    boot(&sim);
    let top = root();
    let iter = gpi_iterate(top);
    assert_ne!(gpi_next(iter), 0);
    assert_eq!(gpi_release_iterator(iter), 0);
    assert_eq!(gpi_next(iter), 0);
    assert_eq!(gpi_release_iterator(iter), -1);
    gpi_teardown();
}

#[test]
fn callbacks_call_c_functions() {
    let sim = mixed();
    boot(&sim);
    let hits = Cell::new(0);

    let timer = gpi_register_timed_callback(Some(bump), ctx_of(&hits), 10);
    assert_ne!(timer, 0);
    assert_eq!(deliver(&sim, 10), 1);
    assert_eq!(hits.get(), 1);
    let (mut high, mut low) = (0u32, 0u32);
    unsafe { gpi_get_sim_time(&mut high, &mut low) };
    assert_eq!((high, low), (0, 10));

    assert_eq!(gpi_prime_callback(timer), 0);
    deliver(&sim, 20);
    assert_eq!(hits.get(), 2);

    let late = gpi_register_timed_callback(Some(bump), ctx_of(&hits), 5);
    assert_eq!(gpi_remove_callback(late), 0);
    deliver(&sim, 30);
    assert_eq!(hits.get(), 2);

    assert_eq!(gpi_register_readonly_callback(None, ctx_of(&hits)), 0);
    gpi_teardown();
}

#[test]
fn edges_on_a_vhdl_signal() {
    let sim = mixed();
    boot(&sim);
    let top = root();
    let vhdl = by_name(top, "u_vhdl");
    let sig = by_name(vhdl, "sig");
    let rises = Cell::new(0);
    assert_eq!(
        gpi_register_value_change_callback(Some(bump), ctx_of(&rises), sig, 7),
        0
    );
    let watch = gpi_register_value_change_callback(Some(bump), ctx_of(&rises), sig, 1);
    assert_ne!(watch, 0);

    let node = {
        let sim = sim.borrow();
        let design = &sim.design;
        let top = design.roots()[0];
        let inst = design.lookup(top, "u_vhdl").unwrap();
        design.lookup(inst, "sig").unwrap()
    };
    for bit in ["1", "0", "1"] {
        sim.borrow_mut()
            .write(node, NodeValue::Logic(bit.into()), Drive::Deposit)
            .unwrap();
        deliver(&sim, 0);
    }
    assert_eq!(rises.get(), 2);

    assert_eq!(gpi_remove_callback(watch), 0);
    sim.borrow_mut()
        .write(node, NodeValue::Logic("0".into()), Drive::Deposit)
        .unwrap();
    sim.borrow_mut()
        .write(node, NodeValue::Logic("1".into()), Drive::Deposit)
        .unwrap();
    deliver(&sim, 0);
    assert_eq!(rises.get(), 2);
    gpi_teardown();
}

#[derive(Default)]
struct Hooks {
    attached: RefCell<Vec<(String, String)>>,
    shutdowns: Cell<u32>,
}

unsafe extern "C" fn on_attach(ctx: *mut c_void, product: *const c_char, version: *const c_char) {
    let hooks = &*(ctx as *const Hooks);
    hooks
        .attached
        .borrow_mut()
        .push((text(product), text(version)));
}

unsafe extern "C" fn on_shutdown(ctx: *mut c_void) {
    let hooks = &*(ctx as *const Hooks);
    hooks.shutdowns.set(hooks.shutdowns.get() + 1);
}

#[test]
fn lifecycle_hooks_fire_once() {
    let sim = Sim::new(fixture::mixed_design())
        .with_identity("mocksim", "1.2")
        .with_precision(-12)
        .shared();
    boot(&sim);
    let hooks = Hooks::default();
    assert_eq!(
        gpi_set_lifecycle(Some(on_attach), Some(on_shutdown), ctx_of(&hooks)),
        0
    );

    start(&sim, |ud| {
        global::fire(ud);
    });
    assert_eq!(
        *hooks.attached.borrow(),
        vec![("mocksim".to_string(), "1.2".to_string())]
    );
    assert_eq!(text(gpi_get_simulator_product()), "mocksim");
    assert_eq!(text(gpi_get_simulator_version()), "1.2");
    let mut precision = 0;
    assert_eq!(unsafe { gpi_get_sim_precision(&mut precision) }, 0);
    assert_eq!(precision, -12);

    assert_eq!(gpi_sim_end(), 0);
    assert_eq!(gpi_sim_end(), 0);
    assert!(sim.borrow().finish_requested());
    finish(&sim, |ud| {
        global::fire(ud);
    });
    assert_eq!(hooks.shutdowns.get(), 1);

    gpi_teardown();
    assert_eq!(hooks.shutdowns.get(), 1);
    assert_eq!(hooks.attached.borrow().len(), 1);
}

#[test]
fn teardown_delivers_a_missed_shutdown() {
    let sim = mixed();
    boot(&sim);
    let hooks = Hooks::default();
    gpi_set_lifecycle(None, Some(on_shutdown), ctx_of(&hooks));
    gpi_teardown();
    assert_eq!(hooks.shutdowns.get(), 1);
    // Not attached without a start of simulation.
    assert!(hooks.attached.borrow().is_empty());
}
