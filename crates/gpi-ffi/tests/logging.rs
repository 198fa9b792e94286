//! Log handler override and level control through the exported functions.
//!
//! One test per binary: the level filter is process-wide.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CStr, CString};

use gpi_core::{global, Adapter, GpiConfig, Severity};
use gpi_ffi::logging::*;
use gpi_ffi::object::gpi_get_handle_by_name;
use gpi_ffi::load_with;
use gpi_testkit::{fixture, Sim};
use gpi_vpi::{MockVpi, VpiAdapter};

#[derive(Debug, Clone, PartialEq)]
struct Captured {
    logger: String,
    level: c_int,
    file: String,
    line: c_int,
    message: String,
}

fn owned(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn capture(
    userdata: *mut c_void,
    logger: *const c_char,
    level: c_int,
    file: *const c_char,
    _function: *const c_char,
    line: c_int,
    message: *const c_char,
) {
    let records = &*(userdata as *const RefCell<Vec<Captured>>);
    records.borrow_mut().push(Captured {
        logger: owned(logger),
        level,
        file: owned(file),
        line,
        message: owned(message),
    });
}

fn emit(logger: &str, level: Severity, message: &str) {
    let logger = CString::new(logger).unwrap();
    let file = CString::new("test_dut.py").unwrap();
    let message = CString::new(message).unwrap();
    unsafe { gpi_log(logger.as_ptr(), level.level(), file.as_ptr(), 12, message.as_ptr()) };
}

#[test]
fn handler_receives_records_until_cleared() {
    let sim = Sim::new(fixture::mixed_design()).shared();
    let factory = move |name: &str, _: &GpiConfig| -> Option<Box<dyn Adapter>> {
        match name {
            "vpi" => Some(Box::new(VpiAdapter::new(MockVpi::new(sim.clone())))),
            _ => None,
        }
    };
    load_with(GpiConfig::default(), "vpi", &factory).unwrap();
    assert_eq!(gpi_get_log_level(), Severity::Info.level());

    let records = RefCell::new(Vec::<Captured>::new());
    let userdata = &records as *const RefCell<Vec<Captured>> as *mut c_void;
    gpi_set_log_handler(Some(capture), userdata);

    emit("cocotb.regression", Severity::Warning, "3 tests left");
    emit("cocotb.regression", Severity::Debug, "filtered out");
    assert_eq!(
        *records.borrow(),
        vec![Captured {
            logger: "cocotb.regression".to_string(),
            level: Severity::Warning.level(),
            file: "test_dut.py".to_string(),
            line: 12,
            message: "3 tests left".to_string(),
        }]
    );

    // A failing export reports through the handler too.
    let name = CString::new("clk").unwrap();
    assert_eq!(unsafe { gpi_get_handle_by_name(99, name.as_ptr()) }, 0);
    assert!(records
        .borrow()
        .iter()
        .any(|r| r.level == Severity::Error.level() && r.message.contains("call failed")));

    let previous = gpi_set_log_level(Severity::Debug.level());
    assert_eq!(previous, Severity::Info.level());
    emit("cocotb.regression", Severity::Debug, "now visible");
    assert_eq!(
        records.borrow().last().map(|r| r.message.clone()),
        Some("now visible".to_string())
    );

    gpi_set_log_level(Severity::Critical.level());
    assert_eq!(gpi_get_log_level(), Severity::Critical.level());
    let before = records.borrow().len();
    emit("cocotb.regression", Severity::Error, "below the threshold");
    assert_eq!(records.borrow().len(), before);
    gpi_set_log_level(previous);

    gpi_clear_log_handler();
    emit("cocotb.regression", Severity::Warning, "to stderr");
    assert_eq!(records.borrow().len(), before);

    global::uninstall();
}
