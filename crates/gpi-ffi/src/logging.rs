//! Exported log-sink override and log level control.

use std::ffi::{c_char, c_int, c_void, CString};

use gpi_core::log::{self, LogRecord, LogSink};
use gpi_core::Severity;

use crate::boundary::{guarded, opt_str_arg, str_arg};

/// Receives every log record while installed: user data, logger name,
/// numeric level, source file, function, line and message.
pub type GpiLogHandler = unsafe extern "C" fn(
    userdata: *mut c_void,
    logger: *const c_char,
    level: c_int,
    file: *const c_char,
    function: *const c_char,
    line: c_int,
    message: *const c_char,
);

fn c_string(text: &str) -> CString {
    let end = text.find('\0').unwrap_or(text.len());
    CString::new(&text[..end]).unwrap_or_default()
}

struct HandlerSink {
    handler: GpiLogHandler,
    userdata: usize,
}

impl LogSink for HandlerSink {
    fn log(&self, record: &LogRecord) {
        let logger = c_string(&record.logger);
        let file = c_string(&record.file);
        let function = c_string(&record.function);
        let message = c_string(&record.message);
        // SAFETY: the handler was installed together with its user data and
        // stays callable until it is replaced.
        unsafe {
            (self.handler)(
                self.userdata as *mut c_void,
                logger.as_ptr(),
                record.severity.level(),
                file.as_ptr(),
                function.as_ptr(),
                c_int::try_from(record.line).unwrap_or(c_int::MAX),
                message.as_ptr(),
            );
        }
    }
}

/// Route log records to `handler`; null restores the default stderr sink.
#[no_mangle]
pub extern "C" fn gpi_set_log_handler(handler: Option<GpiLogHandler>, userdata: *mut c_void) {
    let sink = handler.map(|handler| {
        Box::new(HandlerSink {
            handler,
            userdata: userdata as usize,
        }) as Box<dyn LogSink>
    });
    log::set_sink(sink);
}

#[no_mangle]
pub extern "C" fn gpi_clear_log_handler() {
    log::set_sink(None);
}

/// Set the least severe level emitted, using the numeric scale
/// (5 trace, 10 debug, 20 info, 30 warning, 40 error, 50 critical).
/// Returns the previous level.
#[no_mangle]
pub extern "C" fn gpi_set_log_level(level: c_int) -> c_int {
    let previous = log::max_severity();
    log::set_max_severity(Severity::from_level(level));
    previous.level()
}

#[no_mangle]
pub extern "C" fn gpi_get_log_level() -> c_int {
    log::max_severity().level()
}

/// Emit a record on behalf of the upper layer.
///
/// # Safety
///
/// `logger` and `message` are NUL-terminated strings; `file` is null or
/// one.
#[no_mangle]
pub unsafe extern "C" fn gpi_log(
    logger: *const c_char,
    level: c_int,
    file: *const c_char,
    line: c_int,
    message: *const c_char,
) {
    guarded("log", (), || {
        let logger = str_arg(logger, "logger")?;
        let message = str_arg(message, "message")?;
        let file = opt_str_arg(file, "file")?;
        log::native_diagnostic(
            logger,
            Severity::from_level(level),
            message,
            file,
            u32::try_from(line).ok(),
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_nul_is_cut() {
        assert_eq!(c_string("ab\0c").as_bytes(), b"ab");
        assert_eq!(c_string("").as_bytes(), b"");
    }
}
