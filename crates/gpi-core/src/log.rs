//! Logging: severities, the overridable sink, and native diagnostic routing.
//!
//! Everything in the workspace logs through `tracing`. [`init`] installs a
//! subscriber with two outputs: the `tracing-subscriber` fmt layer on stderr,
//! and a [`SinkLayer`] that forwards records to a handler installed by the
//! embedding layer. Exactly one of the two receives a given event: the fmt
//! layer is muted while a handler is installed.
//!
//! Handlers are kept per thread. All simulator callbacks arrive on the
//! simulator's delivery thread, which is also where the handler is installed.

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Log severity, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Parse a severity name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Numeric level on the 5..50 scale used across the C boundary.
    pub fn level(&self) -> i32 {
        match self {
            Self::Trace => 5,
            Self::Debug => 10,
            Self::Info => 20,
            Self::Warning => 30,
            Self::Error => 40,
            Self::Critical => 50,
        }
    }

    /// Inverse of [`Severity::level`]; values between steps round down.
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=9 => Self::Trace,
            10..=19 => Self::Debug,
            20..=29 => Self::Info,
            30..=39 => Self::Warning,
            40..=49 => Self::Error,
            _ => Self::Critical,
        }
    }

    fn from_tracing(level: Level, critical: bool) -> Self {
        match level {
            Level::TRACE => Self::Trace,
            Level::DEBUG => Self::Debug,
            Level::INFO => Self::Info,
            Level::WARN => Self::Warning,
            _ if critical => Self::Critical,
            _ => Self::Error,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One log record as delivered to a [`LogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Logger name, e.g. `gpi.vpi`.
    pub logger: String,
    pub severity: Severity,
    pub file: String,
    pub function: String,
    pub line: u32,
    pub message: String,
}

/// Receiver for log records, installed by the embedding layer.
pub trait LogSink {
    fn log(&self, record: &LogRecord);
}

static MAX_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

thread_local! {
    static SINK: RefCell<Option<Box<dyn LogSink>>> = RefCell::new(None);
}

/// Set the least severe level that is still emitted.
pub fn set_max_severity(severity: Severity) {
    MAX_SEVERITY.store(severity.as_u8(), Ordering::Relaxed);
}

pub fn max_severity() -> Severity {
    match MAX_SEVERITY.load(Ordering::Relaxed) {
        0 => Severity::Trace,
        1 => Severity::Debug,
        2 => Severity::Info,
        3 => Severity::Warning,
        4 => Severity::Error,
        _ => Severity::Critical,
    }
}

fn enabled(meta: &Metadata<'_>) -> bool {
    // Critical events are ERROR-level on the tracing side.
    Severity::from_tracing(*meta.level(), false) >= max_severity().min(Severity::Error)
}

/// Install a handler; returns the one it replaces.
pub fn set_sink(sink: Option<Box<dyn LogSink>>) -> Option<Box<dyn LogSink>> {
    SINK.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => std::mem::replace(&mut *slot, sink),
        // A handler is being invoked right now; leave it in place.
        Err(_) => sink,
    })
}

pub fn sink_installed() -> bool {
    SINK.with(|cell| cell.try_borrow().map(|s| s.is_some()).unwrap_or(true))
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(severity: Severity) {
    set_max_severity(severity);
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter_fn(|meta| enabled(meta) && !sink_installed()));
    let _ = tracing_subscriber::registry()
        .with(SinkLayer)
        .with(fmt)
        .try_init();
}

/// Forwards events to the installed [`LogSink`], if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkLayer;

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !sink_installed() {
            return;
        }
        let meta = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let severity = Severity::from_tracing(*meta.level(), visitor.critical);
        if severity < max_severity() {
            return;
        }
        let record = LogRecord {
            logger: visitor
                .logger
                .unwrap_or_else(|| meta.target().replace("::", ".")),
            severity,
            file: visitor
                .native_file
                .unwrap_or_else(|| meta.file().unwrap_or_default().to_string()),
            function: meta.module_path().unwrap_or_default().to_string(),
            line: visitor
                .native_line
                .unwrap_or_else(|| meta.line().unwrap_or(0)),
            message: visitor.message,
        };
        SINK.with(|cell| {
            if let Ok(slot) = cell.try_borrow() {
                if let Some(sink) = slot.as_ref() {
                    sink.log(&record);
                }
            }
        });
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    extra: String,
    logger: Option<String>,
    native_file: Option<String>,
    native_line: Option<u32>,
    critical: bool,
}

impl RecordVisitor {
    fn push_extra(&mut self, name: &str, value: &dyn fmt::Display) {
        let _ = write!(self.extra, " {name}={value}");
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "logger" => self.logger = Some(value.to_string()),
            "native_file" => self.native_file = Some(value.to_string()),
            name => self.push_extra(name, &value),
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "native_line" => self.native_line = u32::try_from(value).ok(),
            name => self.push_extra(name, &value),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        match field.name() {
            "critical" => self.critical = value,
            name => self.push_extra(name, &value),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            name => {
                let _ = write!(self.extra, " {name}={value:?}");
            }
        }
    }
}

/// Emit a diagnostic reported by a native backend.
///
/// `logger` names the backend (`gpi.vpi`, ...); the native file and line
/// replace this crate's source location in sink records.
pub fn native_diagnostic(
    logger: &str,
    severity: Severity,
    message: &str,
    file: Option<&str>,
    line: Option<u32>,
) {
    let native_file = file.unwrap_or_default();
    let native_line = u64::from(line.unwrap_or(0));
    match severity {
        Severity::Trace => {
            tracing::trace!(logger, native_file, native_line, "{message}")
        }
        Severity::Debug => {
            tracing::debug!(logger, native_file, native_line, "{message}")
        }
        Severity::Info => tracing::info!(logger, native_file, native_line, "{message}"),
        Severity::Warning => {
            tracing::warn!(logger, native_file, native_line, "{message}")
        }
        Severity::Error => {
            tracing::error!(logger, native_file, native_line, "{message}")
        }
        Severity::Critical => tracing::error!(
            logger,
            native_file,
            native_line,
            critical = true,
            "{message}"
        ),
    }
}
