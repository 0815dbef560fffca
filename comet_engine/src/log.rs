//! Internal logging system.
//!
//! Severity-tagged console logging with a swappable [`Logger`] backend.
//! The default logger prints colored, timestamped lines. `Fatal` and `Error`
//! entries carry file/line information. Release builds compile `Info` and
//! below out of the macros entirely.

use colored::{Color, Colorize};
use std::io::Write;
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom logging implementations.
///
/// Implement this to redirect engine logs (file logging, test capture, etc.)
/// and install it with [`set_logger`].
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// A single log message with its metadata.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,
    /// Source subsystem, e.g. `"comet::mesh"` or `"comet::vulkan"`
    pub source: &'static str,
    pub message: String,
    /// Source file, only for Error/Fatal entries
    pub file: Option<&'static str>,
    /// Source line, only for Error/Fatal entries
    pub line: Option<u32>,
}

/// Log severity levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Unrecoverable condition; the engine is about to shut down
    Fatal,
}

impl LogSeverity {
    /// Fixed-width tag printed in front of every message.
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO",
            LogSeverity::Warn => "WARN",
            LogSeverity::Error => "ERROR",
            LogSeverity::Fatal => "FATAL",
        }
    }

    fn color(self) -> Color {
        match self {
            LogSeverity::Trace => Color::BrightBlack,
            LogSeverity::Debug => Color::Cyan,
            LogSeverity::Info => Color::Green,
            LogSeverity::Warn => Color::Yellow,
            LogSeverity::Error | LogSeverity::Fatal => Color::Red,
        }
    }
}

/// Default logger: one colored line per entry on stderr.
///
/// `HH:MM:SS.mmm LEVEL [source] message (file:line)`, where the trailing
/// origin only appears on entries that carry one (Error/Fatal).
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let time: DateTime<Local> = entry.timestamp.into();

        // Pad before coloring so the escape codes don't break alignment
        let mut tag = format!("{:<5}", entry.severity.label()).color(entry.severity.color());
        if entry.severity >= LogSeverity::Error {
            tag = tag.bold();
        }

        let origin = match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(" ({}:{})", file, line),
            _ => String::new(),
        };

        let mut out = std::io::stderr().lock();
        let _ = writeln!(
            out,
            "{} {} [{}] {}{}",
            time.format("%H:%M:%S%.3f"),
            tag,
            entry.source.bright_blue(),
            entry.message,
            origin
        );
    }
}

static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Replace the process-global logger.
pub fn set_logger(logger: Box<dyn Logger>) {
    if let Ok(mut slot) = logger_slot().write() {
        *slot = logger;
    }
}

/// Minimum severity that reaches the logger. Release builds drop Info and
/// below.
pub const fn min_severity() -> LogSeverity {
    if cfg!(debug_assertions) {
        LogSeverity::Trace
    } else {
        LogSeverity::Warn
    }
}

/// Log through the global logger. Prefer the `engine_*!` macros.
pub fn log(severity: LogSeverity, source: &'static str, message: String) {
    log_detailed(severity, source, message, None, None);
}

/// Log with optional file/line detail. Used by the error/fatal macros.
pub fn log_detailed(
    severity: LogSeverity,
    source: &'static str,
    message: String,
    file: Option<&'static str>,
    line: Option<u32>,
) {
    if (severity as u8) < (min_severity() as u8) {
        return;
    }
    let entry = LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source,
        message,
        file,
        line,
    };
    if let Ok(slot) = logger_slot().read() {
        slot.log(&entry);
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (dropped in release builds)
#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Trace, $source, format!($($arg)*))
    };
}

/// Log a DEBUG message (dropped in release builds)
#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Debug, $source, format!($($arg)*))
    };
}

/// Log an INFO message (dropped in release builds)
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Info, $source, format!($($arg)*))
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::Warn, $source, format!($($arg)*))
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            Some(file!()),
            Some(line!()),
        )
    };
}

/// Log a FATAL message with file:line information
#[macro_export]
macro_rules! engine_fatal {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Fatal,
            $source,
            format!($($arg)*),
            Some(file!()),
            Some(line!()),
        )
    };
}

/// Build an [`EngineError`](crate::error::EngineError) variant carrying a
/// message, logging it as it is created.
///
/// ```ignore
/// return Err(engine_err!(ApiObjectCreate, "comet::vulkan", "no device: {e}"));
/// ```
#[macro_export]
macro_rules! engine_err {
    ($kind:ident, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::error::EngineError::$kind(message)
    }};
}

/// `return Err(engine_err!(...))` in one step.
#[macro_export]
macro_rules! engine_bail {
    ($kind:ident, $source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($kind, $source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
