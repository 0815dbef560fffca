//! Unit tests for the logging system.

use super::*;
use serial_test::serial;
use std::sync::{Arc, Mutex};

#[test]
fn severity_ordering_matches_verbosity() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
    assert!(LogSeverity::Error < LogSeverity::Fatal);
}

#[test]
fn min_severity_keeps_warnings_in_release() {
    // Warn and above must always reach the logger
    assert!(LogSeverity::Warn >= min_severity());
    assert!(LogSeverity::Fatal >= min_severity());
}

struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[test]
#[serial]
fn installed_logger_receives_entries() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    set_logger(Box::new(CaptureLogger { entries: Arc::clone(&entries) }));

    crate::engine_warn!("comet::test", "captured {}", 42);

    let captured = entries.lock().unwrap();
    let entry = captured.last().expect("warning must be captured");
    assert_eq!(entry.severity, LogSeverity::Warn);
    assert_eq!(entry.source, "comet::test");
    assert_eq!(entry.message, "captured 42");
    assert!(entry.file.is_none());
    drop(captured);

    set_logger(Box::new(DefaultLogger));
}

#[test]
#[serial]
fn error_macro_attaches_file_and_line() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    set_logger(Box::new(CaptureLogger { entries: Arc::clone(&entries) }));

    crate::engine_error!("comet::test", "broken");

    let captured = entries.lock().unwrap();
    let entry = captured.last().expect("error must be captured");
    assert_eq!(entry.severity, LogSeverity::Error);
    assert!(entry.file.is_some());
    assert!(entry.line.is_some());
    drop(captured);

    set_logger(Box::new(DefaultLogger));
}

#[test]
#[serial]
fn engine_err_builds_and_logs_the_error() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    set_logger(Box::new(CaptureLogger { entries: Arc::clone(&entries) }));

    let error = crate::engine_err!(ShaderLoad, "comet::test", "missing {}", "opaque.vs.bin");
    assert_eq!(
        error,
        crate::error::EngineError::ShaderLoad("missing opaque.vs.bin".to_string())
    );
    assert!(!entries.lock().unwrap().is_empty());

    set_logger(Box::new(DefaultLogger));
}
