//! Unit tests for log.rs
//!
//! The global logger is shared process state, so tests that swap it are
//! serialized with `serial_test`.

use crate::error::Error;
use crate::log::{self, LogEntry, LogSeverity, Logger};
use serial_test::serial;
use std::sync::{Arc, Mutex};

/// Captures log entries for inspection
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn install_capture() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    log::set_logger(CaptureLogger {
        entries: entries.clone(),
    });
    entries
}

// ============================================================================
// SEVERITY / DISPATCH TESTS
// ============================================================================

#[test]
fn test_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
#[serial]
fn test_macros_reach_custom_logger() {
    let entries = install_capture();

    crate::gfx_info!("nebula::test", "device ready ({} slots)", 8);
    crate::gfx_warn!("nebula::test", "slow path");

    let captured = entries.lock().unwrap();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].severity, LogSeverity::Info);
    assert_eq!(captured[0].source, "nebula::test");
    assert!(captured[0].message.contains("8 slots"));
    assert_eq!(captured[1].severity, LogSeverity::Warn);
    drop(captured);

    log::reset_logger();
}

#[test]
#[serial]
fn test_error_macro_carries_location() {
    let entries = install_capture();

    crate::gfx_error!("nebula::test", "boom");

    let captured = entries.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert!(captured[0].file.is_some());
    assert!(captured[0].line.is_some());
    drop(captured);

    log::reset_logger();
}

#[test]
#[serial]
fn test_gfx_err_logs_and_builds_error() {
    let entries = install_capture();

    let err = crate::gfx_err!("nebula::test", "CreateBuffer failed: {}", "E_FAIL");
    match err {
        Error::BackendError(msg) => assert!(msg.contains("E_FAIL")),
        other => panic!("unexpected error variant: {:?}", other),
    }
    assert_eq!(entries.lock().unwrap().len(), 1);

    log::reset_logger();
}

#[test]
#[serial]
fn test_gfx_bail_returns_err() {
    fn failing() -> crate::error::Result<()> {
        crate::gfx_bail!("nebula::test", "bail message");
    }

    let entries = install_capture();
    let result = failing();
    assert!(result.is_err());
    assert_eq!(entries.lock().unwrap().len(), 1);

    log::reset_logger();
}
