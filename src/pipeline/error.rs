//! Error types and reporting for pipeline stations.

use parking_lot::Mutex;
use std::fmt;
use tracing::{error, warn};

/// Errors that can occur inside a station loop.
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    /// The station retries or carries on.
    Recoverable(String),
    /// The station gives up and the pipeline shuts down.
    Fatal(String),
}

impl StationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StationError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StationError {}

/// Trait for reporting station errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a station.
    fn report(&self, station: &str, error: &StationError);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, err: &StationError) {
        match err {
            StationError::Recoverable(msg) => warn!(station, "{msg}"),
            StationError::Fatal(msg) => error!(station, "{msg}"),
        }
    }
}

/// Reporter that keeps every report, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, StationError)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, StationError)> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, station: &str, error: &StationError) {
        self.reports.lock().push((station.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_error_display() {
        let recoverable = StationError::Recoverable("device busy".to_string());
        assert_eq!(recoverable.to_string(), "Recoverable error: device busy");
        assert!(!recoverable.is_fatal());

        let fatal = StationError::Fatal("read failed".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: read failed");
        assert!(fatal.is_fatal());
    }

    #[test]
    fn test_log_reporter_does_not_panic() {
        LogReporter.report("capture", &StationError::Recoverable("retrying".to_string()));
        LogReporter.report("capture", &StationError::Fatal("gone".to_string()));
    }

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingReporter::new();
        reporter.report("capture", &StationError::Recoverable("a".to_string()));
        reporter.report("recognizer", &StationError::Fatal("b".to_string()));
        let reports = reporter.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].0, "capture");
        assert!(reports[1].1.is_fatal());
    }
}
