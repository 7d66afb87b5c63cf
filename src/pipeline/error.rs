//! Error types and reporting for pipeline stations.

use crate::error::SyncError;
use std::fmt;

/// Errors that can occur during station processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationError {
    /// Recoverable error that allows the station to continue processing.
    Recoverable(String),
    /// Fatal error that requires the station to shut down.
    Fatal(String),
}

impl StationError {
    /// Converts a fatal station error into the run's error.
    pub fn into_sync_error(self, station: &str) -> SyncError {
        let message = match self {
            StationError::Recoverable(msg) | StationError::Fatal(msg) => msg,
        };
        SyncError::Pipeline {
            message: format!("{station}: {message}"),
        }
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
    fn report(&self, station: &str, error: &StationError);
}

/// Error reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(msg) => tracing::warn!(station, "{msg}"),
            StationError::Fatal(msg) => tracing::error!(station, "{msg}"),
        }
    }
}
