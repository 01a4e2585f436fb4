//! Error types and reporting for pipeline stations.

use std::fmt;

/// Errors that can occur while a station processes a segment.
#[derive(Debug, Clone)]
pub enum StationError {
    /// Recoverable error: the segment is lost, the pipeline keeps going.
    Recoverable(String),
    /// Fatal error: the station cannot continue.
    Fatal(String),
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

/// Default reporter: emits a `tracing` event per error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(msg) => tracing::warn!(station, "{}", msg),
            StationError::Fatal(msg) => tracing::error!(station, "{}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_station_error_display() {
        let recoverable = StationError::Recoverable("temporary failure".to_string());
        assert_eq!(
            recoverable.to_string(),
            "Recoverable error: temporary failure"
        );

        let fatal = StationError::Fatal("critical failure".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: critical failure");
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        let error = StationError::Recoverable("test error".to_string());
        // Just ensure it doesn't panic
        reporter.report("synthesis", &error);
    }

    #[test]
    fn test_reporter_is_object_safe() {
        struct Collecting(Mutex<Vec<String>>);
        impl ErrorReporter for Collecting {
            fn report(&self, station: &str, error: &StationError) {
                self.0.lock().unwrap().push(format!("{}: {}", station, error));
            }
        }

        let collecting = Collecting(Mutex::new(Vec::new()));
        let reporter: &dyn ErrorReporter = &collecting;
        reporter.report("playback", &StationError::Fatal("gone".to_string()));
        assert_eq!(
            collecting.0.lock().unwrap().as_slice(),
            ["playback: Fatal error: gone"]
        );
    }
}
