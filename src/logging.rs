/// Structured logging for the forecast service
///
/// Provides context-rich logging with a source tag and, where relevant,
/// the device name. Records go through `tracing`; the subscriber installed
/// by `init_logger` writes them to the console and optionally to a file
/// for daemon operation.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::model::{FetchError, LocationKey};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Reads the `show_debug_level` preference: either a numeric level
    /// (10 debug, 20 info, 30 warning, 40/50 error) or a level name.
    pub fn from_pref(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "10" | "debug" => Some(LogLevel::Debug),
            "20" | "info" => Some(LogLevel::Info),
            "30" | "warn" | "warning" => Some(LogLevel::Warning),
            "40" | "50" | "error" | "critical" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The forecast HTTP API.
    Api,
    Device,
    Trigger,
    Email,
    Image,
    System,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Api => write!(f, "API"),
            Source::Device => write!(f, "DEVICE"),
            Source::Trigger => write!(f, "TRIGGER"),
            Source::Email => write!(f, "EMAIL"),
            Source::Image => write!(f, "IMAGE"),
            Source::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - shutdown in progress or a location with no service
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// Console output always; file output (no ANSI colours) when `log_file` is
/// given. Calling this twice is harmless: the second call leaves the first
/// subscriber in place.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&Path>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let console = if console_timestamps {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .without_time()
            .boxed()
    };

    let file = match log_file {
        Some(path) => {
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(handle)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(LevelFilter::from_level(min_level.into()))
        .try_init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

macro_rules! emit {
    ($level:expr, $source:expr, $device:expr, $message:expr) => {
        match $device {
            Some(device) => tracing::event!($level, source = %$source, device, "{}", $message),
            None => tracing::event!($level, source = %$source, "{}", $message),
        }
    };
}

/// Log a general informational message
pub fn info(source: Source, device: Option<&str>, message: &str) {
    emit!(Level::INFO, source, device, message);
}

/// Log a warning message
pub fn warn(source: Source, device: Option<&str>, message: &str) {
    emit!(Level::WARN, source, device, message);
}

/// Log an error message
pub fn error(source: Source, device: Option<&str>, message: &str) {
    emit!(Level::ERROR, source, device, message);
}

/// Log a debug message
pub fn debug(source: Source, device: Option<&str>, message: &str) {
    emit!(Level::DEBUG, source, device, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a forecast fetch failure
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::Stopped(_) => FailureType::Expected,
        // 4xx means a bad key or a malformed location; 5xx is the service itself.
        FetchError::HttpStatus(_) | FetchError::Decode(_) => FailureType::Unexpected,
        FetchError::Transport(_) | FetchError::Timeout(_) => FailureType::Unknown,
    }
}

/// Log a fetch failure with automatic classification
pub fn log_fetch_failure(location: &LocationKey, operation: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("{} {} failed [{}]: {}", operation, location, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Source::Api, None, &message),
        FailureType::Unexpected => error(Source::Api, None, &message),
        FailureType::Unknown => warn(Source::Api, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one refresh cycle
pub fn log_cycle_summary(total: usize, updated: usize, skipped: usize, failed: usize) {
    let message = format!(
        "Refresh complete: {}/{} updated, {} unchanged or inactive, {} failed",
        updated, total, skipped, failed
    );

    if failed == 0 {
        debug(Source::System, None, &message);
    } else if updated == 0 && skipped == 0 {
        error(Source::System, None, &message);
    } else {
        warn(Source::System, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stopped;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_level_preference_accepts_numbers_and_names() {
        assert_eq!(LogLevel::from_pref("10"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_pref("30"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_pref("50"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_pref(" Info "), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_pref("loud"), None);
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(classify_fetch_failure(&FetchError::HttpStatus(403)), FailureType::Unexpected);
        assert_eq!(classify_fetch_failure(&FetchError::Decode("eof".into())), FailureType::Unexpected);
        assert_eq!(classify_fetch_failure(&FetchError::Timeout("20s".into())), FailureType::Unknown);
        assert_eq!(classify_fetch_failure(&FetchError::Stopped(Stopped)), FailureType::Expected);
    }

    #[test]
    fn test_logging_without_subscriber_is_silent() {
        info(Source::System, None, "no subscriber installed");
        warn(Source::Device, Some("Peoria"), "still fine");
    }
}
