//! Error types for Horizon Interval.

use std::fmt;

/// The main error type for Horizon Interval operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerError {
    /// A configuration value was rejected. The previous value is kept.
    InvalidConfiguration {
        /// The name of the rejected setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Thread pool related error.
    ThreadPool(ThreadPoolError),
}

impl TimerError {
    /// Build an `InvalidConfiguration` error for the interval setting.
    pub(crate) fn invalid_interval(value: f64) -> Self {
        Self::InvalidConfiguration {
            field: "interval",
            reason: format!("{value} is not a positive, finite number of milliseconds"),
        }
    }

    /// Returns `true` if this is an `InvalidConfiguration` error.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { field, reason } => {
                write!(f, "Invalid value for {field}: {reason}")
            }
            Self::ThreadPool(err) => write!(f, "Thread pool error: {err}"),
        }
    }
}

impl std::error::Error for TimerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ThreadPool(err) => Some(err),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Thread pool specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadPoolError {
    /// The global pool was already initialized.
    AlreadyInitialized,
    /// The underlying pool could not be built.
    CreationFailed(String),
}

impl fmt::Display for ThreadPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "Global thread pool is already initialized"),
            Self::CreationFailed(msg) => write!(f, "Failed to create thread pool: {msg}"),
        }
    }
}

impl std::error::Error for ThreadPoolError {}

impl From<ThreadPoolError> for TimerError {
    fn from(err: ThreadPoolError) -> Self {
        Self::ThreadPool(err)
    }
}

/// A specialized Result type for Horizon Interval operations.
pub type Result<T> = std::result::Result<T, TimerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_interval_display() {
        let err = TimerError::invalid_interval(-1.0);
        assert!(err.is_invalid_configuration());
        assert_eq!(
            err.to_string(),
            "Invalid value for interval: -1 is not a positive, finite number of milliseconds"
        );
    }

    #[test]
    fn test_thread_pool_error_source() {
        use std::error::Error;

        let err: TimerError = ThreadPoolError::CreationFailed("no threads".into()).into();
        assert!(!err.is_invalid_configuration());
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Thread pool error: Failed to create thread pool: no threads"
        );
    }
}
