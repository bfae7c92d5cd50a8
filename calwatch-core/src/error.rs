//! Error types for calwatch.

use thiserror::Error;

/// Errors that can occur in calwatch operations.
#[derive(Error, Debug)]
pub enum CalWatchError {
    /// Feed could not be retrieved (transport error, timeout, non-2xx, unreadable file).
    #[error("Failed to fetch feed '{source_name}' from {location}: {reason}")]
    Fetch {
        source_name: String,
        location: String,
        reason: String,
    },

    /// Feed content is not a readable calendar document.
    #[error("Failed to parse feed '{source_name}': {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalWatchError {
    pub(crate) fn parse(source_name: &str, reason: impl Into<String>) -> Self {
        CalWatchError::Parse {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch(source_name: &str, location: &str, reason: impl ToString) -> Self {
        CalWatchError::Fetch {
            source_name: source_name.to_string(),
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Only transport failures qualify; a document that failed to parse will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CalWatchError::Fetch { .. })
    }
}

/// Result type alias for calwatch operations.
pub type CalWatchResult<T> = Result<T, CalWatchError>;
