use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoardwiseError>;

#[derive(Debug, Error)]
pub enum BoardwiseError {
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("List not found: {0}")]
    ListNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to persist reorder: {0}")]
    Persistence(String),

    #[error("Storage did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage not initialized")]
    StorageNotInitialized,

    #[error("{0}")]
    Other(String),
}

impl BoardwiseError {
    /// Whether the caller may roll back and retry the same operation.
    ///
    /// Index violations are programming errors and never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Timeout(_) | Self::StorageError(_) | Self::IoError(_)
        )
    }
}

#[cfg(feature = "sqlite-storage")]
impl From<rusqlite::Error> for BoardwiseError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StorageError(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(BoardwiseError::Persistence("db down".to_string()).is_recoverable());
        assert!(BoardwiseError::Timeout(Duration::from_millis(10)).is_recoverable());
        assert!(!BoardwiseError::IndexOutOfRange { index: 5, len: 3 }.is_recoverable());
        assert!(!BoardwiseError::Validation("short".to_string()).is_recoverable());
    }

    #[test]
    fn test_index_error_message() {
        let err = BoardwiseError::IndexOutOfRange { index: 5, len: 3 };
        assert_eq!(
            err.to_string(),
            "Index 5 out of range for sequence of length 3"
        );
    }
}
