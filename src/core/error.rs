use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("WMS error: {0}")]
    Wms(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Errors worth another attempt after a backoff delay.
    ///
    /// Data-quality and structural errors (`Validation`, `NotFound`, `Conflict`, `Parse`)
    /// produce the same outcome on every attempt and are handled where they occur.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Store(_) | Self::Journal(_) | Self::Wms(_)
        )
    }

    pub fn not_found(kind: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} '{id}'"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Journal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::Io("locked".into()).is_transient());
        assert!(SyncError::Wms("503".into()).is_transient());
        assert!(SyncError::Store("disk full".into()).is_transient());
        assert!(!SyncError::Validation("name".into()).is_transient());
        assert!(!SyncError::not_found("Customer", 7).is_transient());
        assert!(!SyncError::Cancelled.is_transient());
    }

    #[test]
    fn test_not_found_message() {
        let err = SyncError::not_found("Product", "P-1");
        assert_eq!(err.to_string(), "Product 'P-1' not found");
    }
}
