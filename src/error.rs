//! Error types for bucket transfers
//!
//! Store-level failures (`StoreError`) are what a single remote call can
//! report. `TransferError` is what callers of the upload/download flows see.

use thiserror::Error;

use crate::transfer::retry::RetryError;

/// Transfer-wide result type
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors reported by a single call against the bucket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, timeout or server-side failure. Worth retrying.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The bucket refused the call (bad batch id, chunk hash or count mismatch)
    #[error("Rejected by bucket: {0}")]
    Rejected(String),

    #[error("Failed to decode bucket response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors surfaced by uploads and downloads
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid file provided: {0}")]
    InvalidFile(String),

    #[error("User not registered")]
    UserNotRegistered,

    #[error("Failed to process file chunks: {0}")]
    ChunkingFailed(String),

    #[error("Failed to calculate file hash: {0}")]
    HashCalculationFailed(String),

    #[error("Failed to upload file: {0}")]
    UploadFailed(#[source] RetryError<StoreError>),

    #[error("Failed to download file: {0}")]
    DownloadFailed(#[source] RetryError<StoreError>),

    #[error("Failed to list files: {0}")]
    ListFailed(#[source] RetryError<StoreError>),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Integrity check failed for {file_name}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransferError {
    /// Whether the failure happened before anything was sent to the bucket
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidFile(_)
                | Self::UserNotRegistered
                | Self::ChunkingFailed(_)
                | Self::HashCalculationFailed(_)
                | Self::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(!StoreError::NotFound("a.txt".into()).is_transient());
        assert!(!StoreError::Rejected("bad hash".into()).is_transient());
        assert!(!StoreError::PayloadTooLarge { size: 3, max: 2 }.is_transient());
    }

    #[test]
    fn test_upload_failed_names_operation() {
        let err = TransferError::UploadFailed(RetryError {
            operation: "Failed to create batch".to_string(),
            attempts: 3,
            source: StoreError::Transport("connection refused".into()),
        });
        let msg = err.to_string();
        assert!(msg.contains("Failed to create batch after 3 attempts"));
        assert!(msg.contains("connection refused"));
    }
}
