use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The blob's file record exists but its chunks are missing or inconsistent.
    #[error("blob corrupted: {0}")]
    Corrupted(String),

    /// The write was abandoned before it was finalized.
    #[error("blob write aborted: {0}")]
    Aborted(String),

    /// A storage backend error occurred.
    #[error("blob storage error: {0}")]
    Storage(String),
}

impl BlobError {
    /// Returns `true` for [`BlobError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
