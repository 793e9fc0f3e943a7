use thiserror::Error;

use docvault_core::ValidationError;
use docvault_metadata::MetadataError;

/// Errors reported by the document pipelines.
///
/// Messages of [`UploadFailed`](Self::UploadFailed),
/// [`ReplaceFailed`](Self::ReplaceFailed) and [`Storage`](Self::Storage)
/// carry backend details and are meant for logs, not for end users.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The request was malformed: bad type, oversized file, bad field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The document (or a referenced share) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requester is authenticated but may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Writing a new document failed; nothing was persisted.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Writing replacement content failed; the document is unchanged.
    #[error("replace failed: {0}")]
    ReplaceFailed(String),

    /// The document changed concurrently; the caller should reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A storage backend failed outside of a write.
    #[error("storage error: {0}")]
    Storage(String),

    /// The library was assembled without a required component.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LibraryError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::UploadFailed(_) => "upload_failed",
            Self::ReplaceFailed(_) => "replace_failed",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) | Self::Configuration(_) => "internal",
        }
    }
}

impl From<ValidationError> for LibraryError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<MetadataError> for LibraryError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(id) => Self::NotFound(format!("document {id}")),
            MetadataError::VersionConflict { expected, found } => Self::Conflict(format!(
                "document was modified concurrently (expected version {expected}, found {found})"
            )),
            other => Self::Storage(other.to_string()),
        }
    }
}
