use async_trait::async_trait;
use bytes::Bytes;

use docvault_core::BlobId;

use crate::error::BlobError;
use crate::types::{BlobInfo, BlobReader, BlobWriteRequest};

/// An in-progress blob write.
///
/// Bytes are chunked as they arrive; nothing becomes visible to readers
/// until [`finish`](Self::finish) writes the blob's file record. A writer
/// that is neither finished nor aborted leaves at most stray chunks behind,
/// never a readable blob.
#[async_trait]
pub trait BlobWriter: Send {
    /// The identifier the blob will have once finalized.
    fn id(&self) -> &BlobId;

    /// Append bytes to the blob.
    async fn write(&mut self, data: Bytes) -> Result<(), BlobError>;

    /// Flush the trailing chunk and finalize the blob.
    async fn finish(self: Box<Self>) -> Result<BlobInfo, BlobError>;

    /// Abandon the write and remove every chunk written so far.
    async fn abort(self: Box<Self>) -> Result<(), BlobError>;
}

/// Chunked binary storage addressed by opaque blob identifiers.
///
/// Implementations must be `Send + Sync` and safe for concurrent access:
/// many readers of one blob, and writers of unrelated blobs, may run at
/// the same time.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Allocate a new blob identifier and return a writer for it.
    async fn open_write(
        &self,
        request: BlobWriteRequest,
    ) -> Result<Box<dyn BlobWriter>, BlobError>;

    /// Open a finalized blob for streaming.
    ///
    /// Fails with [`BlobError::NotFound`] before any byte is produced if the
    /// blob does not exist.
    async fn open_read(&self, id: &BlobId) -> Result<BlobReader, BlobError>;

    /// Retrieve only the file record for a blob.
    async fn stat(&self, id: &BlobId) -> Result<Option<BlobInfo>, BlobError>;

    /// Remove a blob and all of its chunks.
    ///
    /// Fails with [`BlobError::NotFound`] if no finalized blob has this id.
    async fn delete(&self, id: &BlobId) -> Result<(), BlobError>;
}
