use std::fmt;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use docvault_core::BlobId;

use crate::error::BlobError;

/// Default chunk size: 255 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Parameters for opening a new blob write.
#[derive(Debug, Clone)]
pub struct BlobWriteRequest {
    /// Name recorded alongside the blob.
    pub filename: String,
    /// MIME content type recorded alongside the blob.
    pub content_type: String,
}

/// Blob-level record written when a blob is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Unique blob identifier.
    pub id: BlobId,
    /// Name supplied when the write was opened.
    pub filename: String,
    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,
    /// Total size in bytes.
    pub length: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: u32,
    /// Number of stored chunks.
    pub chunk_count: u32,
    /// `SHA-256` hex digest of the blob content.
    pub checksum_sha256: String,
    /// When the blob was finalized.
    pub created_at: DateTime<Utc>,
}

/// Stream of a blob's chunks in order.
pub type ChunkStream = BoxStream<'static, Result<Bytes, BlobError>>;

/// An open read of a finalized blob.
pub struct BlobReader {
    /// The blob's file record.
    pub info: BlobInfo,
    /// Chunk payloads from first to last.
    pub stream: ChunkStream,
}

impl BlobReader {
    /// Drain the stream into a single buffer.
    ///
    /// Intended for small blobs and tests; large content should be streamed.
    pub async fn into_bytes(self) -> Result<Bytes, BlobError> {
        let capacity = usize::try_from(self.info.length).unwrap_or_default();
        let buf = self
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
