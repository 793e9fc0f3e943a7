use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use tracing::debug;

use docvault_blob::{
    BlobError, BlobInfo, BlobReader, BlobStore, BlobWriteRequest, BlobWriter, Chunker,
    DEFAULT_CHUNK_SIZE,
};
use docvault_core::BlobId;

type ChunkKey = (BlobId, u32);

/// Shared collections: one file record per finalized blob, one entry per chunk.
#[derive(Debug, Default)]
struct Collections {
    files: DashMap<BlobId, BlobInfo>,
    chunks: DashMap<ChunkKey, Bytes>,
}

impl Collections {
    fn remove_chunks(&self, id: &BlobId, count: u32) {
        for n in 0..count {
            self.chunks.remove(&(id.clone(), n));
        }
    }
}

/// In-memory [`BlobStore`] that keeps file records and chunks in two
/// [`DashMap`]s, mirroring the layout of a persistent chunked store.
///
/// Chunks are written as soon as they fill up, so a write that fails or is
/// aborted midway really does leave partial chunks to clean up.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    inner: Arc<Collections>,
    chunk_size: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    /// Create a new, empty store with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new, empty store with a custom chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Collections::default()),
            chunk_size,
        }
    }

    /// Chunk size used for new writes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of finalized blobs.
    pub fn blob_count(&self) -> usize {
        self.inner.files.len()
    }

    /// Number of stored chunks, including chunks of unfinished writes.
    pub fn chunk_count(&self) -> usize {
        self.inner.chunks.len()
    }

    /// Whether any finalized blob has the given `SHA-256` digest.
    pub fn contains_checksum(&self, checksum_sha256: &str) -> bool {
        self.inner
            .files
            .iter()
            .any(|entry| entry.checksum_sha256 == checksum_sha256)
    }

    /// Drop one chunk of a finalized blob, simulating storage corruption.
    pub fn corrupt_chunk(&self, id: &BlobId, index: u32) -> bool {
        self.inner.chunks.remove(&(id.clone(), index)).is_some()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open_write(
        &self,
        request: BlobWriteRequest,
    ) -> Result<Box<dyn BlobWriter>, BlobError> {
        Ok(Box::new(MemoryBlobWriter {
            id: BlobId::generate(),
            request,
            chunker: Chunker::new(self.chunk_size),
            chunk_size: self.chunk_size,
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn open_read(&self, id: &BlobId) -> Result<BlobReader, BlobError> {
        let info = self
            .inner
            .files
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| BlobError::NotFound(id.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let blob_id = id.clone();
        let stream = futures::stream::iter(0..info.chunk_count)
            .map(move |n| {
                inner
                    .chunks
                    .get(&(blob_id.clone(), n))
                    .map(|chunk| chunk.clone())
                    .ok_or_else(|| BlobError::Corrupted(format!("{blob_id}: chunk {n} missing")))
            })
            .boxed();

        Ok(BlobReader { info, stream })
    }

    async fn stat(&self, id: &BlobId) -> Result<Option<BlobInfo>, BlobError> {
        Ok(self.inner.files.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &BlobId) -> Result<(), BlobError> {
        match self.inner.files.remove(id) {
            Some((_, info)) => {
                self.inner.remove_chunks(id, info.chunk_count);
                debug!(blob_id = %id, chunks = info.chunk_count, "blob deleted");
                Ok(())
            }
            None => {
                // Sweep stray chunks left by a writer that never finished.
                self.inner.chunks.retain(|(blob, _), _| blob != id);
                Err(BlobError::NotFound(id.to_string()))
            }
        }
    }
}

/// Writer half of [`MemoryBlobStore`].
pub struct MemoryBlobWriter {
    id: BlobId,
    request: BlobWriteRequest,
    chunker: Chunker,
    chunk_size: usize,
    inner: Arc<Collections>,
}

#[async_trait]
impl BlobWriter for MemoryBlobWriter {
    fn id(&self) -> &BlobId {
        &self.id
    }

    async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
        for chunk in self.chunker.push(&data) {
            self.inner
                .chunks
                .insert((self.id.clone(), chunk.index), chunk.data);
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<BlobInfo, BlobError> {
        let Self {
            id,
            request,
            chunker,
            chunk_size,
            inner,
        } = *self;

        let (tail, summary) = chunker.finish();
        if let Some(chunk) = tail {
            inner.chunks.insert((id.clone(), chunk.index), chunk.data);
        }

        let info = BlobInfo {
            id: id.clone(),
            filename: request.filename,
            content_type: request.content_type,
            length: summary.length,
            chunk_size: u32::try_from(chunk_size)
                .map_err(|_| BlobError::Storage(format!("chunk size {chunk_size} too large")))?,
            chunk_count: summary.chunk_count,
            checksum_sha256: summary.checksum_sha256,
            created_at: chrono::Utc::now(),
        };
        inner.files.insert(id, info.clone());
        Ok(info)
    }

    async fn abort(self: Box<Self>) -> Result<(), BlobError> {
        self.inner
            .remove_chunks(&self.id, self.chunker.chunks_emitted());
        debug!(blob_id = %self.id, "blob write aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use docvault_blob::testing::{pattern, run_store_conformance_tests, write_all};
    use docvault_blob::{BlobStore, sha256_hex};

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let store = MemoryBlobStore::with_chunk_size(64);
        run_store_conformance_tests(&store, 64)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn conformance_default_chunk_size() {
        let store = MemoryBlobStore::new();
        run_store_conformance_tests(&store, DEFAULT_CHUNK_SIZE)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn chunks_are_written_before_finish() {
        let store = MemoryBlobStore::with_chunk_size(4);
        let mut writer = store
            .open_write(BlobWriteRequest {
                filename: "a.pdf".into(),
                content_type: "application/pdf".into(),
            })
            .await
            .unwrap();
        writer.write(Bytes::from_static(b"0123456789")).await.unwrap();

        assert_eq!(store.chunk_count(), 2, "two full chunks flushed eagerly");
        assert_eq!(store.blob_count(), 0, "not visible before finish");

        writer.abort().await.unwrap();
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn delete_removes_every_chunk() {
        let store = MemoryBlobStore::with_chunk_size(8);
        let info = write_all(&store, "x.pdf", &pattern(100), 7).await.unwrap();
        assert_eq!(store.chunk_count(), 13);

        store.delete(&info.id).await.unwrap();
        assert_eq!(store.chunk_count(), 0);
        assert_eq!(store.blob_count(), 0);
    }

    #[tokio::test]
    async fn missing_chunk_surfaces_mid_stream() {
        let store = MemoryBlobStore::with_chunk_size(4);
        let info = write_all(&store, "x.pdf", &pattern(12), 4).await.unwrap();
        assert!(store.corrupt_chunk(&info.id, 1));

        let reader = store.open_read(&info.id).await.unwrap();
        let items: Vec<_> = reader.stream.collect().await;
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(BlobError::Corrupted(_))));
    }

    #[tokio::test]
    async fn checksum_lookup() {
        let store = MemoryBlobStore::new();
        write_all(&store, "x.pdf", b"needle", 3).await.unwrap();
        assert!(store.contains_checksum(&sha256_hex(b"needle")));
        assert!(!store.contains_checksum(&sha256_hex(b"haystack")));
    }
}
