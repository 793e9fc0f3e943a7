use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

/// One fixed-size slice of a blob, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position within the blob.
    pub index: u32,
    pub data: Bytes,
}

/// Totals computed once every byte has passed through a [`Chunker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub length: u64,
    pub chunk_count: u32,
    pub checksum_sha256: String,
}

/// Splits an incoming byte stream into fixed-size chunks.
///
/// At most one partial chunk is held in memory at a time, so a blob of any
/// size can be written with bounded buffering. The `SHA-256` digest and total
/// length are tracked incrementally.
#[derive(Debug)]
pub struct Chunker {
    chunk_size: usize,
    pending: BytesMut,
    hasher: Sha256,
    length: u64,
    next_index: u32,
}

impl Chunker {
    /// Create a chunker emitting chunks of `chunk_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            pending: BytesMut::with_capacity(chunk_size),
            hasher: Sha256::new(),
            length: 0,
            next_index: 0,
        }
    }

    /// Bytes accepted so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of complete chunks handed out so far.
    pub fn chunks_emitted(&self) -> u32 {
        self.next_index
    }

    /// Feed `data` and return every chunk that became complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Chunk> {
        self.hasher.update(data);
        self.length += data.len() as u64;
        self.pending.extend_from_slice(data);

        let mut ready = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let data = self.pending.split_to(self.chunk_size).freeze();
            ready.push(self.emit(data));
        }
        ready
    }

    /// Flush the trailing partial chunk (if any) and compute the totals.
    pub fn finish(mut self) -> (Option<Chunk>, ChunkSummary) {
        let tail = if self.pending.is_empty() {
            None
        } else {
            let data = std::mem::take(&mut self.pending).freeze();
            Some(self.emit(data))
        };
        let summary = ChunkSummary {
            length: self.length,
            chunk_count: self.next_index,
            checksum_sha256: hex::encode(self.hasher.finalize()),
        };
        (tail, summary)
    }

    fn emit(&mut self, data: Bytes) -> Chunk {
        let chunk = Chunk {
            index: self.next_index,
            data,
        };
        self.next_index += 1;
        chunk
    }
}

/// Hex `SHA-256` of `data`, in the same form a [`Chunker`] reports.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
