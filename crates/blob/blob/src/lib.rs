pub mod chunker;
pub mod error;
pub mod store;
pub mod testing;
pub mod types;

pub use chunker::{Chunk, ChunkSummary, Chunker, sha256_hex};
pub use error::BlobError;
pub use store::{BlobStore, BlobWriter};
pub use types::{BlobInfo, BlobReader, BlobWriteRequest, ChunkStream, DEFAULT_CHUNK_SIZE};
