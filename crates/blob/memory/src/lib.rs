mod store;

pub use store::{MemoryBlobStore, MemoryBlobWriter};
