use async_trait::async_trait;

use docvault_core::{Document, DocumentFilter, DocumentId};

use crate::error::MetadataError;

/// Persistent storage for [`Document`] records.
///
/// Records are independent of one another; implementations must be safe
/// for concurrent use. Every successful [`update`](Self::update) bumps the
/// stored version by exactly one.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Fails with [`MetadataError::AlreadyExists`] if the id is taken.
    async fn insert(&self, doc: &Document) -> Result<(), MetadataError>;

    /// Fetch a record by id.
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, MetadataError>;

    /// Overwrite a record if its stored version equals `expected_version`.
    ///
    /// The stored copy gets version `expected_version + 1` and is returned.
    /// Fails with [`MetadataError::NotFound`] if the record does not exist
    /// and [`MetadataError::VersionConflict`] if it was changed concurrently.
    async fn update(
        &self,
        doc: &Document,
        expected_version: u64,
    ) -> Result<Document, MetadataError>;

    /// Remove a record.
    ///
    /// Fails with [`MetadataError::NotFound`] if the record does not exist.
    async fn delete(&self, id: &DocumentId) -> Result<(), MetadataError>;

    /// Records matching `filter`, newest upload first, paginated.
    async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, MetadataError>;
}
