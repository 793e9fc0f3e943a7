use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use docvault_core::{Document, DocumentFilter, DocumentId};
use docvault_metadata::{DocumentStore, MetadataError};

/// In-memory implementation of [`DocumentStore`] backed by [`DashMap`].
///
/// Compare-and-swap updates hold the entry's shard lock for the duration
/// of the version check and write.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    data: Arc<DashMap<DocumentId, Document>>,
}

impl MemoryDocumentStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Every stored record, in no particular order.
    pub fn snapshot(&self) -> Vec<Document> {
        self.data.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, doc: &Document) -> Result<(), MetadataError> {
        match self.data.entry(doc.id.clone()) {
            Entry::Occupied(_) => Err(MetadataError::AlreadyExists(doc.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, MetadataError> {
        Ok(self.data.get(id).map(|entry| entry.value().clone()))
    }

    async fn update(
        &self,
        doc: &Document,
        expected_version: u64,
    ) -> Result<Document, MetadataError> {
        let mut entry = self
            .data
            .get_mut(&doc.id)
            .ok_or_else(|| MetadataError::NotFound(doc.id.to_string()))?;
        let found = entry.version;
        if found != expected_version {
            return Err(MetadataError::VersionConflict {
                expected: expected_version,
                found,
            });
        }
        let mut stored = doc.clone();
        stored.version = expected_version + 1;
        *entry = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), MetadataError> {
        self.data
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, MetadataError> {
        let matched = self
            .data
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(filter.paginate(matched))
    }
}
