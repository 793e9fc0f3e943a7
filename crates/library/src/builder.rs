use std::sync::Arc;

use docvault_blob::BlobStore;
use docvault_core::UploadPolicy;
use docvault_metadata::DocumentStore;

use crate::error::LibraryError;
use crate::library::DocumentLibrary;
use crate::membership::{MembershipDirectory, OpenDirectory};
use crate::metrics::LibraryMetrics;

/// Builder for constructing a [`DocumentLibrary`].
///
/// A [`BlobStore`] and a [`DocumentStore`] are required. Membership
/// defaults to [`OpenDirectory`] and the policy to [`UploadPolicy::default`].
pub struct LibraryBuilder {
    blobs: Option<Arc<dyn BlobStore>>,
    documents: Option<Arc<dyn DocumentStore>>,
    membership: Option<Arc<dyn MembershipDirectory>>,
    policy: UploadPolicy,
    metrics: Option<Arc<LibraryMetrics>>,
}

impl LibraryBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            blobs: None,
            documents: None,
            membership: None,
            policy: UploadPolicy::default(),
            metrics: None,
        }
    }

    /// Set the blob store implementation.
    #[must_use]
    pub fn blobs(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(store);
        self
    }

    /// Set the document metadata store implementation.
    #[must_use]
    pub fn documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    /// Set the family membership lookup used to validate shares.
    #[must_use]
    pub fn membership(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.membership = Some(directory);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share an existing metrics instance instead of creating one.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<LibraryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the builder and produce a configured [`DocumentLibrary`].
    ///
    /// Returns [`LibraryError::Configuration`] if a store is missing or the
    /// policy cannot accept any file.
    pub fn build(self) -> Result<DocumentLibrary, LibraryError> {
        let blobs = self
            .blobs
            .ok_or_else(|| LibraryError::Configuration("blob store is required".into()))?;

        let documents = self
            .documents
            .ok_or_else(|| LibraryError::Configuration("document store is required".into()))?;

        if self.policy.allowed_mime_types.is_empty() {
            return Err(LibraryError::Configuration(
                "at least one MIME type must be allowed".into(),
            ));
        }
        if self.policy.max_file_size == 0 {
            return Err(LibraryError::Configuration(
                "max_file_size must be greater than zero".into(),
            ));
        }

        Ok(DocumentLibrary {
            blobs,
            documents,
            membership: self.membership.unwrap_or_else(|| Arc::new(OpenDirectory)),
            policy: self.policy,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

impl Default for LibraryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use docvault_blob_memory::MemoryBlobStore;
    use docvault_metadata_memory::MemoryDocumentStore;

    use super::*;

    #[test]
    fn build_requires_both_stores() {
        let err = LibraryBuilder::new()
            .blobs(Arc::new(MemoryBlobStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("document store is required"));

        let err = LibraryBuilder::new()
            .documents(Arc::new(MemoryDocumentStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("blob store is required"));
    }

    #[test]
    fn build_rejects_empty_allow_list() {
        let err = LibraryBuilder::new()
            .blobs(Arc::new(MemoryBlobStore::new()))
            .documents(Arc::new(MemoryDocumentStore::new()))
            .policy(UploadPolicy {
                allowed_mime_types: Vec::new(),
                ..UploadPolicy::default()
            })
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, LibraryError::Configuration(_)));
    }

    #[test]
    fn build_with_defaults() {
        let library = LibraryBuilder::new()
            .blobs(Arc::new(MemoryBlobStore::new()))
            .documents(Arc::new(MemoryDocumentStore::new()))
            .build()
            .unwrap();
        assert_eq!(library.policy().max_file_size, docvault_core::DEFAULT_MAX_FILE_SIZE);
        assert_eq!(library.metrics().snapshot().uploads, 0);
    }
}
