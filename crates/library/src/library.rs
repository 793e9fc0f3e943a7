use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, SubsecRound, Utc};
use futures::Stream;
use tracing::{debug, info, instrument, warn};

use docvault_blob::{BlobError, BlobInfo, BlobStore, ChunkStream};
use docvault_core::{
    AccessLevel, ContentRef, Document, DocumentFilter, DocumentId, DocumentRole, ListScope,
    UploadPolicy, UserId, normalize_description, normalize_filename, normalize_tags,
};
use docvault_metadata::{DocumentStore, MetadataError};

use crate::error::LibraryError;
use crate::membership::MembershipDirectory;
use crate::metrics::LibraryMetrics;
use crate::upload::{FileDescriptor, normalize_folder};

/// An open download: the record, the blob's file record, and its bytes.
pub struct DocumentDownload {
    pub document: Document,
    pub info: BlobInfo,
    /// Chunks in order. An `Err` item means the blob broke mid-stream.
    pub stream: ChunkStream,
}

impl fmt::Debug for DocumentDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentDownload")
            .field("document", &self.document.id)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Listing parameters supplied by the requester.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub scope: ListScope,
    pub tag: Option<String>,
    pub folder: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Metadata changes; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub filename: Option<String>,
    /// Blank text clears the description.
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Blank text clears the folder.
    pub folder: Option<String>,
    /// `Some(None)` clears the expiry date.
    pub expiry_date: Option<Option<NaiveDate>>,
    pub reminder_enabled: Option<bool>,
    /// Reject the change unless the stored version still equals this.
    pub expected_version: Option<u64>,
}

/// The document pipelines: upload, retrieval, replace, delete, listing and
/// sharing, over a [`BlobStore`] and a [`DocumentStore`].
///
/// Within one upload or replace, the blob write always completes before
/// the metadata write starts. A metadata failure after a successful blob
/// write deletes that blob before the error is returned.
pub struct DocumentLibrary {
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) membership: Arc<dyn MembershipDirectory>,
    pub(crate) policy: UploadPolicy,
    pub(crate) metrics: Arc<LibraryMetrics>,
}

impl DocumentLibrary {
    /// Upload rules in force.
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Shared pipeline counters.
    pub fn metrics(&self) -> &Arc<LibraryMetrics> {
        &self.metrics
    }

    /// Load a record and the requester's role on it.
    async fn load(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> Result<(Document, DocumentRole), LibraryError> {
        let doc = self
            .documents
            .get(id)
            .await?
            .ok_or_else(|| LibraryError::NotFound(format!("document {id}")))?;
        let role = doc.role_of(requester).ok_or_else(|| {
            LibraryError::Forbidden(format!("no access to document {id}"))
        })?;
        Ok((doc, role))
    }

    async fn load_for_edit(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> Result<Document, LibraryError> {
        let (doc, role) = self.load(requester, id).await?;
        if !role.can_edit() {
            return Err(LibraryError::Forbidden(format!(
                "edit access to document {id} required"
            )));
        }
        Ok(doc)
    }

    async fn load_for_owner(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> Result<Document, LibraryError> {
        let (doc, role) = self.load(requester, id).await?;
        if !role.can_manage() {
            return Err(LibraryError::Forbidden(format!(
                "only the owner may do this to document {id}"
            )));
        }
        Ok(doc)
    }

    /// Compare-and-swap `doc` against `expected_version`, counting conflicts.
    async fn commit(&self, doc: &Document, expected_version: u64) -> Result<Document, LibraryError> {
        match self.documents.update(doc, expected_version).await {
            Ok(stored) => Ok(stored),
            Err(e @ MetadataError::VersionConflict { .. }) => {
                self.metrics.increment_conflicts();
                debug!(document_id = %doc.id, error = %e, "update lost a race");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn check_share_target(
        &self,
        owner: &UserId,
        member: &UserId,
    ) -> Result<(), LibraryError> {
        if owner == member {
            return Err(LibraryError::InvalidInput(
                "a document cannot be shared with its owner".into(),
            ));
        }
        if !self.membership.is_family_member(owner, member).await? {
            return Err(LibraryError::InvalidInput(format!(
                "user {member} is not a member of your family"
            )));
        }
        Ok(())
    }

    /// Fetch a record readable by `requester`.
    pub async fn get(&self, requester: &UserId, id: &DocumentId) -> Result<Document, LibraryError> {
        self.load(requester, id).await.map(|(doc, _)| doc)
    }

    /// Records visible to `requester`, newest upload first.
    #[instrument(name = "library.list", skip_all, fields(requester = %requester))]
    pub async fn list(
        &self,
        requester: &UserId,
        query: ListQuery,
    ) -> Result<Vec<Document>, LibraryError> {
        let filter = DocumentFilter {
            requester: requester.clone(),
            scope: query.scope,
            tag: query.tag.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()),
            folder: normalize_folder(query.folder.as_deref()),
            limit: query.limit,
            offset: query.offset,
        };
        Ok(self.documents.list(&filter).await?)
    }

    /// Authorize `requester` and open the document's bytes for streaming.
    ///
    /// A record whose blob is gone is reported as `NotFound` and logged as a
    /// consistency fault.
    #[instrument(name = "library.view", skip_all, fields(requester = %requester, document_id = %id))]
    pub async fn view(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> Result<DocumentDownload, LibraryError> {
        let (document, _) = self.load(requester, id).await?;

        let reader = match self.blobs.open_read(&document.blob_id).await {
            Ok(reader) => reader,
            Err(BlobError::NotFound(_)) => {
                self.metrics.increment_consistency_faults();
                warn!(blob_id = %document.blob_id, "record points at a missing blob");
                return Err(LibraryError::NotFound(format!("content of document {id}")));
            }
            Err(e) => return Err(LibraryError::Storage(e.to_string())),
        };

        if reader.info.length != document.file_size {
            self.metrics.increment_consistency_faults();
            warn!(
                blob_id = %document.blob_id,
                recorded = document.file_size,
                actual = reader.info.length,
                "recorded file size differs from blob length"
            );
        }

        self.metrics.increment_views();
        Ok(DocumentDownload {
            document,
            info: reader.info,
            stream: reader.stream,
        })
    }

    /// Change classification fields. Requires edit access.
    #[instrument(name = "library.update_metadata", skip_all, fields(requester = %requester, document_id = %id))]
    pub async fn update_metadata(
        &self,
        requester: &UserId,
        id: &DocumentId,
        patch: MetadataPatch,
    ) -> Result<Document, LibraryError> {
        let mut doc = self.load_for_edit(requester, id).await?;
        let expected = patch.expected_version.unwrap_or(doc.version);
        if expected != doc.version {
            self.metrics.increment_conflicts();
            return Err(LibraryError::Conflict(format!(
                "document {id} is at version {}, not {expected}",
                doc.version
            )));
        }

        if let Some(name) = patch.filename.as_deref() {
            doc.filename = normalize_filename(name)?;
        }
        if let Some(description) = patch.description.as_deref() {
            doc.description = normalize_description(Some(description))?;
        }
        if let Some(tags) = &patch.tags {
            doc.tags = normalize_tags(tags)?;
        }
        if let Some(folder) = patch.folder.as_deref() {
            doc.folder = normalize_folder(Some(folder));
        }
        if let Some(expiry) = patch.expiry_date {
            doc.expiry_date = expiry;
        }
        if let Some(reminder) = patch.reminder_enabled {
            doc.reminder_enabled = reminder;
        }

        let stored = self.commit(&doc, expected).await?;
        debug!(version = stored.version, "metadata updated");
        Ok(stored)
    }

    /// Swap the document's content for a new file. Requires edit access.
    ///
    /// The new blob is fully written before the record changes, and the old
    /// blob is deleted only after the record points at the new one. If the
    /// record cannot be updated, the new blob is deleted and the document is
    /// left exactly as it was.
    #[instrument(name = "library.replace", skip_all, fields(requester = %requester, document_id = %id))]
    pub async fn replace<S, E>(
        &self,
        requester: &UserId,
        id: &DocumentId,
        file: FileDescriptor,
        body: S,
    ) -> Result<Document, LibraryError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let mut doc = self.load_for_edit(requester, id).await?;
        let read_version = doc.version;
        let (original_name, mime_type) = self.validate_file(&file)?;

        let (info, mut guard) = self
            .write_blob(&original_name, &mime_type, body)
            .await
            .map_err(|failure| {
                if matches!(failure, crate::upload::WriteFailure::Storage(_)) {
                    self.metrics.increment_replace_failures();
                }
                failure.into_error(LibraryError::ReplaceFailed)
            })?;

        let previous = doc.swap_content(ContentRef {
            blob_id: info.id.clone(),
            file_size: info.length,
            mime_type,
            original_name,
            uploaded_at: Utc::now().trunc_subsecs(6),
        });

        guard.disarm();
        let stored = match self.documents.update(&doc, read_version).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(blob_id = %info.id, error = %e, "record update failed, removing new blob");
                self.compensate(&info.id).await;
                return Err(match e {
                    MetadataError::VersionConflict { .. } => {
                        self.metrics.increment_conflicts();
                        e.into()
                    }
                    MetadataError::NotFound(_) => e.into(),
                    other => {
                        self.metrics.increment_replace_failures();
                        LibraryError::ReplaceFailed(other.to_string())
                    }
                });
            }
        };

        match self.blobs.delete(&previous).await {
            Ok(()) => {}
            Err(BlobError::NotFound(_)) => {
                debug!(blob_id = %previous, "previous blob was already gone");
            }
            Err(e) => {
                self.metrics.increment_consistency_faults();
                warn!(blob_id = %previous, error = %e, "failed to delete replaced blob, blob orphaned");
            }
        }

        self.metrics.increment_replaces();
        info!(
            blob_id = %stored.blob_id,
            size = stored.file_size,
            version = stored.version,
            "document content replaced"
        );
        Ok(stored)
    }

    /// Remove a document and its bytes. Owner only.
    ///
    /// The blob goes first; if that fails the record stays intact and the
    /// delete can be retried. A blob that is already gone counts as deleted.
    #[instrument(name = "library.delete", skip_all, fields(requester = %requester, document_id = %id))]
    pub async fn delete(&self, requester: &UserId, id: &DocumentId) -> Result<(), LibraryError> {
        let doc = self.load_for_owner(requester, id).await?;

        match self.blobs.delete(&doc.blob_id).await {
            Ok(()) => {}
            Err(BlobError::NotFound(_)) => {
                debug!(blob_id = %doc.blob_id, "blob already gone");
            }
            Err(e) => return Err(LibraryError::Storage(e.to_string())),
        }

        match self.documents.delete(id).await {
            Ok(()) | Err(MetadataError::NotFound(_)) => {}
            Err(e) => {
                self.metrics.increment_consistency_faults();
                warn!(error = %e, "blob deleted but record remains");
                return Err(e.into());
            }
        }

        self.metrics.increment_deletes();
        info!(blob_id = %doc.blob_id, "document deleted");
        Ok(())
    }

    /// Grant `member` access to a document, or change their access level.
    /// Owner only; `member` must belong to the owner's family.
    #[instrument(name = "library.share", skip_all, fields(requester = %requester, document_id = %id, member = %member))]
    pub async fn share(
        &self,
        requester: &UserId,
        id: &DocumentId,
        member: UserId,
        access: AccessLevel,
    ) -> Result<Document, LibraryError> {
        let mut doc = self.load_for_owner(requester, id).await?;
        self.check_share_target(&doc.owner_id, &member).await?;

        let read_version = doc.version;
        let added = doc.upsert_share(member, access);
        let stored = self.commit(&doc, read_version).await?;
        debug!(added, ?access, "share saved");
        Ok(stored)
    }

    /// Revoke `member`'s access. Owner only.
    #[instrument(name = "library.unshare", skip_all, fields(requester = %requester, document_id = %id, member = %member))]
    pub async fn unshare(
        &self,
        requester: &UserId,
        id: &DocumentId,
        member: &UserId,
    ) -> Result<Document, LibraryError> {
        let mut doc = self.load_for_owner(requester, id).await?;
        let read_version = doc.version;
        if !doc.remove_share(member) {
            return Err(LibraryError::NotFound(format!(
                "document {id} is not shared with {member}"
            )));
        }
        self.commit(&doc, read_version).await
    }
}
