use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, SubsecRound, Utc};
use futures::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use docvault_blob::{BlobError, BlobInfo, BlobStore, BlobWriteRequest, BlobWriter};
use docvault_core::{
    AccessLevel, BlobId, Document, DocumentId, Share, UserId, ValidationError,
    normalize_description, normalize_filename, normalize_tags,
};

use crate::error::LibraryError;
use crate::library::DocumentLibrary;
use crate::metrics::LibraryMetrics;

/// What the transport layer knows about an incoming file before reading it.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Name of the file on the uploader's machine.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Byte length, when the transport announces it up front.
    pub declared_size: Option<u64>,
}

/// Classification fields supplied alongside a new upload.
#[derive(Debug, Clone, Default)]
pub struct DocumentDraft {
    /// Display name; defaults to the uploaded file name.
    pub filename: Option<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub folder: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reminder_enabled: bool,
    /// Family members granted `view` access from the start.
    pub shared_with: Vec<UserId>,
}

/// Deletes a blob from a background task if dropped while still armed.
///
/// Covers writes and staged uploads whose future is dropped before they
/// reach the metadata write, such as on a client disconnect.
pub(crate) struct BlobGuard {
    blobs: Arc<dyn BlobStore>,
    metrics: Arc<LibraryMetrics>,
    id: Option<BlobId>,
}

impl BlobGuard {
    pub(crate) fn new(blobs: Arc<dyn BlobStore>, metrics: Arc<LibraryMetrics>, id: BlobId) -> Self {
        Self {
            blobs,
            metrics,
            id: Some(id),
        }
    }

    /// The blob is committed or already cleaned up; leave it alone.
    pub(crate) fn disarm(&mut self) {
        self.id = None;
    }
}

impl fmt::Debug for BlobGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobGuard").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.metrics.increment_consistency_faults();
            warn!(blob_id = %id, "no runtime to remove abandoned blob, blob orphaned");
            return;
        };

        self.metrics.increment_compensations();
        let blobs = Arc::clone(&self.blobs);
        let metrics = Arc::clone(&self.metrics);
        handle.spawn(async move {
            // Deleting an unfinished blob sweeps its stray chunks.
            match blobs.delete(&id).await {
                Ok(()) | Err(BlobError::NotFound(_)) => {
                    debug!(blob_id = %id, "abandoned blob removed");
                }
                Err(e) => {
                    metrics.increment_consistency_faults();
                    warn!(blob_id = %id, error = %e, "failed to remove abandoned blob, blob orphaned");
                }
            }
        });
    }
}

/// A finalized blob that has not been attached to a document yet.
///
/// Pass it to [`DocumentLibrary::commit_upload`] or
/// [`DocumentLibrary::discard`]. If it is dropped instead, the blob is
/// deleted in the background.
#[must_use = "a staged upload must be committed or discarded"]
#[derive(Debug)]
pub struct StagedUpload {
    owner: UserId,
    original_name: String,
    mime_type: String,
    info: BlobInfo,
    guard: BlobGuard,
}

impl StagedUpload {
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn blob_id(&self) -> &BlobId {
        &self.info.id
    }

    pub fn file_size(&self) -> u64 {
        self.info.length
    }

    pub fn checksum_sha256(&self) -> &str {
        &self.info.checksum_sha256
    }
}

/// Draft fields after normalization and membership checks.
struct PreparedDraft {
    filename: Option<String>,
    tags: std::collections::BTreeSet<String>,
    description: Option<String>,
    folder: Option<String>,
    expiry_date: Option<NaiveDate>,
    reminder_enabled: bool,
    shared_with: Vec<Share>,
}

/// Why streaming a file into the blob store stopped.
pub(crate) enum WriteFailure {
    Invalid(ValidationError),
    Storage(String),
}

impl WriteFailure {
    /// Convert into the pipeline's error, using `failed` for storage faults.
    pub(crate) fn into_error(self, failed: fn(String) -> LibraryError) -> LibraryError {
        match self {
            Self::Invalid(e) => e.into(),
            Self::Storage(msg) => failed(msg),
        }
    }
}

/// Trim a folder name; blank means "no folder".
pub(crate) fn normalize_folder(folder: Option<&str>) -> Option<String> {
    folder
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_owned)
}

async fn abort_quietly(writer: Box<dyn BlobWriter>) {
    let id = writer.id().clone();
    if let Err(e) = writer.abort().await {
        warn!(blob_id = %id, error = %e, "failed to remove chunks of abandoned blob");
    }
}

impl DocumentLibrary {
    /// Validate `file` and stream `body` into a new blob.
    ///
    /// Type and declared size are checked before the blob store is touched.
    /// The running byte count is checked before every write, so an oversized
    /// stream never gets its excess bytes stored; chunks already written are
    /// removed. A transport error from `body` aborts the write the same way.
    #[instrument(name = "library.stage", skip_all, fields(owner = %owner, filename = %file.filename))]
    pub async fn stage<S, E>(
        &self,
        owner: &UserId,
        file: FileDescriptor,
        body: S,
    ) -> Result<StagedUpload, LibraryError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let (original_name, mime_type) = self.validate_file(&file)?;
        let (info, guard) = self
            .write_blob(&original_name, &mime_type, body)
            .await
            .map_err(|failure| {
                if matches!(failure, WriteFailure::Storage(_)) {
                    self.metrics.increment_upload_failures();
                }
                failure.into_error(LibraryError::UploadFailed)
            })?;
        debug!(blob_id = %info.id, size = info.length, "upload staged");

        Ok(StagedUpload {
            owner: owner.clone(),
            original_name,
            mime_type,
            info,
            guard,
        })
    }

    /// Attach a staged blob to a new document record.
    ///
    /// If the draft is rejected or the record cannot be stored, the staged
    /// blob is deleted before the error is returned.
    #[instrument(name = "library.commit_upload", skip_all, fields(owner = %staged.owner, blob_id = %staged.info.id))]
    pub async fn commit_upload(
        &self,
        mut staged: StagedUpload,
        draft: DocumentDraft,
    ) -> Result<Document, LibraryError> {
        let prepared = match self.prepare_draft(&staged.owner, draft).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.compensate(&staged.info.id).await;
                staged.guard.disarm();
                return Err(e);
            }
        };
        self.commit_prepared(staged, prepared).await
    }

    /// Check draft fields and share targets without touching storage.
    ///
    /// Lets a transport reject fields that arrive ahead of the file before
    /// any byte is stored. [`commit_upload`](Self::commit_upload) checks the
    /// complete draft again.
    pub async fn check_draft(
        &self,
        owner: &UserId,
        draft: &DocumentDraft,
    ) -> Result<(), LibraryError> {
        self.prepare_draft(owner, draft.clone()).await.map(|_| ())
    }

    /// Delete a staged blob that will not be committed.
    pub async fn discard(&self, mut staged: StagedUpload) -> Result<(), LibraryError> {
        let result = match self.blobs.delete(&staged.info.id).await {
            Ok(()) | Err(BlobError::NotFound(_)) => Ok(()),
            Err(e) => Err(LibraryError::Storage(e.to_string())),
        };
        staged.guard.disarm();
        result
    }

    /// Validate, store, and record a new document in one call.
    ///
    /// The draft is checked before any byte is written.
    #[instrument(name = "library.upload", skip_all, fields(owner = %owner))]
    pub async fn upload<S, E>(
        &self,
        owner: &UserId,
        file: FileDescriptor,
        draft: DocumentDraft,
        body: S,
    ) -> Result<Document, LibraryError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let prepared = self.prepare_draft(owner, draft).await?;
        let staged = self.stage(owner, file, body).await?;
        self.commit_prepared(staged, prepared).await
    }

    async fn commit_prepared(
        &self,
        staged: StagedUpload,
        draft: PreparedDraft,
    ) -> Result<Document, LibraryError> {
        let StagedUpload {
            owner,
            original_name,
            mime_type,
            info,
            mut guard,
        } = staged;

        let doc = Document {
            id: DocumentId::generate(),
            owner_id: owner,
            filename: draft.filename.unwrap_or_else(|| original_name.clone()),
            original_name,
            blob_id: info.id.clone(),
            mime_type,
            file_size: info.length,
            upload_date: Utc::now().trunc_subsecs(6),
            tags: draft.tags,
            description: draft.description,
            shared_with: draft.shared_with,
            folder: draft.folder,
            expiry_date: draft.expiry_date,
            reminder_enabled: draft.reminder_enabled,
            version: 1,
        };

        // Once the insert starts the record may land, so a dropped future
        // must not delete the blob behind it.
        guard.disarm();
        if let Err(e) = self.documents.insert(&doc).await {
            warn!(document_id = %doc.id, error = %e, "metadata insert failed, removing blob");
            self.metrics.increment_upload_failures();
            self.compensate(&info.id).await;
            return Err(LibraryError::UploadFailed(e.to_string()));
        }

        self.metrics.increment_uploads();
        info!(document_id = %doc.id, blob_id = %doc.blob_id, size = doc.file_size, "document uploaded");
        Ok(doc)
    }

    async fn prepare_draft(
        &self,
        owner: &UserId,
        draft: DocumentDraft,
    ) -> Result<PreparedDraft, LibraryError> {
        let filename = draft.filename.as_deref().map(normalize_filename).transpose()?;
        let mut shared_with: Vec<Share> = Vec::new();
        for member in draft.shared_with {
            if shared_with.iter().any(|s| s.member_id == member) {
                continue;
            }
            self.check_share_target(owner, &member).await?;
            shared_with.push(Share {
                member_id: member,
                access: AccessLevel::View,
            });
        }

        Ok(PreparedDraft {
            filename,
            tags: normalize_tags(&draft.tags)?,
            description: normalize_description(draft.description.as_deref())?,
            folder: normalize_folder(draft.folder.as_deref()),
            expiry_date: draft.expiry_date,
            reminder_enabled: draft.reminder_enabled,
            shared_with,
        })
    }

    /// Check type, declared size and name. Returns `(original_name, mime_type)`.
    pub(crate) fn validate_file(
        &self,
        file: &FileDescriptor,
    ) -> Result<(String, String), LibraryError> {
        let mime_type = self.policy.check_content_type(&file.content_type)?;
        if let Some(size) = file.declared_size {
            self.policy.check_declared_size(size)?;
        }
        let original_name = normalize_filename(&file.filename)?;
        Ok((original_name, mime_type))
    }

    /// Stream `body` into a new blob, enforcing the size ceiling.
    pub(crate) async fn write_blob<S, E>(
        &self,
        filename: &str,
        content_type: &str,
        mut body: S,
    ) -> Result<(BlobInfo, BlobGuard), WriteFailure>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let mut writer = self
            .blobs
            .open_write(BlobWriteRequest {
                filename: filename.to_owned(),
                content_type: content_type.to_owned(),
            })
            .await
            .map_err(|e| WriteFailure::Storage(e.to_string()))?;
        let mut guard = BlobGuard::new(
            Arc::clone(&self.blobs),
            Arc::clone(&self.metrics),
            writer.id().clone(),
        );

        let mut received: u64 = 0;
        while let Some(next) = body.next().await {
            let outcome = match next {
                Ok(piece) => {
                    received =
                        received.saturating_add(u64::try_from(piece.len()).unwrap_or(u64::MAX));
                    match self.policy.check_running_size(received) {
                        Ok(()) => writer
                            .write(piece)
                            .await
                            .map_err(|e| WriteFailure::Storage(e.to_string())),
                        Err(e) => Err(WriteFailure::Invalid(e)),
                    }
                }
                Err(e) => Err(WriteFailure::Storage(format!("client stream failed: {e}"))),
            };
            if let Err(failure) = outcome {
                abort_quietly(writer).await;
                guard.disarm();
                return Err(failure);
            }
        }

        if received == 0 {
            abort_quietly(writer).await;
            guard.disarm();
            return Err(WriteFailure::Invalid(ValidationError::Empty));
        }

        let id = writer.id().clone();
        match writer.finish().await {
            Ok(info) => Ok((info, guard)),
            Err(e) => {
                // The file record may or may not exist; sweep whatever is there.
                if let Err(cleanup) = self.blobs.delete(&id).await {
                    if !cleanup.is_not_found() {
                        warn!(blob_id = %id, error = %cleanup, "cleanup after failed finish failed");
                    }
                }
                guard.disarm();
                Err(WriteFailure::Storage(e.to_string()))
            }
        }
    }

    /// Delete a blob that a failed write left behind.
    pub(crate) async fn compensate(&self, blob_id: &BlobId) {
        self.metrics.increment_compensations();
        match self.blobs.delete(blob_id).await {
            Ok(()) | Err(BlobError::NotFound(_)) => {
                debug!(blob_id = %blob_id, "compensating delete done");
            }
            Err(e) => {
                self.metrics.increment_consistency_faults();
                warn!(blob_id = %blob_id, error = %e, "compensating delete failed, blob orphaned");
            }
        }
    }
}
