use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use docvault_core::{AccessLevel, Document, DocumentId, ListScope, UserId};
use docvault_library::{ListQuery, MetadataPatch, MetricsSnapshot};

/// Error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error kind.
    #[schema(example = "invalid_input")]
    pub kind: String,
    /// Human-readable message.
    #[schema(example = "file is 12582912 bytes, which exceeds the 10485760 byte limit")]
    pub error: String,
}

/// Pipeline counters.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub uploads: u64,
    pub upload_failures: u64,
    pub replaces: u64,
    pub replace_failures: u64,
    pub deletes: u64,
    pub views: u64,
    /// Blobs deleted to roll back a failed write.
    pub compensations: u64,
    /// Records pointing at missing blobs, and blobs left orphaned.
    pub consistency_faults: u64,
    /// Updates rejected because the record changed underneath them.
    pub conflicts: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            uploads: snap.uploads,
            upload_failures: snap.upload_failures,
            replaces: snap.replaces,
            replace_failures: snap.replace_failures,
            deletes: snap.deletes,
            views: snap.views,
            compensations: snap.compensations,
            consistency_faults: snap.consistency_faults,
            conflicts: snap.conflicts,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub metrics: MetricsResponse,
}

/// Summary returned after a successful upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: DocumentId,
    pub filename: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
}

impl From<&Document> for UploadResponse {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            file_size: doc.file_size,
            upload_date: doc.upload_date,
        }
    }
}

/// Confirmation of a delete.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub id: DocumentId,
    #[schema(example = "document deleted")]
    pub message: String,
}

/// Multipart form accepted by `POST /documents/upload`.
///
/// Only `file` is required; the file part may also be named `pdf`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Display name; defaults to the uploaded file name.
    pub name: Option<String>,
    /// JSON array or comma-separated list.
    pub tags: Option<String>,
    pub description: Option<String>,
    pub folder: Option<String>,
    #[schema(format = Date)]
    pub expiry_date: Option<String>,
    pub reminder_enabled: Option<bool>,
    /// JSON array or comma-separated list of family member ids.
    pub shared_with: Option<String>,
}

/// Multipart form accepted by `POST /documents/{id}/replace`.
#[derive(Debug, ToSchema)]
pub struct ReplaceForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Query parameters for `GET /documents/list`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// `owned` (default), `shared`, or `all`.
    pub scope: Option<ListScope>,
    /// Only documents carrying this tag.
    pub tag: Option<String>,
    /// Only documents in this folder.
    pub folder: Option<String>,
    /// Page size.
    pub limit: Option<usize>,
    /// Records to skip.
    pub offset: Option<usize>,
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        Self {
            scope: params.scope.unwrap_or_default(),
            tag: params.tag,
            folder: params.folder,
            limit: params.limit,
            offset: params.offset.unwrap_or(0),
        }
    }
}

/// Query parameters for `GET /documents/view/{id}`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ViewParams {
    /// Send `Content-Disposition: attachment` instead of `inline`.
    pub download: Option<bool>,
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Fields to change on a document. Absent fields are left alone.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    pub filename: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub folder: Option<String>,
    /// `null` clears the expiry date.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, format = Date, example = "2026-03-01")]
    pub expiry_date: Option<Option<NaiveDate>>,
    pub reminder_enabled: Option<bool>,
    /// Reject the update unless the record is still at this version.
    pub expected_version: Option<u64>,
}

impl From<UpdateDocumentRequest> for MetadataPatch {
    fn from(req: UpdateDocumentRequest) -> Self {
        Self {
            filename: req.filename,
            description: req.description,
            tags: req.tags,
            folder: req.folder,
            expiry_date: req.expiry_date,
            reminder_enabled: req.reminder_enabled,
            expected_version: req.expected_version,
        }
    }
}

/// Grant a family member access to a document.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub member_id: UserId,
    /// Defaults to `view`.
    #[serde(default = "default_access")]
    pub access: AccessLevel,
}

fn default_access() -> AccessLevel {
    AccessLevel::View
}

/// Revoke a family member's access.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnshareRequest {
    pub member_id: UserId,
}
