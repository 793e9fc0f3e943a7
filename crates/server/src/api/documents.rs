use axum::Extension;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tracing::warn;

use docvault_core::{Document, DocumentId, UserId};
use docvault_library::{DocumentDraft, DocumentLibrary, FileDescriptor, StagedUpload};

use super::AppState;
use super::form::{FILE_FIELDS, apply_field};
use super::schemas::{
    DeleteResponse, ErrorResponse, ListParams, ReplaceForm, ShareRequest, UnshareRequest,
    UpdateDocumentRequest, UploadForm, UploadResponse, ViewParams,
};
use crate::auth::CallerIdentity;
use crate::error::ServerError;

fn bad_request(e: impl std::fmt::Display) -> ServerError {
    ServerError::BadRequest(e.to_string())
}

fn is_file_part(field: &Field<'_>) -> bool {
    field.file_name().is_some() || field.name().is_some_and(|n| FILE_FIELDS.contains(&n))
}

fn describe(field: &Field<'_>) -> FileDescriptor {
    FileDescriptor {
        filename: field.file_name().unwrap_or("upload").to_owned(),
        content_type: field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned(),
        declared_size: None,
    }
}

/// Read the upload form, staging the file part as soon as it arrives.
///
/// The staged blob is left in `staged` so the caller can discard it if a
/// later part turns out to be invalid.
async fn read_upload_form(
    library: &DocumentLibrary,
    owner: &UserId,
    multipart: &mut Multipart,
    staged: &mut Option<StagedUpload>,
) -> Result<DocumentDraft, ServerError> {
    let mut draft = DocumentDraft::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if is_file_part(&field) {
            if staged.is_some() {
                return Err(bad_request("only one file may be uploaded per request"));
            }
            // Fields sent ahead of the file are rejected before it is stored.
            library.check_draft(owner, &draft).await?;
            let file = describe(&field);
            *staged = Some(library.stage(owner, file, Box::pin(field)).await?);
        } else {
            let name = field.name().unwrap_or_default().to_owned();
            let value = field.text().await.map_err(bad_request)?;
            apply_field(&mut draft, &name, &value)?;
        }
    }

    Ok(draft)
}

/// `POST /documents/upload` -- store a new file and create its record.
#[utoipa::path(
    post,
    path = "/documents/upload",
    tag = "Documents",
    summary = "Upload a document",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = UploadResponse),
        (status = 400, description = "Rejected file or form field", body = ErrorResponse),
        (status = 401, description = "No valid identity", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn upload(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;
    let library = &state.library;

    let mut staged = None;
    let draft = match read_upload_form(library, &caller.user_id, &mut multipart, &mut staged).await
    {
        Ok(draft) => draft,
        Err(e) => {
            if let Some(staged) = staged.take()
                && let Err(cleanup) = library.discard(staged).await
            {
                warn!(error = %cleanup, "failed to discard staged upload");
            }
            return Err(e);
        }
    };

    let Some(staged) = staged else {
        return Err(bad_request("no file uploaded"));
    };
    let doc = library.commit_upload(staged, draft).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse::from(&doc))))
}

/// `GET /documents/list` -- records visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/documents/list",
    tag = "Documents",
    summary = "List documents",
    params(ListParams),
    responses(
        (status = 200, description = "Matching documents", body = Vec<Document>),
        (status = 401, description = "No valid identity", body = ErrorResponse)
    )
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ServerError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let docs = state.library.list(&caller.user_id, params.into()).await?;
    Ok(Json(docs))
}

/// `GET /documents/{id}` -- a single record.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    summary = "Get document metadata",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "The record", body = Document),
        (status = 403, description = "Not shared with the caller", body = ErrorResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Document>, ServerError> {
    Ok(Json(state.library.get(&caller.user_id, &id).await?))
}

/// ASCII-only `filename` parameter for `Content-Disposition`.
fn disposition(download: bool, filename: &str) -> HeaderValue {
    let kind = if download { "attachment" } else { "inline" };
    let safe: String = filename
        .chars()
        .map(|c| {
            let keep = c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\');
            if keep { c } else { '_' }
        })
        .collect();
    HeaderValue::from_str(&format!("{kind}; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

/// `GET /documents/view/{id}` -- stream the document's bytes.
#[utoipa::path(
    get,
    path = "/documents/view/{id}",
    tag = "Documents",
    summary = "View or download a document",
    params(("id" = String, Path, description = "Document id"), ViewParams),
    responses(
        (status = 200, description = "Raw file bytes with the stored content type"),
        (status = 403, description = "Not shared with the caller", body = ErrorResponse),
        (status = 404, description = "Unknown document or missing content", body = ErrorResponse)
    )
)]
pub async fn view(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
    params: Result<Query<ViewParams>, QueryRejection>,
) -> Result<Response, ServerError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let download = state.library.view(&caller.user_id, &id).await?;

    let blob_id = download.document.blob_id.clone();
    let stream = download.stream.inspect_err(move |e| {
        warn!(blob_id = %blob_id, error = %e, "content stream failed mid-transfer");
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&download.document.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(download.info.length));
    headers.insert(
        header::CONTENT_DISPOSITION,
        disposition(params.download.unwrap_or(false), &download.document.filename),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}

/// `PUT /documents/{id}` -- change classification fields.
#[utoipa::path(
    put,
    path = "/documents/{id}",
    tag = "Documents",
    summary = "Update document metadata",
    params(("id" = String, Path, description = "Document id")),
    request_body = UpdateDocumentRequest,
    responses(
        (status = 200, description = "Updated record", body = Document),
        (status = 400, description = "Invalid field", body = ErrorResponse),
        (status = 403, description = "Caller may not edit", body = ErrorResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse),
        (status = 409, description = "Record changed since it was read", body = ErrorResponse)
    )
)]
pub async fn update_document(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
    body: Result<Json<UpdateDocumentRequest>, JsonRejection>,
) -> Result<Json<Document>, ServerError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let doc = state
        .library
        .update_metadata(&caller.user_id, &id, req.into())
        .await?;
    Ok(Json(doc))
}

/// `POST /documents/{id}/replace` -- swap the document's content.
#[utoipa::path(
    post,
    path = "/documents/{id}/replace",
    tag = "Documents",
    summary = "Replace document content",
    params(("id" = String, Path, description = "Document id")),
    request_body(content = ReplaceForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated record", body = Document),
        (status = 400, description = "Rejected file", body = ErrorResponse),
        (status = 403, description = "Caller may not edit", body = ErrorResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse),
        (status = 409, description = "Record changed during the replace", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn replace(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Document>, ServerError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if is_file_part(&field) {
            let file = describe(&field);
            let doc = state
                .library
                .replace(&caller.user_id, &id, file, Box::pin(field))
                .await?;
            return Ok(Json(doc));
        }
    }

    Err(bad_request("no file uploaded"))
}

/// `DELETE /documents/{id}` -- remove a document and its bytes.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    summary = "Delete a document",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document deleted", body = DeleteResponse),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
) -> Result<Json<DeleteResponse>, ServerError> {
    state.library.delete(&caller.user_id, &id).await?;
    Ok(Json(DeleteResponse {
        id,
        message: "document deleted".to_owned(),
    }))
}

/// `POST /documents/{id}/share` -- grant or change a member's access.
#[utoipa::path(
    post,
    path = "/documents/{id}/share",
    tag = "Sharing",
    summary = "Share a document",
    params(("id" = String, Path, description = "Document id")),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Updated record", body = Document),
        (status = 400, description = "Member is not in the owner's family", body = ErrorResponse),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
pub async fn share(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
    body: Result<Json<ShareRequest>, JsonRejection>,
) -> Result<Json<Document>, ServerError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let doc = state
        .library
        .share(&caller.user_id, &id, req.member_id, req.access)
        .await?;
    Ok(Json(doc))
}

/// `DELETE /documents/{id}/unshare` -- revoke a member's access.
#[utoipa::path(
    delete,
    path = "/documents/{id}/unshare",
    tag = "Sharing",
    summary = "Unshare a document",
    params(("id" = String, Path, description = "Document id")),
    request_body = UnshareRequest,
    responses(
        (status = 200, description = "Updated record", body = Document),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Unknown document, or not shared with that member", body = ErrorResponse)
    )
)]
pub async fn unshare(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<DocumentId>,
    body: Result<Json<UnshareRequest>, JsonRejection>,
) -> Result<Json<Document>, ServerError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let doc = state
        .library
        .unshare(&caller.user_id, &id, &req.member_id)
        .await?;
    Ok(Json(doc))
}
