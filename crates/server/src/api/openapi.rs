#![allow(clippy::needless_for_each)]

use docvault_core::{AccessLevel, Document, ListScope, Share};

use super::schemas::{
    DeleteResponse, ErrorResponse, HealthResponse, MetricsResponse, ReplaceForm, ShareRequest,
    UnshareRequest, UpdateDocumentRequest, UploadForm, UploadResponse,
};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "docvault API",
        version = "0.1.0",
        description = "HTTP API for storing, sharing, and retrieving family documents.",
        license(name = "Apache-2.0")
    ),
    tags(
        (name = "Health", description = "Service health and metrics"),
        (name = "Documents", description = "Upload, list, view, update, replace, and delete documents"),
        (name = "Sharing", description = "Grant and revoke family members' access")
    ),
    paths(
        super::health::health,
        super::health::metrics,
        super::documents::upload,
        super::documents::list,
        super::documents::get_document,
        super::documents::view,
        super::documents::update_document,
        super::documents::replace,
        super::documents::delete_document,
        super::documents::share,
        super::documents::unshare,
    ),
    components(schemas(
        Document,
        Share,
        AccessLevel,
        ListScope,
        ErrorResponse,
        HealthResponse,
        MetricsResponse,
        UploadForm,
        ReplaceForm,
        UploadResponse,
        DeleteResponse,
        UpdateDocumentRequest,
        ShareRequest,
        UnshareRequest,
    ))
)]
pub struct ApiDoc;
