pub mod documents;
pub mod form;
pub mod health;
pub mod openapi;
pub mod schemas;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use docvault_library::DocumentLibrary;

use crate::auth::{AuthLayer, IdentityResolver};

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The document pipelines.
    pub library: Arc<DocumentLibrary>,
    /// Maps request credentials to a user.
    pub identity: Arc<dyn IdentityResolver>,
}

/// Build the Axum router with all API routes, middleware, and Swagger UI.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics));

    // Upload size is enforced while streaming, against the upload policy.
    let protected = Router::new()
        .route(
            "/documents/upload",
            post(documents::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/documents/list", get(documents::list))
        .route("/documents/view/{id}", get(documents::view))
        .route(
            "/documents/{id}",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .route(
            "/documents/{id}/replace",
            post(documents::replace).layer(DefaultBodyLimit::disable()),
        )
        .route("/documents/{id}/share", post(documents::share))
        .route("/documents/{id}/unshare", delete(documents::unshare))
        .layer(AuthLayer::new(Arc::clone(&state.identity)));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
