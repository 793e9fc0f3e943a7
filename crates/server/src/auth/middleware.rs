use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Query;
use axum::http::{Request, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tower::{Layer, Service};
use tracing::debug;

use super::identity::IdentityResolver;
use crate::error::ServerError;

/// Tower layer that resolves the caller and rejects anonymous requests.
#[derive(Clone)]
pub struct AuthLayer {
    resolver: Arc<dyn IdentityResolver>,
}

impl AuthLayer {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

/// Tower service that authenticates requests.
///
/// On success the [`CallerIdentity`](super::CallerIdentity) is inserted into
/// the request extensions for handlers to pick up.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    resolver: Arc<dyn IdentityResolver>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first, then a `?token=` query parameter.
fn extract_token(req: &Request<Body>) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_owned());
    }

    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let resolver = Arc::clone(&self.resolver);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(token) = extract_token(&req) else {
                return Ok(ServerError::Unauthenticated(
                    "missing authentication credentials".to_owned(),
                )
                .into_response());
            };

            match resolver.resolve(&token).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(e) => {
                    debug!(error = %e, "rejected credentials");
                    Ok(e.into_response())
                }
            }
        })
    }
}
