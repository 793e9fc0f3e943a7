use async_trait::async_trait;

use docvault_core::UserId;

use crate::error::ServerError;

/// The authenticated user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
    /// Contact address, when the token carries one.
    pub email: Option<String>,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// Maps a presented credential to the caller it identifies.
///
/// Implementations must reject anything they cannot verify with
/// [`ServerError::Unauthenticated`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<CallerIdentity, ServerError>;
}
