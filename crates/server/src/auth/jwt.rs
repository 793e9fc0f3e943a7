use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::identity::{CallerIdentity, IdentityResolver};
use crate::error::ServerError;

/// Claims carried by the session tokens the auth service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry (seconds since epoch).
    pub exp: u64,
}

/// Verifies HS256 bearer tokens signed with a shared secret.
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<CallerIdentity, ServerError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ServerError::Unauthenticated(format!("invalid token: {e}")))?
            .claims;

        if claims.id.trim().is_empty() {
            return Err(ServerError::Unauthenticated(
                "token does not name a user".to_owned(),
            ));
        }

        Ok(CallerIdentity {
            user_id: claims.id.into(),
            email: claims.email,
        })
    }
}
