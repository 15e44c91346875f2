//! Handshake identity resolution.
//!
//! The hub never issues credentials; it only turns the token presented on the
//! upgrade request into a [`UserId`].

use crm_core::ids::UserId;
use crm_settings::AuthSettings;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::warn;

use crate::errors::RealtimeError;

/// Resolves a handshake credential to a user identity.
pub trait IdentityResolver: Send + Sync {
    /// Return the user the token belongs to, or an authentication error.
    fn resolve(&self, token: &str) -> Result<UserId, RealtimeError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
}

/// HMAC-signed JWT verifier reading the `sub` claim.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    /// Verify with `secret` using an HMAC algorithm.
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(algorithm),
        }
    }

    /// Build from the `auth` settings section.
    ///
    /// Warns when the placeholder secret is still configured.
    pub fn from_settings(auth: &AuthSettings) -> Result<Self, RealtimeError> {
        if auth.uses_default_secret() {
            warn!("auth.jwtSecret is the built-in default; set CRM_JWT_SECRET or auth.jwtSecret");
        }
        let algorithm = match auth.jwt_algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(RealtimeError::Authentication(format!(
                    "unsupported jwt algorithm {other}"
                )));
            }
        };
        Ok(Self::new(&auth.jwt_secret, algorithm))
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> Result<UserId, RealtimeError> {
        if token.is_empty() {
            return Err(RealtimeError::Authentication("missing token".into()));
        }
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| RealtimeError::Authentication(e.to_string()))?;
        if data.claims.sub.is_empty() {
            return Err(RealtimeError::Authentication("token has no subject".into()));
        }
        Ok(UserId::from(data.claims.sub))
    }
}
