//! Credential validation collaborator.
//!
//! The core never handles passwords itself; it calls this interface only to
//! obtain the consumer identity passed into `consume`. Deployments embedding
//! the crate inject their own implementation against their user store.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Credentials presented by the mobile client when it is not already
/// authenticated.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub secret: String,
    pub subject: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the secret.
        f.debug_struct("Credentials")
            .field("secret", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

/// Resolves credentials to the external user identity that becomes the
/// token's `consumer_id`.
pub trait CredentialValidator: Send + Sync {
    fn resolve_identity(&self, credentials: &Credentials) -> Result<String, IdentityError>;
}

/// Default validator: rejects everything. The credential path is opt-in;
/// callers that already authenticated the mobile session pass a resolved
/// `consumer_id` instead.
pub struct RejectAllValidator;

impl CredentialValidator for RejectAllValidator {
    fn resolve_identity(&self, _credentials: &Credentials) -> Result<String, IdentityError> {
        Err(IdentityError::InvalidCredentials)
    }
}
