//! Bearer token validation against the identity provider's signing keys.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::idp::IdentityProviderClient;
use crate::auth::jwks::{JwksCache, JwksCacheError};
use crate::error::{ApiError, ApiResult, AuthError, AuthErrorKind};
use crate::types::Subject;

/// Claims the API relies on. Issuer, audience and expiry are checked during
/// decoding and not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Absent when the API grants the caller nothing.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    pub exp: Option<u64>,
}

impl Claims {
    pub fn subject(&self) -> Subject {
        Subject::new(self.sub.clone())
    }
}

/// Verifies signature, expiry, audience and issuer of end-user tokens.
pub struct TokenValidator {
    jwks: JwksCache,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(idp: Arc<IdentityProviderClient>) -> Self {
        let config = idp.config();

        let primary = config.algorithms.first().copied().unwrap_or(Algorithm::RS256);
        let mut validation = Validation::new(primary);
        validation.algorithms = config.algorithms.clone();
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer()]);
        validation.set_audience(&[&config.api_audience]);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let jwks = JwksCache::new(idp.clone(), config.jwks_cache_seconds);
        Self { jwks, validation }
    }

    pub async fn validate(&self, token: &str) -> ApiResult<Claims> {
        let header = decode_header(token).map_err(|e| {
            debug!("Rejecting token with malformed header: {}", e);
            AuthError::new(AuthErrorKind::InvalidToken, "Broken jwt payload")
        })?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::of(AuthErrorKind::InvalidToken))?;

        let key = self.jwks.get_key(&kid).await.map_err(|e| match e {
            JwksCacheError::KeyNotFound(_) => {
                debug!("No signing key matches kid {}", kid);
                AuthError::of(AuthErrorKind::InvalidToken).into()
            }
            other => ApiError::server_fault(other.to_string()),
        })?;

        let data = decode::<Claims>(token, &key, &self.validation).map_err(|e| {
            debug!("Token verification failed: {}", e);
            map_verification_error(e.kind(), &e)
        })?;

        debug!("Token verified for subject {}", data.claims.sub);
        Ok(data.claims)
    }
}

fn map_verification_error(kind: &ErrorKind, err: &jsonwebtoken::errors::Error) -> ApiError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::of(AuthErrorKind::ExpiredToken).into(),
        ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer => {
            AuthError::of(AuthErrorKind::UnauthorizedIssuer).into()
        }
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" || claim == "iss" => {
            AuthError::of(AuthErrorKind::UnauthorizedIssuer).into()
        }
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingAlgorithm
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::of(AuthErrorKind::InvalidToken).into(),
        _ => ApiError::server_fault(format!("Token verification fault: {}", err)),
    }
}
