//! Error taxonomy for the HTTP surface.
//!
//! Every failure that leaves a handler or a guard is an [`ApiError`], and every
//! `ApiError` renders as the same JSON envelope:
//!
//! ```json
//! { "status": "Unauthorized", "code": 401, "detail": "Missing token" }
//! ```
//!
//! Server faults carry a diagnostic `detail` that is logged but never written
//! to the response body.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Kinds of authentication/authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Token header is malformed, or no signing key matches its `kid`.
    InvalidToken,
    /// Token `exp` is in the past.
    ExpiredToken,
    /// Token audience or issuer does not match the configuration.
    UnauthorizedIssuer,
    /// `Authorization` header is absent or its scheme is not `Bearer`.
    UnauthorizedHeader,
    /// `Authorization` header does not hold exactly a scheme and a credential.
    MissingToken,
    /// A required permission is absent from the token.
    Unauthorized,
    /// The token was valid but no identity could be resolved for it.
    Unauthenticated,
}

impl AuthErrorKind {
    fn default_description(self) -> &'static str {
        match self {
            Self::InvalidToken => "Invalid token entity",
            Self::ExpiredToken => "token expiration reached",
            Self::UnauthorizedIssuer => "Unrecognized issuer",
            Self::UnauthorizedHeader => "Broken Authorization header",
            Self::MissingToken => "Missing token",
            Self::Unauthorized => "Permissions unauthorized",
            Self::Unauthenticated => "Unable to resolve user identity",
        }
    }
}

/// Authentication or authorization failure, always answered with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    kind: AuthErrorKind,
    description: String,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Build an error with the stock description for `kind`.
    pub fn of(kind: AuthErrorKind) -> Self {
        Self::new(kind, kind.default_description())
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::ExpiredToken => "Expired Token",
            _ => "Unauthorized",
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.description)
    }
}

impl std::error::Error for AuthError {}

/// Request body validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// A required key is missing or a value does not coerce to its type.
    InvalidBody,
    /// The body is not a JSON object at all.
    EmptyBody,
}

impl RequestError {
    pub fn code(self) -> StatusCode {
        match self {
            Self::InvalidBody => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EmptyBody => StatusCode::FORBIDDEN,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidBody => "Invalid request body",
            Self::EmptyBody => "Nothing in body",
        }
    }
}

/// Any error surfaced by a handler or a guard.
#[derive(Debug, Clone)]
pub enum ApiError {
    Auth(AuthError),
    /// Upstream identity-provider fault or unexpected internal failure.
    Server {
        name: String,
        description: String,
        detail: String,
    },
    Request(RequestError),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    MethodNotAllowed,
}

impl ApiError {
    /// Generic server fault wrapping `detail` as the diagnostic cause.
    pub fn server_fault(detail: impl Into<String>) -> Self {
        Self::Server {
            name: "Server Fault".to_string(),
            description: "Unrecognized server fault".to_string(),
            detail: detail.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound("No data founded".to_string())
    }

    /// Map a bare status code (framework rejection, unknown route) onto the
    /// closest variant.
    pub fn from_status(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error").to_string();
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(reason),
            StatusCode::METHOD_NOT_ALLOWED => Self::MethodNotAllowed,
            StatusCode::CONFLICT => Self::Conflict(reason),
            StatusCode::UNAUTHORIZED => Self::Auth(AuthError::of(AuthErrorKind::Unauthenticated)),
            StatusCode::FORBIDDEN => Self::Request(RequestError::EmptyBody),
            StatusCode::UNPROCESSABLE_ENTITY => Self::Request(RequestError::InvalidBody),
            s if s.is_client_error() => Self::BadRequest(reason),
            _ => Self::server_fault(reason),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.code(),
            Self::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Request(e) => e.code(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Value of the envelope's `status` field.
    pub fn name(&self) -> &str {
        match self {
            Self::Auth(e) => e.name(),
            Self::Server { name, .. } => name,
            Self::Request(RequestError::InvalidBody) => "Unprocessable Entity",
            Self::Request(RequestError::EmptyBody) => "Forbidden",
            Self::NotFound(_) => "Not Found",
            Self::Conflict(_) => "Conflict",
            Self::BadRequest(_) => "Bad Request",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }

    /// Value of the envelope's `detail` field.
    pub fn description(&self) -> &str {
        match self {
            Self::Auth(e) => e.description(),
            Self::Server { description, .. } => description,
            Self::Request(e) => e.description(),
            Self::NotFound(d) | Self::Conflict(d) | Self::BadRequest(d) => d,
            Self::MethodNotAllowed => "The method is not allowed for the requested URL",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server {
                name,
                description,
                detail,
            } => write!(f, "{}: {} ({})", name, description, detail),
            other => write!(f, "{}: {}", other.name(), other.description()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::Request(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::server_fault(format!("{:#}", err))
    }
}

impl From<surrealdb::Error> for ApiError {
    fn from(err: surrealdb::Error) -> Self {
        Self::server_fault(format!("Database error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Server { detail, .. } = &self {
            error!(code = status.as_u16(), detail = %detail, "Request failed with server fault");
        }

        let body = serde_json::json!({
            "status": self.name(),
            "code": status.as_u16(),
            "detail": self.description(),
        });
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers and guards.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn envelope(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_auth_error_names() {
        assert_eq!(AuthError::of(AuthErrorKind::ExpiredToken).name(), "Expired Token");
        assert_eq!(AuthError::of(AuthErrorKind::MissingToken).name(), "Unauthorized");
        assert_eq!(
            AuthError::of(AuthErrorKind::MissingToken).description(),
            "Missing token"
        );
    }

    #[test]
    fn test_request_error_codes() {
        assert_eq!(RequestError::InvalidBody.code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(RequestError::EmptyBody.code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_auth_error_envelope() {
        let (status, body) =
            envelope(AuthError::of(AuthErrorKind::UnauthorizedHeader).into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "Unauthorized");
        assert_eq!(body["code"], 401);
        assert_eq!(body["detail"], "Broken Authorization header");
    }

    #[tokio::test]
    async fn test_server_fault_hides_detail() {
        let (status, body) = envelope(ApiError::server_fault("connection refused")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "Server Fault");
        assert_eq!(body["detail"], "Unrecognized server fault");
        assert!(!body.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_from_status() {
        let (status, body) = envelope(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["code"], 405);

        let (status, _) = envelope(ApiError::from_status(StatusCode::UNSUPPORTED_MEDIA_TYPE)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
