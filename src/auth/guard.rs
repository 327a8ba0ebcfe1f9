//! Request guards.
//!
//! `authenticate` validates the bearer token, resolves the caller into a local
//! user and stores a [`UserContext`] in the request extensions. `authorize`
//! then checks that every required permission is in the token's permissions
//! claim. Both run as route layers; a failure answers with the error envelope
//! and the handler is never called.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::MethodRouter;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use tracing::debug;

use crate::api::AppState;
use crate::auth::context::UserContext;
use crate::error::{ApiError, AuthError, AuthErrorKind};

/// Extract the credential from an `Authorization: Bearer <token>` header.
///
/// The header must split on single spaces into exactly two parts, the first
/// being literally `Bearer`.
pub fn parse_bearer(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::of(AuthErrorKind::UnauthorizedHeader))?
        .to_str()
        .map_err(|_| AuthError::of(AuthErrorKind::UnauthorizedHeader))?;

    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 {
        return Err(AuthError::of(AuthErrorKind::MissingToken));
    }
    if parts[0] != "Bearer" {
        return Err(AuthError::of(AuthErrorKind::UnauthorizedHeader));
    }
    if parts[1].is_empty() {
        return Err(AuthError::of(AuthErrorKind::MissingToken));
    }

    Ok(parts[1].to_string())
}

/// Validate the bearer token and attach the caller's [`UserContext`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = parse_bearer(request.headers())?;
    let claims = state.validator.validate(&token).await?;
    let subject = claims.subject();

    let identity = state
        .resolver
        .resolve(&subject)
        .await?
        .ok_or_else(|| AuthError::of(AuthErrorKind::Unauthenticated))?;

    let context = UserContext::new(
        identity.id,
        subject,
        claims.permissions,
        identity.username,
        identity.role,
    );
    debug!(user = %context.display(), "Authenticated request");
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Permissions a route requires, all of them.
#[derive(Debug, Clone, Copy)]
pub struct RequiredPermissions(pub &'static [&'static str]);

/// Check the permissions of the context `authenticate` attached.
pub async fn authorize(
    State(RequiredPermissions(required)): State<RequiredPermissions>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = request
        .extensions()
        .get::<UserContext>()
        .ok_or_else(|| AuthError::of(AuthErrorKind::Unauthenticated))?;

    if context.permissions().is_none_or(|granted| granted.is_empty()) {
        debug!(user = %context.display(), "Token carries no permissions");
        return Err(AuthError::of(AuthErrorKind::Unauthorized).into());
    }

    if let Some(missing) = required.iter().find(|p| !context.has_permission(p)) {
        debug!(user = %context.display(), permission = %missing, "Permission missing");
        return Err(AuthError::of(AuthErrorKind::Unauthorized).into());
    }

    Ok(next.run(request).await)
}

/// Wrap `route` so it runs only for authenticated callers holding every
/// permission in `permissions`.
pub fn guarded(
    route: MethodRouter<AppState>,
    state: &AppState,
    permissions: &'static [&'static str],
) -> MethodRouter<AppState> {
    route
        .route_layer(middleware::from_fn_with_state(
            RequiredPermissions(permissions),
            authorize,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}
