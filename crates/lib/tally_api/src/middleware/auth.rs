//! Authentication middleware: Bearer token verification and declarative
//! capability checks.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tally_core::models::auth::{Capability, Principal};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Key used to store the verified `Principal` in request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Principal);

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the JWT,
/// and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    let principal = state
        .auth
        .verify_access_token(token)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(principal));

    Ok(next.run(request).await)
}

/// Axum middleware: rejects callers whose role lacks the route group's
/// capability. Must run after [`require_auth`].
pub async fn require_capability(
    State(capability): State<Capability>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let AuthenticatedUser(principal) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .copied()
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    if !principal.role.grants(capability) {
        debug!(
            user_id = %principal.user_id,
            role = %principal.role,
            ?capability,
            "capability denied"
        );
        return Err(AppError::Forbidden("Forbidden: Insufficient role".into()));
    }

    Ok(next.run(request).await)
}
