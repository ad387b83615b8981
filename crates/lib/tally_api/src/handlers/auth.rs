//! Authentication request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ApiJson, ChangePasswordRequest, LoginRequest, MessageResponse, RefreshTokenRequest,
    RegisterRequest, TokenResponse,
};

/// `POST /register`: self-service customer sign-up.
pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    state
        .auth
        .register(&body.name, &body.mobile_number, &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

/// `POST /login`: authenticate with mobile number + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.auth.login(&body.mobile_number, &body.password).await?;
    Ok(Json(pair.into()))
}

/// `POST /refresh-token`: exchange a refresh token for a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshTokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = body.require()?;
    let pair = state.auth.refresh(&token).await?;
    Ok(Json(pair.into()))
}

/// `POST /logout`: revoke a refresh token. Unknown tokens succeed.
pub async fn logout_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshTokenRequest>,
) -> AppResult<Json<MessageResponse>> {
    let token = body.require()?;
    state.auth.logout(&token).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// `POST /logout-all`: revoke every refresh token of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.logout_all(principal.user_id).await?;
    Ok(Json(MessageResponse::new("Logged out from all sessions")))
}

/// `POST /change-password`: the caller's own password, or anyone's for
/// admins.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .change_password(
            &principal,
            body.user_id,
            &body.old_password,
            &body.new_password,
        )
        .await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
