//! Admin user management handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tally_core::auth::service::Registration;
use tally_core::models::auth::CredentialPatch;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    ApiJson, ApiPath, CreateUserRequest, MessageResponse, UpdateUserRequest, UserListResponse,
    UserResponse,
};

/// `GET /admin/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
) -> AppResult<Json<UserListResponse>> {
    let users = state.auth.list_users().await?;
    Ok(Json(UserListResponse { users }))
}

/// `POST /admin/users`: create an account with any role.
pub async fn create_user_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .auth
        .create_user(Registration {
            name: body.name,
            mobile_number: body.mobile_number,
            password: body.password,
            role: body.role,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully".into(),
            user,
        }),
    ))
}

/// `PUT /admin/users/{id}`
pub async fn update_user_handler(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .auth
        .update_user(
            user_id,
            CredentialPatch {
                name: body.name,
                mobile_number: body.mobile_number,
                role: body.role,
            },
        )
        .await?;
    Ok(Json(UserResponse {
        message: "User updated successfully".into(),
        user,
    }))
}

/// `DELETE /admin/users/{id}`: also removes the user's sessions, customer
/// profile and bills.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.delete_user(user_id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
