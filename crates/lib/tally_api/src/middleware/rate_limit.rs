//! Per-IP login throttling.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::http::header::RETRY_AFTER;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_core::auth::rate_limit::RateLimitDecision;
use tracing::warn;

use crate::AppState;
use crate::error::AppError;

pub const LOGIN_RATE_LIMIT_MESSAGE: &str =
    "Too many login attempts from this IP, please try again later.";

/// Client address from the connection, or `"unknown"` when the server was
/// not started with connect info.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware: counts the attempt and answers 429 once the client
/// exceeds the login window, before any credential work.
pub async fn limit_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    match state.login_limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            warn!(client = %key, "login rate limit exceeded");
            let mut response =
                AppError::RateLimited(LOGIN_RATE_LIMIT_MESSAGE.into()).into_response();
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            response
        }
    }
}
