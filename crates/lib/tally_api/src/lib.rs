//! # tally_api
//!
//! HTTP API library for Tally.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use sqlx::PgPool;
use tally_core::auth::AuthError;
use tally_core::auth::rate_limit::LoginRateLimiter;
use tally_core::auth::service::AuthService;
use tally_core::billing::engine::BillingEngine;
use tally_core::models::auth::Capability;
use tally_core::store::{CredentialStore, LedgerStore, PgStore, PriceStore, SessionStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, bills, customers, health, prices, users};
use crate::middleware::auth::{require_auth, require_capability};
use crate::middleware::rate_limit::limit_login;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub billing: BillingEngine,
    pub login_limiter: Arc<LoginRateLimiter>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the services over one store implementing every storage seam.
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Result<Self, AuthError>
    where
        S: CredentialStore + SessionStore + PriceStore + LedgerStore + 'static,
    {
        let auth = AuthService::new(&config.auth, store.clone(), store.clone())?;
        let billing = BillingEngine::new(store.clone(), store);
        Ok(Self {
            auth,
            billing,
            login_limiter: Arc::new(LoginRateLimiter::default()),
            config,
        })
    }

    /// State backed by PostgreSQL.
    pub fn postgres(config: ApiConfig, pool: PgPool) -> Result<Self, AuthError> {
        Self::new(config, Arc::new(PgStore::new(pool)))
    }
}

/// Run embedded database migrations.
///
/// Delegates to `tally_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tally_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_REGISTER, post(auth::register_handler))
        .route(
            routes::POST_LOGIN,
            post(auth::login_handler).layer(from_fn_with_state(state.clone(), limit_login)),
        )
        .route(routes::POST_REFRESH_TOKEN, post(auth::refresh_handler))
        .route(routes::POST_LOGOUT, post(auth::logout_handler));

    // Any authenticated caller
    let session = Router::new()
        .route(routes::POST_LOGOUT_ALL, post(auth::logout_all_handler))
        .route(routes::POST_CHANGE_PASSWORD, post(auth::change_password_handler))
        .layer(from_fn_with_state(Capability::Authenticated, require_capability));

    let user_admin = Router::new()
        .route(
            routes::ADMIN_USERS,
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            routes::ADMIN_USERS_ID,
            put(users::update_user_handler).delete(users::delete_user_handler),
        )
        .layer(from_fn_with_state(Capability::ManageUsers, require_capability));

    let billing_admin = Router::new()
        .route(routes::ADMIN_CUSTOMER, post(customers::create_customer_handler))
        .route(routes::ADMIN_CUSTOMERS, get(customers::list_customers_handler))
        .route(
            routes::ADMIN_PRICES,
            get(prices::list_prices_handler).post(prices::create_price_handler),
        )
        .route(
            routes::ADMIN_BILLS,
            get(bills::list_bills_handler).post(bills::create_bill_handler),
        )
        .route(
            routes::ADMIN_BILLS_ID,
            put(bills::update_bill_handler).delete(bills::delete_bill_handler),
        )
        .route(routes::ADMIN_REPORTS_BILLS, get(bills::bills_report_handler))
        .route(
            routes::ADMIN_LAST_TRANSACTIONS,
            get(bills::last_transactions_handler),
        )
        .route(routes::ADMIN_WEEKLY_SALES, get(bills::weekly_sales_handler))
        .layer(from_fn_with_state(Capability::ManageBilling, require_capability));

    let own_account = Router::new()
        .route(routes::CUSTOMER_ME, get(customers::my_details_handler))
        .route(routes::CUSTOMER_MY_BILLS, get(customers::my_bills_handler))
        .layer(from_fn_with_state(Capability::ViewOwnAccount, require_capability));

    // Protected routes (require auth). The token check wraps every group's
    // capability check.
    let protected = Router::new()
        .merge(session)
        .merge(user_admin)
        .merge(billing_admin)
        .merge(own_account)
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
