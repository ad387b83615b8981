//! Tally API server binary.
//!
//! Loads `.env`, reads configuration from the environment, connects to
//! PostgreSQL (or runs on the in-memory store), applies migrations and
//! serves the REST API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tally_api::AppState;
use tally_api::config::ApiConfig;
use tally_core::store::MemoryStore;
use tracing::{info, warn};

const DEFAULT_LOG_FILTER: &str = "info,tally_api=debug,tally_core=debug";

/// How often expired refresh tokens are purged.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "tally_api_server", about = "Tally API server")]
struct Args {
    /// Port to listen on; overrides the port in `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Maximum number of database connections in the pool.
    #[arg(long)]
    max_connections: Option<u32>,

    /// Keep all data in process memory instead of PostgreSQL. Data is lost
    /// on exit.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }
    if let Some(max_connections) = args.max_connections {
        config.db_max_connections = max_connections;
    }

    info!(
        version = tally_core::version(),
        bind_addr = %config.bind_addr,
        in_memory = args.in_memory,
        "starting tally_api_server"
    );

    let state = if args.in_memory {
        warn!("using the in-memory store; data will not survive a restart");
        AppState::new(config.clone(), Arc::new(MemoryStore::new()))?
    } else {
        info!(
            max_connections = config.db_max_connections,
            "configuring connection pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        tally_api::migrate(&pool).await?;

        AppState::postgres(config.clone(), pool)?
    };

    let sweep = state.auth.sessions().spawn_sweep_task(SESSION_SWEEP_INTERVAL);
    let limiter_cleanup = state.login_limiter.spawn_cleanup_task();

    let app = tally_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweep.abort();
    limiter_cleanup.abort();
    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
