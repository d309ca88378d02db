//! CasareRPA control-plane API composition root.

#![forbid(unsafe_code)]

mod api_router;
mod api_services;
mod config;
mod error;
mod handlers;
mod middleware;
mod state;

use casare_core::AppError;
use tracing::info;

use crate::config::ApiConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let config = ApiConfig::load()?;
    let pool = api_services::connect_and_migrate(&config.database_url).await?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let app_state = api_services::build_app_state(pool, &config)?;
    let app = api_router::build_router(app_state, config.cors_allowed_origin.as_deref())?;

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "casare-orchestrator-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
