//! CasareRPA dispatcher composition root: the background process that
//! assigns queued jobs to robots, fires due schedules, sweeps stale leases
//! and robots, roots the audit log, and reaps expired dead letters. Every
//! task runs under a Redis-coordinated lease so exactly one dispatcher
//! instance performs a given scope's work at a time, letting the process
//! scale horizontally for availability without duplicating effects.

#![forbid(unsafe_code)]

mod config;
mod state;
mod tasks;

use std::time::Duration;

use casare_core::AppError;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tracing::info;

use crate::config::DispatcherConfig;
use crate::tasks::run_leased_loop;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let config = DispatcherConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let context = state::build_dispatcher_context(pool, redis_client, &config)?;

    info!(holder_id = %context.holder_id, "casare-orchestrator-dispatcher starting");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut tasks = JoinSet::new();

    tasks.spawn(run_leased_loop(
        context.dispatcher_tick,
        context.lease_coordinator.clone(),
        context.holder_id.clone(),
        context.coordination_lease_seconds,
        Duration::from_millis(config.dispatcher_tick_ms),
        shutdown_rx.clone(),
    ));

    tasks.spawn(run_leased_loop(
        context.schedule_ticker,
        context.lease_coordinator.clone(),
        context.holder_id.clone(),
        context.coordination_lease_seconds,
        Duration::from_millis(config.schedule_ticker_ms),
        shutdown_rx.clone(),
    ));

    tasks.spawn(run_leased_loop(
        context.heartbeat_watchdog,
        context.lease_coordinator.clone(),
        context.holder_id.clone(),
        context.coordination_lease_seconds,
        Duration::from_millis(config.heartbeat_watchdog_ms),
        shutdown_rx.clone(),
    ));

    tasks.spawn(run_leased_loop(
        context.audit_root,
        context.lease_coordinator.clone(),
        context.holder_id.clone(),
        context.coordination_lease_seconds,
        Duration::from_millis(config.audit_root_ms),
        shutdown_rx.clone(),
    ));

    tasks.spawn(run_leased_loop(
        context.dlq_sweep,
        context.lease_coordinator,
        context.holder_id,
        context.coordination_lease_seconds,
        Duration::from_millis(config.dlq_sweep_ms),
        shutdown_rx,
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received, draining background tasks"),
        Err(error) => tracing::warn!(%error, "failed to install ctrl-c handler"),
    }

    let _ = shutdown_tx.send(true);

    while let Some(result) = tasks.join_next().await {
        if let Err(error) = result {
            tracing::warn!(%error, "background task panicked during shutdown");
        }
    }

    info!("casare-orchestrator-dispatcher stopped");

    Ok(())
}
