use std::env;

use casare_core::AppError;
use tracing_subscriber::EnvFilter;

/// Environment-driven configuration for the dispatcher process: the
/// periodic subsystems named in the concurrency model (dispatcher tick,
/// schedule ticker, heartbeat watchdog, audit-root computer, DLQ sweep).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub redis_url: String,
    pub holder_id: String,
    pub coordination_lease_seconds: u32,
    pub dispatcher_tick_ms: u64,
    pub schedule_ticker_ms: u64,
    pub heartbeat_watchdog_ms: u64,
    pub audit_root_ms: u64,
    pub dlq_sweep_ms: u64,
    pub default_lease_seconds: u32,
    pub robot_liveness_window_seconds: i64,
    pub dlq_retention_days: i64,
    pub default_job_max_retries: u32,
    pub schedule_max_catchup_runs: u32,
    pub schedule_catchup_window_seconds: u64,
}

impl DispatcherConfig {
    pub fn load() -> Result<Self, AppError> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = required_env("REDIS_URL")?;

        let holder_id = env::var("DISPATCHER_HOLDER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("dispatcher-{}", std::process::id()));

        Ok(Self {
            database_url,
            redis_url,
            holder_id,
            coordination_lease_seconds: parse_env_u32("DISPATCHER_COORDINATION_LEASE_SECONDS", 30)?,
            dispatcher_tick_ms: parse_env_u64("DISPATCHER_TICK_MS", 2_000)?,
            schedule_ticker_ms: parse_env_u64("SCHEDULE_TICKER_MS", 5_000)?,
            heartbeat_watchdog_ms: parse_env_u64("HEARTBEAT_WATCHDOG_MS", 15_000)?,
            audit_root_ms: parse_env_u64("AUDIT_ROOT_MS", 30_000)?,
            dlq_sweep_ms: parse_env_u64("DLQ_SWEEP_MS", 3_600_000)?,
            default_lease_seconds: parse_env_u32("DEFAULT_LEASE_SECONDS", 30)?,
            robot_liveness_window_seconds: parse_env_i64("ROBOT_LIVENESS_WINDOW_SECONDS", 90)?,
            dlq_retention_days: parse_env_i64("DLQ_RETENTION_DAYS", 30)?,
            default_job_max_retries: parse_env_u32("DEFAULT_JOB_MAX_RETRIES", 3)?,
            schedule_max_catchup_runs: parse_env_u32("SCHEDULE_MAX_CATCHUP_RUNS", 5)?,
            schedule_catchup_window_seconds: parse_env_u64(
                "SCHEDULE_CATCHUP_WINDOW_SECONDS",
                3_600,
            )?,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<i64>()
            .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}
