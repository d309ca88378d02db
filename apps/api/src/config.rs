use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use casare_core::AppError;
use tracing_subscriber::EnvFilter;

/// Environment-driven configuration for the Control API process.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub redis_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub default_lease_seconds: u32,
    pub default_claim_limit: u32,
    pub robot_liveness_window_seconds: u64,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_env("DATABASE_URL")?;
        let redis_url = required_env("REDIS_URL")?;

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let default_lease_seconds = parse_env_u32("DEFAULT_LEASE_SECONDS", 30)?;
        let default_claim_limit = parse_env_u32("DEFAULT_CLAIM_LIMIT", 10)?;
        let robot_liveness_window_seconds =
            parse_env_u64("ROBOT_LIVENESS_WINDOW_SECONDS", 90)?;

        Ok(Self {
            migrate_only,
            database_url,
            redis_url,
            api_host,
            api_port,
            cors_allowed_origin,
            default_lease_seconds,
            default_claim_limit,
            robot_liveness_window_seconds,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
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
