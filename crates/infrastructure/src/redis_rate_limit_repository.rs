//! Redis-backed sliding-window rate limit repository, grounded on the
//! teacher's `redis_rate_limit_repository.rs` key-prefixing and
//! `redis::Script` usage. The schedule engine's sliding window needs the
//! actual list of recent fire timestamps rather than a bare counter, so
//! this adapter uses a sorted set keyed by epoch-second score instead of
//! the teacher's `INCR`+`TTL` counter.

use async_trait::async_trait;
use casare_application::RateLimitRepository;
use casare_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use redis::Script;

const RECORD_AND_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local member = ARGV[3]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, window)
return redis.call('ZRANGE', key, 0, -1, 'WITHSCORES')
"#;

/// Redis implementation of the sliding-window rate limit port.
#[derive(Clone)]
pub struct RedisRateLimitRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRateLimitRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }
}

#[async_trait]
impl RateLimitRepository for RedisRateLimitRepository {
    async fn record_and_window(
        &self,
        key: &str,
        at: DateTime<Utc>,
        window_seconds: u64,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        if window_seconds == 0 {
            return Err(AppError::Validation(
                "rate limit window_seconds must be greater than zero".to_owned(),
            ));
        }

        let redis_key = self.key_for(key);
        let member = format!("{}:{}", at.timestamp_nanos_opt().unwrap_or_default(), uuid::Uuid::new_v4());

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        let script = Script::new(RECORD_AND_WINDOW_SCRIPT);
        let raw: Vec<String> = script
            .key(redis_key)
            .arg(at.timestamp())
            .arg(window_seconds)
            .arg(member)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::TransientIO(format!("failed to record redis rate limit window: {error}"))
            })?;

        let mut fire_times = Vec::with_capacity(raw.len() / 2);
        for pair in raw.chunks_exact(2) {
            let epoch_seconds: i64 = pair[1].parse().map_err(|error| {
                AppError::Internal(format!("invalid redis rate limit score: {error}"))
            })?;
            let fire_time = DateTime::from_timestamp(epoch_seconds, 0).ok_or_else(|| {
                AppError::Internal(format!(
                    "invalid redis rate limit timestamp: {epoch_seconds}"
                ))
            })?;
            fire_times.push(fire_time);
        }

        Ok(fire_times)
    }
}
