//! Redis-backed distributed lease coordinator electing a single active
//! dispatcher instance per scope key. Grounded on the teacher's
//! `redis_workflow_worker_lease_coordinator.rs`: identical compare-and-swap
//! Lua scripts, adapted from per-worker leases to per-periodic-task leases.

use async_trait::async_trait;
use casare_application::{DispatcherLease, DispatcherLeaseCoordinator};
use casare_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of dispatcher singleton-task lease coordination.
#[derive(Clone)]
pub struct RedisLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }
}

#[async_trait]
impl DispatcherLeaseCoordinator for RedisLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<DispatcherLease>> {
        if scope_key.trim().is_empty() {
            return Err(AppError::Validation(
                "dispatcher lease scope_key must not be empty".to_owned(),
            ));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "dispatcher lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "dispatcher lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        let acquired: bool = connection
            .set_nx(key.as_str(), token.as_str())
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to acquire dispatcher lease: {error}")))?;

        if !acquired {
            return Ok(None);
        }

        connection
            .expire::<_, ()>(key.as_str(), i64::from(lease_seconds))
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to set dispatcher lease ttl: {error}")))?;

        Ok(Some(DispatcherLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &DispatcherLease) -> AppResult<()> {
        let key = self.key_for(lease.scope_key.as_str());
        let script = Script::new(RELEASE_LEASE_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        script
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to release dispatcher lease: {error}")))?;

        Ok(())
    }

    async fn renew_lease(&self, lease: &DispatcherLease, lease_seconds: u32) -> AppResult<bool> {
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "dispatcher lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(lease.scope_key.as_str());
        let script = Script::new(RENEW_LEASE_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        let renewed = script
            .key(key)
            .arg(lease.token.as_str())
            .arg(i64::from(lease_seconds))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to renew dispatcher lease: {error}")))?;

        Ok(renewed > 0)
    }
}
