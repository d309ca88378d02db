//! Runtime condition-gate evaluation for `sql_query`, `http_check`, and
//! `file_exists` schedule conditions. New subsystem (the teacher has no
//! condition gates); the SQL path reuses the same connection pool as the
//! rest of the infrastructure crate, and the HTTP path is grounded on the
//! teacher's `qrywell_sync.rs` use of a shared `reqwest::Client`.

use async_trait::async_trait;
use casare_application::ConditionEvaluator;
use casare_core::{AppError, AppResult};
use casare_domain::ConditionConfig;
use sqlx::{PgPool, Row};

/// Evaluates `sql_query`, `http_check`, and `file_exists` condition gates.
/// `custom` conditions have no registered implementation and always return
/// an error, since their behavior is operator-defined.
#[derive(Clone)]
pub struct StandardConditionEvaluator {
    pool: PgPool,
    http_client: reqwest::Client,
}

impl StandardConditionEvaluator {
    /// Creates a new evaluator with the given database pool and HTTP
    /// client.
    #[must_use]
    pub fn new(pool: PgPool, http_client: reqwest::Client) -> Self {
        Self { pool, http_client }
    }

    async fn evaluate_sql_query(&self, query: &str) -> AppResult<bool> {
        let row = sqlx::query(query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::TransientIO(format!("condition sql query failed: {error}")))?;

        let Some(row) = row else {
            return Ok(false);
        };

        if let Ok(value) = row.try_get::<bool, _>(0) {
            return Ok(value);
        }
        if let Ok(value) = row.try_get::<i64, _>(0) {
            return Ok(value != 0);
        }
        if let Ok(value) = row.try_get::<i32, _>(0) {
            return Ok(value != 0);
        }

        // The query returned a row but its first column is not a scalar we
        // recognize as truthy/falsy; presence of a row is treated as pass.
        Ok(true)
    }

    async fn evaluate_http_check(&self, url: &str) -> AppResult<bool> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|error| AppError::TransientIO(format!("condition http check failed: {error}")))?;

        Ok(response.status().is_success())
    }

    async fn evaluate_file_exists(&self, path: &str) -> AppResult<bool> {
        Ok(tokio::fs::metadata(path).await.is_ok())
    }
}

#[async_trait]
impl ConditionEvaluator for StandardConditionEvaluator {
    async fn evaluate(&self, condition: &ConditionConfig) -> AppResult<bool> {
        match condition {
            ConditionConfig::SqlQuery { query } => self.evaluate_sql_query(query).await,
            ConditionConfig::HttpCheck { url } => self.evaluate_http_check(url).await,
            ConditionConfig::FileExists { path } => self.evaluate_file_exists(path).await,
            ConditionConfig::Custom { name } => Err(AppError::Validation(format!(
                "no custom condition implementation registered for '{name}'"
            ))),
        }
    }
}
