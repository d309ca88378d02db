use async_trait::async_trait;
use casare_core::AppResult;
use chrono::{DateTime, Utc};

/// Redis-backed sliding-window counter port, shared by the schedule
/// engine's per-schedule rate limiting and any future request-rate
/// limiting at the Control API edge.
#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Records a fire/request at `at` under `key` and returns the
    /// timestamps still inside the trailing `window_seconds` window
    /// (including the one just recorded).
    async fn record_and_window(
        &self,
        key: &str,
        at: DateTime<Utc>,
        window_seconds: u64,
    ) -> AppResult<Vec<DateTime<Utc>>>;
}
