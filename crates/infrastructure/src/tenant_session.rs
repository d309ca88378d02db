//! Sets the `app.current_tenant_id` session variable the Control API's
//! row-level security policies (see `migrations/0008_row_level_security.sql`)
//! check, for the handful of tenant-scoped list/read paths that serve a
//! caller-supplied tenant id directly. Grounded on the teacher's use of a
//! dedicated transaction for multi-statement invariants in
//! `postgres_workflow_repository.rs::activate_version`, generalized here to
//! a single `set_config` statement plus the caller's own query.
//!
//! System and identity-keyed queries (`find_due`, `find_stale`,
//! `find_expired_leases`, lease renewal by lease token, etc.) do not go
//! through this helper: they are legitimately cross-tenant, or are already
//! scoped by a non-tenant identity (a robot's session token, a lease
//! token), so RLS would add nothing but an extra round trip.

use casare_core::{AppError, AppResult, TenantId};
use sqlx::{PgPool, Postgres, Transaction};

/// Begins a transaction with `app.current_tenant_id` set for its
/// duration. The caller runs its real query against the returned
/// transaction and commits it; RLS policies permit rows matching
/// `tenant_id`, deny rows belonging to a different tenant, and the
/// postgres connection reverts the setting automatically at commit or
/// rollback since it was set with `is_local = true`.
pub async fn begin_tenant_scoped(
    pool: &PgPool,
    tenant_id: TenantId,
) -> AppResult<Transaction<'static, Postgres>> {
    let mut transaction = pool.begin().await.map_err(|error| {
        AppError::Internal(format!("failed to begin tenant-scoped transaction: {error}"))
    })?;

    sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
        .bind(tenant_id.as_uuid().to_string())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to set tenant session context: {error}"))
        })?;

    Ok(transaction)
}
