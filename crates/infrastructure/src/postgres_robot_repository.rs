//! PostgreSQL-backed robot registry, grounded on the teacher's
//! `postgres_workflow_repository/queue.rs` heartbeat-upsert pattern,
//! extended with capability-filtered, policy-ranked candidate selection.

use std::collections::BTreeSet;

use async_trait::async_trait;
use casare_application::{RobotRepository, SelectionPolicy};
use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use casare_domain::{Capability, Heartbeat, JobId, Robot, RobotId, RobotStatus};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for the robot registry.
#[derive(Clone)]
pub struct PostgresRobotRepository {
    pool: PgPool,
}

impl PostgresRobotRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_jobs_for(&self, robot_id: uuid::Uuid) -> AppResult<BTreeSet<JobId>> {
        let ids = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT id FROM jobs
            WHERE assigned_robot = $1 AND status IN ('claimed', 'running')
            "#,
        )
        .bind(robot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load robot's current jobs: {error}")))?;

        Ok(ids.into_iter().map(JobId::from_uuid).collect())
    }

    async fn hydrate(&self, row: RobotRow) -> AppResult<Robot> {
        let current_jobs = self.current_jobs_for(row.id).await?;
        row.into_robot(current_jobs)
    }
}

#[derive(Debug, FromRow)]
struct RobotRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    hostname: String,
    capabilities: Vec<String>,
    status: String,
    max_concurrent: i32,
    last_seen: DateTime<Utc>,
    registered_at: DateTime<Utc>,
}

impl RobotRow {
    fn into_robot(self, current_jobs: BTreeSet<JobId>) -> AppResult<Robot> {
        let capabilities = self
            .capabilities
            .iter()
            .map(|value| Capability::parse(value.as_str()))
            .collect();

        Ok(Robot::from_parts(
            RobotId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            NonEmptyString::new(self.name)?,
            NonEmptyString::new(self.hostname)?,
            capabilities,
            RobotStatus::parse(self.status.as_str())?,
            current_jobs,
            u32::try_from(self.max_concurrent)
                .map_err(|error| AppError::Internal(format!("invalid max_concurrent: {error}")))?,
            self.last_seen,
            self.registered_at,
        ))
    }
}

fn capabilities_to_storage(capabilities: &BTreeSet<Capability>) -> Vec<String> {
    capabilities.iter().map(Capability::as_storage_string).collect()
}

#[async_trait]
impl RobotRepository for PostgresRobotRepository {
    async fn register(&self, robot: Robot) -> AppResult<Robot> {
        let capability_values = capabilities_to_storage(robot.capabilities());

        sqlx::query(
            r#"
            INSERT INTO robots (
                id, tenant_id, name, hostname, capabilities, status,
                max_concurrent, last_seen, registered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(robot.id().as_uuid())
        .bind(robot.tenant_id().as_uuid())
        .bind(robot.name())
        .bind(robot.hostname())
        .bind(&capability_values)
        .bind(robot.status().as_str())
        .bind(i32::try_from(robot.max_concurrent()).unwrap_or(i32::MAX))
        .bind(robot.last_seen())
        .bind(robot.registered_at_for_storage())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to register robot: {error}")))?;

        Ok(robot)
    }

    async fn record_heartbeat(&self, heartbeat: Heartbeat) -> AppResult<()> {
        let row = sqlx::query_as::<_, RobotRow>(r#"SELECT * FROM robots WHERE id = $1"#)
            .bind(heartbeat.robot_id().as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load robot: {error}")))?
            .ok_or_else(|| {
                AppError::NotFound(format!("robot '{}' not found", heartbeat.robot_id()))
            })?;

        let mut robot = self.hydrate(row).await?;
        robot.record_heartbeat(heartbeat.timestamp());

        sqlx::query(r#"UPDATE robots SET status = $2, last_seen = $3 WHERE id = $1"#)
            .bind(robot.id().as_uuid())
            .bind(robot.status().as_str())
            .bind(robot.last_seen())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to persist heartbeat: {error}")))?;

        Ok(())
    }

    async fn deregister(&self, robot_id: RobotId, reason: &str) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin deregister transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', assigned_robot = NULL, claimed_at = NULL, started_at = NULL,
                lease_token = NULL, lease_expires_at = NULL, error = $2
            WHERE assigned_robot = $1 AND status IN ('claimed', 'running')
            "#,
        )
        .bind(robot_id.as_uuid())
        .bind(reason)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to release robot's jobs on deregister: {error}"))
        })?;

        sqlx::query(r#"DELETE FROM robots WHERE id = $1"#)
            .bind(robot_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to deregister robot: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit deregister transaction: {error}"))
        })?;

        Ok(())
    }

    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Robot>> {
        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = sqlx::query_as::<_, RobotRow>(
            r#"SELECT * FROM robots WHERE tenant_id = $1 ORDER BY name ASC"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list robots: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        let mut robots = Vec::with_capacity(rows.len());
        for row in rows {
            robots.push(self.hydrate(row).await?);
        }
        Ok(robots)
    }

    async fn find(&self, robot_id: RobotId) -> AppResult<Option<Robot>> {
        let row = sqlx::query_as::<_, RobotRow>(r#"SELECT * FROM robots WHERE id = $1"#)
            .bind(robot_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load robot: {error}")))?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn select_candidates(
        &self,
        tenant_id: TenantId,
        required_capabilities: &BTreeSet<Capability>,
        exclude: &BTreeSet<RobotId>,
        policy: SelectionPolicy,
        count: u32,
    ) -> AppResult<Vec<Robot>> {
        let required_values = capabilities_to_storage(required_capabilities);
        let exclude_values: Vec<uuid::Uuid> = exclude.iter().map(|id| id.as_uuid()).collect();

        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = match policy {
            SelectionPolicy::LeastLoaded => {
                sqlx::query_as::<_, RobotRow>(
                    r#"
                    SELECT robots.* FROM robots
                    LEFT JOIN (
                        SELECT assigned_robot, COUNT(*) AS job_count
                        FROM jobs
                        WHERE status IN ('claimed', 'running')
                        GROUP BY assigned_robot
                    ) load ON load.assigned_robot = robots.id
                    WHERE robots.tenant_id = $1
                      AND robots.status IN ('idle', 'busy')
                      AND robots.capabilities @> $2::text[]
                      AND NOT (robots.id = ANY($3))
                    ORDER BY COALESCE(load.job_count, 0) ASC, robots.last_seen ASC
                    LIMIT $4
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(&required_values)
                .bind(&exclude_values)
                .bind(i64::from(count))
                .fetch_all(&mut *transaction)
                .await
            }
            SelectionPolicy::CapabilityTightest => {
                sqlx::query_as::<_, RobotRow>(
                    r#"
                    SELECT * FROM robots
                    WHERE tenant_id = $1
                      AND status IN ('idle', 'busy')
                      AND capabilities @> $2::text[]
                      AND NOT (id = ANY($3))
                    ORDER BY cardinality(capabilities) ASC, last_seen ASC
                    LIMIT $4
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(&required_values)
                .bind(&exclude_values)
                .bind(i64::from(count))
                .fetch_all(&mut *transaction)
                .await
            }
            SelectionPolicy::Stickiness { workflow_id } => {
                sqlx::query_as::<_, RobotRow>(
                    r#"
                    SELECT robots.* FROM robots
                    LEFT JOIN LATERAL (
                        SELECT jobs.completed_at
                        FROM jobs
                        INNER JOIN workflow_versions ON workflow_versions.id = jobs.workflow_version
                        WHERE jobs.assigned_robot = robots.id
                          AND jobs.status = 'completed'
                          AND workflow_versions.workflow_id = $5
                        ORDER BY jobs.completed_at DESC
                        LIMIT 1
                    ) recent ON true
                    WHERE robots.tenant_id = $1
                      AND robots.status IN ('idle', 'busy')
                      AND robots.capabilities @> $2::text[]
                      AND NOT (robots.id = ANY($3))
                    ORDER BY recent.completed_at DESC NULLS LAST, robots.last_seen ASC
                    LIMIT $4
                    "#,
                )
                .bind(tenant_id.as_uuid())
                .bind(&required_values)
                .bind(&exclude_values)
                .bind(i64::from(count))
                .bind(workflow_id.as_uuid())
                .fetch_all(&mut *transaction)
                .await
            }
        }
        .map_err(|error| AppError::Internal(format!("failed to select robot candidates: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        let mut robots = Vec::with_capacity(rows.len());
        for row in rows {
            let robot = self.hydrate(row).await?;
            if robot.has_capacity() {
                robots.push(robot);
            }
        }
        Ok(robots)
    }

    async fn find_stale(&self, liveness_cutoff: DateTime<Utc>) -> AppResult<Vec<Robot>> {
        let rows = sqlx::query_as::<_, RobotRow>(
            r#"
            SELECT * FROM robots
            WHERE last_seen < $1 AND status != 'offline'
            "#,
        )
        .bind(liveness_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load stale robots: {error}")))?;

        let mut robots = Vec::with_capacity(rows.len());
        for row in rows {
            robots.push(self.hydrate(row).await?);
        }
        Ok(robots)
    }

    async fn mark_offline(&self, robot_id: RobotId) -> AppResult<Robot> {
        let row = sqlx::query_as::<_, RobotRow>(r#"SELECT * FROM robots WHERE id = $1"#)
            .bind(robot_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load robot: {error}")))?
            .ok_or_else(|| AppError::NotFound(format!("robot '{robot_id}' not found")))?;

        let mut robot = self.hydrate(row).await?;
        robot.mark_offline();

        sqlx::query(r#"UPDATE robots SET status = $2 WHERE id = $1"#)
            .bind(robot.id().as_uuid())
            .bind(robot.status().as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to mark robot offline: {error}")))?;

        Ok(robot)
    }

    async fn update(&self, robot: Robot) -> AppResult<Robot> {
        let affected = sqlx::query(r#"UPDATE robots SET status = $2 WHERE id = $1"#)
            .bind(robot.id().as_uuid())
            .bind(robot.status().as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update robot: {error}")))?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "robot '{}' not found",
                robot.id()
            )));
        }

        Ok(robot)
    }
}
