use super::*;

impl PostgresJobQueueRepository {
    pub(super) async fn start_impl(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
    ) -> AppResult<Job> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin start transaction: {error}"))
        })?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE id = $1 AND assigned_robot = $2 AND lease_token = $3
            FOR UPDATE
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(robot_id.as_uuid())
        .bind(lease_token)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load job for start: {error}")))?
        .ok_or_else(|| {
            AppError::LeaseLost(format!("job '{job_id}' lease is no longer held by this robot"))
        })?;

        let mut job = row.into_job()?;
        job.start(Utc::now())?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, started_at = $3
            WHERE id = $1
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.status().as_str())
        .bind(job.started_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to start job: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit start transaction: {error}"))
        })?;

        Ok(job)
    }

    pub(super) async fn complete_impl(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        result: serde_json::Value,
    ) -> AppResult<Job> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin complete transaction: {error}"))
        })?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE id = $1 AND assigned_robot = $2 AND lease_token = $3
            FOR UPDATE
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(robot_id.as_uuid())
        .bind(lease_token)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load job for completion: {error}")))?
        .ok_or_else(|| {
            AppError::LeaseLost(format!("job '{job_id}' lease is no longer held by this robot"))
        })?;

        let mut job = row.into_job()?;
        job.complete(result, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, result = $3, completed_at = $4,
                lease_token = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.status().as_str())
        .bind(job.result())
        .bind(job.completed_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to complete job: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit complete transaction: {error}"))
        })?;

        Ok(job)
    }

    pub(super) async fn fail_impl(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        error: &str,
        category: JobFailureCategory,
    ) -> AppResult<(Job, Option<DlqRow>)> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin fail transaction: {error}"))
        })?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE id = $1 AND assigned_robot = $2 AND lease_token = $3
            FOR UPDATE
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(robot_id.as_uuid())
        .bind(lease_token)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load job for failure: {error}")))?
        .ok_or_else(|| {
            AppError::LeaseLost(format!("job '{job_id}' lease is no longer held by this robot"))
        })?;

        let mut job = row.into_job()?;
        let dead_lettered = job.fail(error, category, Utc::now())?;

        if dead_lettered {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = $2, error = $3, completed_at = $4,
                    assigned_robot = NULL, lease_token = NULL, lease_expires_at = NULL
                WHERE id = $1
                "#,
            )
            .bind(job.id().as_uuid())
            .bind(job.status().as_str())
            .bind(job.error())
            .bind(job.completed_at())
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to dead-letter job: {error}")))?;

            let dlq_row = DlqRow {
                original_job_id: job.id(),
                tenant_id: job.tenant_id(),
                variables: job.variables().clone(),
                final_error: error.to_owned(),
                last_node: None,
                retry_count: job.retry_count(),
                dead_lettered_at: Utc::now(),
            };

            sqlx::query(
                r#"
                INSERT INTO job_dead_letter_queue (
                    original_job_id, tenant_id, variables, final_error,
                    last_node, retry_count, dead_lettered_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(dlq_row.original_job_id.as_uuid())
            .bind(dlq_row.tenant_id.as_uuid())
            .bind(&dlq_row.variables)
            .bind(&dlq_row.final_error)
            .bind(&dlq_row.last_node)
            .bind(i32::try_from(dlq_row.retry_count).unwrap_or(i32::MAX))
            .bind(dlq_row.dead_lettered_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to write dlq row: {error}")))?;

            transaction.commit().await.map_err(|error| {
                AppError::Internal(format!("failed to commit fail transaction: {error}"))
            })?;

            return Ok((job, Some(dlq_row)));
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, error = $3, retry_count = $4,
                assigned_robot = NULL, claimed_at = NULL, started_at = NULL,
                lease_token = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.status().as_str())
        .bind(job.error())
        .bind(i32::try_from(job.retry_count()).unwrap_or(i32::MAX))
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to requeue job: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit fail transaction: {error}"))
        })?;

        Ok((job, None))
    }

    pub(super) async fn cancel_impl(&self, job_id: JobId, reason: &str) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load job for cancel: {error}")))?
            .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

        let mut job = row.into_job()?;
        job.cancel(reason, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, error = $3, completed_at = $4,
                lease_token = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.status().as_str())
        .bind(job.error())
        .bind(job.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to cancel job: {error}")))?;

        Ok(job)
    }

    pub(super) async fn find_impl(&self, job_id: JobId) -> AppResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load job: {error}")))?;

        row.map(JobRow::into_job).transpose()
    }

    pub(super) async fn list_impl(
        &self,
        tenant_id: TenantId,
        limit: u32,
        offset: u32,
    ) -> AppResult<Vec<Job>> {
        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list jobs: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    pub(super) async fn purge_dead_letters_older_than_impl(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM job_dead_letter_queue WHERE dead_lettered_at < $1"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to purge dead letters: {error}")))?;

        Ok(result.rows_affected())
    }
}
