use super::*;

impl PostgresJobQueueRepository {
    pub(super) async fn enqueue_impl(&self, input: EnqueueJobInput) -> AppResult<Job> {
        let mut job = Job::new(
            input.tenant_id,
            input.workflow_version,
            input.priority,
            input.variables,
            input.trigger_type,
            input.max_retries,
            input.scheduled_time,
            Utc::now(),
        )?;
        job.enqueue()?;

        let required_capabilities = capabilities_to_storage(&input.required_capabilities);

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tenant_id, workflow_version, priority, variables, trigger_type,
                status, created_at, retry_count, max_retries, scheduled_time,
                required_capabilities
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.tenant_id().as_uuid())
        .bind(job.workflow_version().as_uuid())
        .bind(i16::from(job.priority().as_u8()))
        .bind(job.variables())
        .bind(job.trigger_type().as_str())
        .bind(job.status().as_str())
        .bind(job.created_at())
        .bind(i32::try_from(job.retry_count()).unwrap_or(0))
        .bind(i32::try_from(job.max_retries()).unwrap_or(i32::MAX))
        .bind(job.scheduled_time())
        .bind(&required_capabilities)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to enqueue job: {error}")))?;

        Ok(job)
    }

    pub(super) async fn claim_impl(
        &self,
        robot_id: RobotId,
        robot_capabilities: &BTreeSet<Capability>,
        max_n: u32,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedJob>> {
        if max_n == 0 {
            return Err(AppError::Validation(
                "claim max_n must be greater than zero".to_owned(),
            ));
        }

        let capability_values = capabilities_to_storage(robot_capabilities);

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin claim transaction: {error}"))
        })?;

        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM jobs
                WHERE status = 'queued'
                  AND scheduled_time <= now()
                  AND required_capabilities <@ $1::text[]
                ORDER BY priority DESC, scheduled_time ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            ),
            leased AS (
                UPDATE jobs
                SET status = 'claimed',
                    assigned_robot = $3,
                    claimed_at = now(),
                    lease_token = gen_random_uuid()::text,
                    lease_expires_at = now() + make_interval(secs => $4::int)
                FROM candidate_jobs
                WHERE jobs.id = candidate_jobs.id
                RETURNING jobs.*
            )
            SELECT * FROM leased
            "#,
        )
        .bind(&capability_values)
        .bind(i64::from(max_n))
        .bind(robot_id.as_uuid())
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid lease_seconds: {error}"))
        })?)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to claim jobs: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit claim transaction: {error}"))
        })?;

        rows.into_iter().map(ClaimedJobRow::into_claimed_job).collect()
    }

    pub(super) async fn heartbeat_claim_impl(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        lease_seconds: u32,
    ) -> AppResult<DateTime<Utc>> {
        let new_expiry = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE jobs
            SET lease_expires_at = now() + make_interval(secs => $4::int)
            WHERE id = $1 AND assigned_robot = $2 AND lease_token = $3
              AND status IN ('claimed', 'running')
            RETURNING lease_expires_at
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(robot_id.as_uuid())
        .bind(lease_token)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid lease_seconds: {error}"))
        })?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to renew job lease: {error}")))?;

        new_expiry.ok_or_else(|| {
            AppError::LeaseLost(format!("job '{job_id}' lease is no longer held by this robot"))
        })
    }

    pub(super) async fn find_expired_leases_impl(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ClaimedJob>> {
        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('claimed', 'running')
              AND lease_expires_at IS NOT NULL
              AND lease_expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load expired leases: {error}")))?;

        rows.into_iter().map(ClaimedJobRow::into_claimed_job).collect()
    }

    pub(super) async fn reclaim_impl(&self, job_id: JobId) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load job: {error}")))?
            .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

        let mut job = row.into_job()?;
        job.reclaim()?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, assigned_robot = NULL, claimed_at = NULL, started_at = NULL,
                lease_token = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job.id().as_uuid())
        .bind(job.status().as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to reclaim job: {error}")))?;

        Ok(job)
    }
}
