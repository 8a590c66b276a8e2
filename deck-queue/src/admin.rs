//! Tenant-scoped dead-letter recovery.
//!
//! The boundary enforces that the caller's role is at least admin before
//! these operations are reachable; the core only scopes by tenant. Retrying
//! a dead-lettered job never interrupts running work; it applies only to
//! rows already in `dead_letter`.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::store::{AuditRecord, AuditStore, JobStore};
use crate::types::{Job, JobCtx, JobId};
use crate::QueueResult;

/// Dead-letter queue operations
pub struct Admin {
    store: Arc<dyn JobStore>,
    audit: Arc<dyn AuditStore>,
}

impl Admin {
    pub fn new(store: Arc<dyn JobStore>, audit: Arc<dyn AuditStore>) -> Self {
        Self { store, audit }
    }

    /// All dead-lettered jobs of the caller's tenant, oldest first, with
    /// `last_error` and `error_kind` visible.
    pub async fn list_dead_letter(&self, ctx: &JobCtx) -> QueueResult<Vec<Job>> {
        self.store.list_dead_letter(&ctx.tenant_id).await
    }

    /// Reset a dead-lettered job to `queued` with a fresh attempt budget.
    /// Metadata is preserved; errors are cleared; the job is due immediately.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, job_id = %id))]
    pub async fn retry_dead_letter(&self, ctx: &JobCtx, id: &JobId) -> QueueResult<Job> {
        let job = self
            .store
            .retry_dead_letter(&ctx.tenant_id, id, Utc::now())
            .await?;

        self.audit
            .append(AuditRecord::new(ctx, "job.dead_letter_retried", id))
            .await?;

        info!(job_id = %id, "dead-lettered job re-queued");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::store::memory::{MemoryAuditStore, MemoryJobStore};
    use crate::store::JobStore;
    use crate::types::{ErrorKind, JobStatus, JobType, WorkerId};
    use serde_json::json;

    async fn dead_letter_export(store: &MemoryJobStore) -> Job {
        let mut metadata = crate::codec::Metadata::new();
        metadata.insert("filename".into(), json!("q3.pptx"));

        let job = Job::new(
            "tenant_a",
            "user_1",
            JobType::Export,
            "ver_1",
            Some(metadata),
            fingerprint(JobType::Export, "ver_1", None),
            3,
        );
        let job = store.enqueue(job).await.unwrap().job;

        let worker = WorkerId::new();
        let mut claimed = store
            .claim_next_due(&worker, JobType::all(), Utc::now())
            .await
            .unwrap()
            .unwrap();
        claimed.dead_letter("missing export metadata", ErrorKind::Permanent, Utc::now());
        store.update(&claimed, &worker).await.unwrap();
        job
    }

    #[tokio::test]
    async fn list_is_tenant_scoped() {
        let store = Arc::new(MemoryJobStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let admin = Admin::new(store.clone(), audit);
        dead_letter_export(&store).await;

        let listed = admin
            .list_dead_letter(&JobCtx::admin("tenant_a", "ops_1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].error_kind, Some(ErrorKind::Permanent));

        let other = admin
            .list_dead_letter(&JobCtx::admin("tenant_b", "ops_1"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn retry_resets_budget_and_preserves_metadata() {
        let store = Arc::new(MemoryJobStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let admin = Admin::new(store.clone(), audit.clone());
        let original = dead_letter_export(&store).await;

        let ctx = JobCtx::admin("tenant_a", "ops_1");
        let retried = admin.retry_dead_letter(&ctx, &original.id).await.unwrap();

        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.attempts, 0);
        assert!(retried.last_error.is_none());
        assert!(retried.error_kind.is_none());
        assert_eq!(retried.metadata, original.metadata);
        assert_eq!(audit.recorded().last().unwrap().action, "job.dead_letter_retried");
    }

    #[tokio::test]
    async fn retry_rejects_non_dead_letter_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let admin = Admin::new(store.clone(), audit);

        let job = Job::new(
            "tenant_a",
            "user_1",
            JobType::Render,
            "ver_1",
            None,
            fingerprint(JobType::Render, "ver_1", None),
            3,
        );
        let job = store.enqueue(job).await.unwrap().job;

        let result = admin
            .retry_dead_letter(&JobCtx::admin("tenant_a", "ops_1"), &job.id)
            .await;
        assert!(matches!(
            result,
            Err(crate::QueueError::NotDeadLettered(_))
        ));
    }
}
