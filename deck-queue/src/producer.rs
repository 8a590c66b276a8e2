//! Producer surface: transactional job creation with duplicate collapse.
//!
//! Callers never observe a job's output synchronously; the returned job is
//! the handle, polled via `get`.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::codec::Metadata;
use crate::config::QueueConfig;
use crate::fingerprint::fingerprint;
use crate::store::{AuditRecord, AuditStore, EnqueueOutcome, JobStore};
use crate::types::{Job, JobCtx, JobId, JobType};
use crate::QueueResult;

/// Creates jobs on behalf of `(tenant, actor)` callers
pub struct Producer {
    store: Arc<dyn JobStore>,
    audit: Arc<dyn AuditStore>,
    config: QueueConfig,
}

impl Producer {
    pub fn new(store: Arc<dyn JobStore>, audit: Arc<dyn AuditStore>, config: QueueConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Enqueue a job, collapsing onto an existing non-terminal duplicate.
    ///
    /// The dedup key is derived from `(type, input_ref)` and, for the
    /// metadata-dependent stages, the normalized metadata; the store scopes
    /// it by tenant. An audit record is appended either way.
    #[instrument(skip(self, ctx, metadata), fields(tenant_id = %ctx.tenant_id, job_type = %job_type))]
    pub async fn enqueue(
        &self,
        ctx: &JobCtx,
        job_type: JobType,
        input_ref: impl Into<String> + std::fmt::Debug,
        metadata: Option<Metadata>,
    ) -> QueueResult<EnqueueOutcome> {
        let input_ref = input_ref.into();
        let dedup_key = fingerprint(job_type, &input_ref, metadata.as_ref());

        let job = Job::new(
            &ctx.tenant_id,
            &ctx.actor_id,
            job_type,
            input_ref,
            metadata,
            dedup_key,
            self.config.max_attempts,
        );

        let outcome = self.store.enqueue(job).await?;

        let action = if outcome.duplicate {
            "job.deduplicated"
        } else {
            "job.enqueued"
        };
        self.audit
            .append(AuditRecord::new(ctx, action, &outcome.job.id))
            .await?;

        info!(
            job_id = %outcome.job.id,
            duplicate = outcome.duplicate,
            "enqueued {} job",
            job_type
        );
        Ok(outcome)
    }

    /// Poll a job's current state
    pub async fn get(&self, ctx: &JobCtx, id: &JobId) -> QueueResult<Job> {
        self.store.get(&ctx.tenant_id, id).await
    }

    /// Lifecycle events, for callers that subscribe instead of polling
    pub fn events(&self) -> crate::store::BoxStream<crate::types::JobEvent> {
        self.store.event_stream()
    }
}
