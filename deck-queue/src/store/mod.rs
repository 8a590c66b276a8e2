pub mod memory;
pub mod reaper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{Job, JobCtx, JobEvent, JobId, JobType, WorkerId};
use crate::QueueResult;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Result of an enqueue: either a freshly inserted job or the existing
/// non-terminal job that carries the same `(tenant, dedup_key)`.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub job: Job,
    pub duplicate: bool,
}

/// Durable job storage contract.
///
/// A SQL-backed implementation maps `claim_next_due` onto
/// `SELECT ... FOR UPDATE SKIP LOCKED` over the `(tenant_id, status,
/// next_run_at)` index, and `enqueue` onto an insert guarded by the partial
/// unique index on `(tenant_id, dedup_key) WHERE status NOT IN ('done',
/// 'dead_letter')`. The in-memory backend mirrors those semantics.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically insert a fully populated job, or surface the existing
    /// non-terminal duplicate instead of erroring.
    async fn enqueue(&self, job: Job) -> QueueResult<EnqueueOutcome>;

    /// Select and lock one due row (`status` claimable, `next_run_at <= now`,
    /// type allowed), transition it to `running`, stamp `claimed_by` /
    /// `claimed_at`, advance `attempts`, and return it.
    async fn claim_next_due(
        &self,
        worker_id: &WorkerId,
        types: &[JobType],
        now: DateTime<Utc>,
    ) -> QueueResult<Option<Job>>;

    /// Write back a mutated job. Fails with `ClaimLost` unless the stored row
    /// is still claimed by `claimant` (optimistic check on `claimed_by`).
    /// Metadata is serialized through the metadata codec.
    async fn update(&self, job: &Job, claimant: &WorkerId) -> QueueResult<()>;

    /// Tenant-scoped lookup
    async fn get(&self, tenant_id: &str, id: &JobId) -> QueueResult<Job>;

    /// All dead-lettered jobs of a tenant, oldest first
    async fn list_dead_letter(&self, tenant_id: &str) -> QueueResult<Vec<Job>>;

    /// Reset a dead-lettered job to `queued` with `attempts = 0`, errors
    /// cleared and metadata preserved; due immediately.
    async fn retry_dead_letter(&self, tenant_id: &str, id: &JobId, now: DateTime<Utc>)
        -> QueueResult<Job>;

    /// Return rows whose claim outlived `visibility_timeout` to `queued`
    /// (dead-lettering those that already spent their attempt budget) and
    /// record the synthesized `"claim expired"` transient failure. Returns
    /// the number of rows swept.
    async fn reclaim_expired(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
    ) -> QueueResult<usize>;

    /// Lifecycle event stream for observability
    fn event_stream(&self) -> BoxStream<JobEvent>;
}

/// A billable record, emitted exactly once per successful `done` transition
/// of a billable job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringEvent {
    pub id: String,
    pub tenant_id: String,
    pub actor_id: String,
    /// Billing kind (`generate`, `export`, ...)
    pub kind: String,
    pub quantity: u64,
    /// The job whose completion is billed; part of the uniqueness guard
    pub job_id: JobId,
    pub at: DateTime<Utc>,
}

impl MeteringEvent {
    pub fn for_job(job: &Job, kind: impl Into<String>, quantity: u64) -> Self {
        Self {
            id: format!("met_{}", Uuid::new_v4().simple()),
            tenant_id: job.tenant_id.clone(),
            actor_id: job.actor_id.clone(),
            kind: kind.into(),
            quantity,
            job_id: job.id.clone(),
            at: Utc::now(),
        }
    }
}

/// Billable-event sink with an idempotency guard on
/// `(tenant_id, kind, job_id)`.
#[async_trait]
pub trait MeteringStore: Send + Sync {
    /// Insert-if-absent. Returns `false` when an event for the same
    /// `(tenant, kind, job)` was already recorded; that is not an error.
    async fn record(&self, event: MeteringEvent) -> QueueResult<bool>;
}

/// An audit trail entry written by the producer and admin surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub tenant_id: String,
    pub actor_id: String,
    /// Dotted action name (`job.enqueued`, `job.deduplicated`, ...)
    pub action: String,
    pub job_id: JobId,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(ctx: &JobCtx, action: impl Into<String>, job_id: &JobId) -> Self {
        Self {
            id: format!("aud_{}", Uuid::new_v4().simple()),
            tenant_id: ctx.tenant_id.clone(),
            actor_id: ctx.actor_id.clone(),
            action: action.into(),
            job_id: job_id.clone(),
            at: Utc::now(),
        }
    }
}

/// Append-only audit sink
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> QueueResult<()>;
}
