//! In-memory store backends for development and tests.
//!
//! `MemoryJobStore` mirrors the semantics a SQL backend gets from row locks
//! and the partial unique dedup index, including the JSONB metadata
//! round-trip: metadata is held as the codec's encoded bytes, never as the
//! live mapping, so every read exercises the decode path. The
//! `base64_readback` knob simulates the driver stack that hands byte-array
//! columns back as base64 strings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::codec;
use crate::store::{
    AuditRecord, AuditStore, BoxStream, EnqueueOutcome, JobStore, MeteringEvent, MeteringStore,
};
use crate::types::{Job, JobEvent, JobId, JobStatus, JobType, WorkerId};
use crate::{QueueError, QueueResult};

/// A row at rest: the job with its metadata replaced by the codec's bytes
#[derive(Debug, Clone)]
struct StoredJob {
    row: Job,
    raw_metadata: Option<Vec<u8>>,
}

#[derive(Default)]
struct Inner {
    /// Job rows indexed by id
    rows: HashMap<JobId, StoredJob>,
    /// Active-job dedup index: (tenant_id, dedup_key) -> job id
    dedup: HashMap<(String, String), JobId>,
}

/// In-memory job store with SQL-equivalent claim and dedup semantics
pub struct MemoryJobStore {
    inner: Arc<RwLock<Inner>>,
    events: broadcast::Sender<JobEvent>,
    base64_readback: bool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            events,
            base64_readback: false,
        }
    }

    /// Simulate a driver stack that returns metadata columns as
    /// base64-encoded strings on read.
    pub fn with_base64_readback(mut self) -> Self {
        self.base64_readback = true;
        self
    }

    fn materialize(&self, stored: &StoredJob) -> QueueResult<Job> {
        let mut job = stored.row.clone();
        job.metadata = match &stored.raw_metadata {
            None => None,
            Some(raw) => {
                let raw = if self.base64_readback {
                    serde_json::to_vec(&serde_json::Value::String(BASE64.encode(raw)))?
                } else {
                    raw.clone()
                };
                Some(codec::decode(&raw)?)
            }
        };
        Ok(job)
    }

    fn store_row(inner: &mut Inner, job: &Job) -> QueueResult<()> {
        let raw_metadata = job.metadata.as_ref().map(codec::encode).transpose()?;
        let mut row = job.clone();
        row.metadata = None;
        inner.rows.insert(job.id.clone(), StoredJob { row, raw_metadata });
        Ok(())
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    /// Force a running claim past the visibility window (test helper)
    pub fn force_claim_expiry(&self, job_id: &JobId, visibility_timeout: Duration) {
        let mut inner = self.inner.write();
        if let Some(stored) = inner.rows.get_mut(job_id) {
            if let Some(claimed_at) = stored.row.claimed_at {
                let window = chrono::Duration::milliseconds(visibility_timeout.as_millis() as i64);
                stored.row.claimed_at = Some(claimed_at - window - chrono::Duration::seconds(1));
            }
        }
    }

    /// Make a queued retry due immediately (test helper)
    pub fn force_due(&self, job_id: &JobId) {
        let mut inner = self.inner.write();
        if let Some(stored) = inner.rows.get_mut(job_id) {
            stored.row.next_run_at = Utc::now();
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: Job) -> QueueResult<EnqueueOutcome> {
        // Check-and-insert under one lock, like the partial unique index
        // resolves the collision inside the insert statement.
        let existing = {
            let mut inner = self.inner.write();
            let scope = (job.tenant_id.clone(), job.dedup_key.clone());

            let mut active = None;
            if let Some(active_id) = inner.dedup.get(&scope).cloned() {
                match inner.rows.get(&active_id).cloned() {
                    Some(stored) if !stored.row.is_terminal() => active = Some(stored),
                    // Stale index entry from a terminal row: replaceable
                    _ => {
                        inner.dedup.remove(&scope);
                    }
                }
            }

            if active.is_none() {
                Self::store_row(&mut inner, &job)?;
                inner.dedup.insert(scope, job.id.clone());
            }
            active
        };

        if let Some(stored) = existing {
            let job = self.materialize(&stored)?;
            tracing::debug!(job_id = %job.id, dedup_key = %job.dedup_key, "enqueue collapsed onto active duplicate");
            return Ok(EnqueueOutcome { job, duplicate: true });
        }

        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            at: Utc::now(),
        });
        Ok(EnqueueOutcome { job, duplicate: false })
    }

    async fn claim_next_due(
        &self,
        worker_id: &WorkerId,
        types: &[JobType],
        now: DateTime<Utc>,
    ) -> QueueResult<Option<Job>> {
        let claimed = {
            let mut inner = self.inner.write();

            // FIFO over due rows: oldest (next_run_at, created_at) first,
            // id as the final tiebreak for determinism.
            let candidate = inner
                .rows
                .values()
                .filter(|stored| types.contains(&stored.row.job_type) && stored.row.is_due(now))
                .min_by(|a, b| {
                    (a.row.next_run_at, a.row.created_at, a.row.id.as_str())
                        .cmp(&(b.row.next_run_at, b.row.created_at, b.row.id.as_str()))
                })
                .map(|stored| stored.row.id.clone());

            match candidate {
                Some(id) => {
                    let stored = inner
                        .rows
                        .get_mut(&id)
                        .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
                    stored.row.begin_claim(worker_id, now);
                    Some(stored.clone())
                }
                None => None,
            }
        };

        match claimed {
            Some(stored) => {
                self.emit(JobEvent::Claimed {
                    job_id: stored.row.id.clone(),
                    worker_id: worker_id.clone(),
                    attempt: stored.row.attempts,
                    at: now,
                });
                Ok(Some(self.materialize(&stored)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, job: &Job, claimant: &WorkerId) -> QueueResult<()> {
        {
            let mut inner = self.inner.write();
            let stored = inner
                .rows
                .get(&job.id)
                .ok_or_else(|| QueueError::JobNotFound(job.id.to_string()))?;

            // Optimistic check: the row must still be ours. A reclaim (or a
            // reclaim followed by another worker's claim) invalidates the
            // write-back.
            if stored.row.claimed_by.as_ref() != Some(claimant) {
                return Err(QueueError::ClaimLost(job.id.to_string()));
            }

            Self::store_row(&mut inner, job)?;
            if job.is_terminal() {
                let scope = (job.tenant_id.clone(), job.dedup_key.clone());
                if inner.dedup.get(&scope) == Some(&job.id) {
                    inner.dedup.remove(&scope);
                }
            }
        }

        let at = Utc::now();
        match job.status {
            JobStatus::Done => self.emit(JobEvent::Done {
                job_id: job.id.clone(),
                output_ref: job.output_ref.clone().unwrap_or_default(),
                at,
            }),
            JobStatus::Queued => self.emit(JobEvent::Retrying {
                job_id: job.id.clone(),
                next_run_at: job.next_run_at,
                error: job.last_error.clone().unwrap_or_default(),
                at,
            }),
            JobStatus::DeadLetter => self.emit(JobEvent::DeadLettered {
                job_id: job.id.clone(),
                error: job.last_error.clone().unwrap_or_default(),
                error_kind: job.error_kind.unwrap_or(crate::types::ErrorKind::Transient),
                at,
            }),
            _ => {}
        }
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: &JobId) -> QueueResult<Job> {
        let stored = {
            let inner = self.inner.read();
            inner
                .rows
                .get(id)
                .filter(|stored| stored.row.tenant_id == tenant_id)
                .cloned()
                .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?
        };
        self.materialize(&stored)
    }

    async fn list_dead_letter(&self, tenant_id: &str) -> QueueResult<Vec<Job>> {
        let stored: Vec<StoredJob> = {
            let inner = self.inner.read();
            let mut rows: Vec<StoredJob> = inner
                .rows
                .values()
                .filter(|stored| {
                    stored.row.tenant_id == tenant_id
                        && stored.row.status == JobStatus::DeadLetter
                })
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.row.created_at.cmp(&b.row.created_at));
            rows
        };
        stored.iter().map(|s| self.materialize(s)).collect()
    }

    async fn retry_dead_letter(
        &self,
        tenant_id: &str,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> QueueResult<Job> {
        let stored = {
            let mut inner = self.inner.write();
            let stored = inner
                .rows
                .get(id)
                .filter(|stored| stored.row.tenant_id == tenant_id)
                .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

            if stored.row.status != JobStatus::DeadLetter {
                return Err(QueueError::NotDeadLettered(id.to_string()));
            }

            // The job becomes non-terminal again; the dedup slot must be free.
            let scope = (stored.row.tenant_id.clone(), stored.row.dedup_key.clone());
            if let Some(active_id) = inner.dedup.get(&scope) {
                if active_id != id {
                    return Err(QueueError::ActiveDuplicate(stored.row.dedup_key.clone()));
                }
            }

            let stored = inner
                .rows
                .get_mut(id)
                .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
            stored.row.reset_for_retry(now);
            let snapshot = stored.clone();
            inner.dedup.insert(scope, id.clone());
            snapshot
        };

        self.emit(JobEvent::Enqueued {
            job_id: stored.row.id.clone(),
            tenant_id: stored.row.tenant_id.clone(),
            job_type: stored.row.job_type,
            at: now,
        });
        self.materialize(&stored)
    }

    async fn reclaim_expired(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
    ) -> QueueResult<usize> {
        let mut reclaimed = Vec::new();
        let mut dead_lettered = Vec::new();
        {
            let mut inner = self.inner.write();
            let expired: Vec<JobId> = inner
                .rows
                .values()
                .filter(|stored| stored.row.claim_expired(now, visibility_timeout))
                .map(|stored| stored.row.id.clone())
                .collect();

            for id in expired {
                let Some(stored) = inner.rows.get_mut(&id) else {
                    continue;
                };
                // The claim already advanced `attempts`; a crashed attempt is
                // a spent attempt, not a free one.
                if stored.row.attempts >= stored.row.max_attempts {
                    stored
                        .row
                        .dead_letter("claim expired", crate::types::ErrorKind::Transient, now);
                    let scope = (stored.row.tenant_id.clone(), stored.row.dedup_key.clone());
                    dead_lettered.push((id.clone(), stored.row.last_error.clone()));
                    if inner.dedup.get(&scope) == Some(&id) {
                        inner.dedup.remove(&scope);
                    }
                } else {
                    stored.row.release_for_retry(now, "claim expired", now);
                    reclaimed.push(id.clone());
                }
            }
        }

        let swept = reclaimed.len() + dead_lettered.len();
        for id in reclaimed {
            tracing::warn!(job_id = %id, "reclaimed expired claim");
            self.emit(JobEvent::Reclaimed { job_id: id, at: now });
        }
        for (id, error) in dead_lettered {
            tracing::warn!(job_id = %id, "expired claim exhausted attempt budget");
            self.emit(JobEvent::DeadLettered {
                job_id: id,
                error: error.unwrap_or_default(),
                error_kind: crate::types::ErrorKind::Transient,
                at: now,
            });
        }
        Ok(swept)
    }

    fn event_stream(&self) -> BoxStream<JobEvent> {
        let receiver = self.events.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}

/// In-memory metering sink with the `(tenant, kind, job)` uniqueness guard
pub struct MemoryMeteringStore {
    events: Mutex<Vec<MeteringEvent>>,
}

impl MemoryMeteringStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything recorded so far
    pub fn recorded(&self) -> Vec<MeteringEvent> {
        self.events.lock().clone()
    }
}

impl Default for MemoryMeteringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeteringStore for MemoryMeteringStore {
    async fn record(&self, event: MeteringEvent) -> QueueResult<bool> {
        let mut events = self.events.lock();
        let duplicate = events.iter().any(|e| {
            e.tenant_id == event.tenant_id && e.kind == event.kind && e.job_id == event.job_id
        });
        if duplicate {
            return Ok(false);
        }
        events.push(event);
        Ok(true)
    }
}

/// Append-only in-memory audit sink
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> QueueResult<()> {
        self.records.lock().push(record);
        Ok(())
    }
}
