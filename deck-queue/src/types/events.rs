use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorKind, JobId, JobType, WorkerId};

/// Minimal stable event protocol for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job row was created (or re-queued by admin retry)
    Enqueued {
        job_id: JobId,
        tenant_id: String,
        job_type: JobType,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker
    Claimed {
        job_id: JobId,
        worker_id: WorkerId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Transient failure; job re-queued for a later attempt
    Retrying {
        job_id: JobId,
        next_run_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job completed with an output reference
    Done {
        job_id: JobId,
        output_ref: String,
        at: DateTime<Utc>,
    },

    /// Job reached the terminal dead-letter state
    DeadLettered {
        job_id: JobId,
        error: String,
        error_kind: ErrorKind,
        at: DateTime<Utc>,
    },

    /// Expired claim was swept and the job made claimable again
    Reclaimed {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Claimed { .. } => "claimed",
            Self::Retrying { .. } => "retrying",
            Self::Done { .. } => "done",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Reclaimed { .. } => "reclaimed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. } => job_id,
            Self::Claimed { job_id, .. } => job_id,
            Self::Retrying { job_id, .. } => job_id,
            Self::Done { job_id, .. } => job_id,
            Self::DeadLettered { job_id, .. } => job_id,
            Self::Reclaimed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. } => at,
            Self::Claimed { at, .. } => at,
            Self::Retrying { at, .. } => at,
            Self::Done { at, .. } => at,
            Self::DeadLettered { at, .. } => at,
            Self::Reclaimed { at, .. } => at,
        }
    }
}
