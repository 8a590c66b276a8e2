use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{JobId, WorkerId};
use crate::codec::Metadata;

/// Upper bound on a stored error message, in bytes. Longer messages are
/// truncated with an ellipsis before they reach the row.
pub const MAX_ERROR_BYTES: usize = 4096;

/// The closed set of pipeline stages the queue coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// AI spec generation for a template
    Generate,
    /// Bind content into an existing spec
    Bind,
    /// PPTX render of a version
    Render,
    /// PPTX render plus billable export record
    Export,
    /// Slide thumbnail generation
    Thumbnail,
}

impl JobType {
    /// All job types, in dispatch order
    pub fn all() -> &'static [JobType] {
        &[
            Self::Generate,
            Self::Bind,
            Self::Render,
            Self::Export,
            Self::Thumbnail,
        ]
    }

    /// Wire name of the job type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Bind => "bind",
            Self::Render => "render",
            Self::Export => "export",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Self::Generate),
            "bind" => Ok(Self::Bind),
            "render" => Ok(Self::Render),
            "export" => Ok(Self::Export),
            "thumbnail" => Ok(Self::Thumbnail),
            _ => Err(format!("unknown job type: {}", s)),
        }
    }
}

/// Job status lifecycle.
///
/// `queued -> running -> {done, queued (retry), failed, dead_letter}`.
/// `done` and `dead_letter` are terminal. Transient retries re-enter `queued`
/// with a future `next_run_at`; `failed` is part of the wire-visible set and
/// round-trips through the store, but no core transition currently writes it
/// (a due `failed` row is claimable exactly like a due `queued` row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    DeadLetter,
}

impl JobStatus {
    /// Terminal states are immutable except for admin dead-letter retry
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::DeadLetter)
    }

    /// States a worker may claim from, subject to `next_run_at`
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Queued | Self::Failed)
    }

    /// Wire name of the status
    pub fn name(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classification of the last recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Dead-letter immediately, no retry
    Permanent,
    /// Retry with backoff while attempts remain
    Transient,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => write!(f, "permanent"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// The unit of deferred work.
///
/// Owned by its tenant for its whole lifetime; claimed by exactly one worker
/// at a time. `metadata` is round-tripped through the metadata codec and is
/// observationally identical at producer and handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: String,
    /// Actor that requested the work (audit and metering attribution)
    pub actor_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Opaque reference to the subject entity (template id, version id, ...)
    pub input_ref: String,
    /// Set only when `status == Done`
    pub output_ref: Option<String>,
    /// Stage input mapping; `None` is distinct from `Some(empty)`
    pub metadata: Option<Metadata>,
    /// Fingerprint; unique among non-terminal jobs of the same tenant
    pub dedup_key: String,
    /// Number of claims so far; advanced by the store at claim time
    pub attempts: u32,
    pub max_attempts: u32,
    /// Last recorded error, bounded to `MAX_ERROR_BYTES`
    pub last_error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Earliest time a worker may claim this job
    pub next_run_at: DateTime<Utc>,
    /// Set iff `status == Running`
    pub claimed_by: Option<WorkerId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh queued job, due immediately
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        job_type: JobType,
        input_ref: impl Into<String>,
        metadata: Option<Metadata>,
        dedup_key: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            job_type,
            status: JobStatus::Queued,
            input_ref: input_ref.into(),
            output_ref: None,
            metadata,
            dedup_key: dedup_key.into(),
            attempts: 0,
            max_attempts,
            last_error: None,
            error_kind: None,
            next_run_at: now,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a worker may claim this job at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.next_run_at <= now
    }

    /// Whether a running claim has outlived the visibility timeout
    pub fn claim_expired(&self, now: DateTime<Utc>, visibility_timeout: Duration) -> bool {
        match (self.status, self.claimed_at) {
            (JobStatus::Running, Some(claimed_at)) => {
                claimed_at + chrono::Duration::milliseconds(visibility_timeout.as_millis() as i64)
                    < now
            }
            _ => false,
        }
    }

    /// Transition into `Running` under a worker's claim. Advances `attempts`:
    /// the claim is the unit the retry budget counts.
    pub fn begin_claim(&mut self, worker_id: &WorkerId, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempts += 1;
        self.claimed_by = Some(worker_id.clone());
        self.claimed_at = Some(now);
        self.updated_at = now;
    }

    /// Transition into `Done` with the handler's output reference
    pub fn complete(&mut self, output_ref: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Done;
        self.output_ref = Some(output_ref.into());
        self.release_claim(now);
    }

    /// Return to `Queued` for a later retry after a transient failure
    pub fn release_for_retry(&mut self, next_run_at: DateTime<Utc>, error: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.next_run_at = next_run_at;
        self.set_error(error, ErrorKind::Transient, now);
        self.release_claim(now);
    }

    /// Transition into the terminal `DeadLetter` state
    pub fn dead_letter(&mut self, error: &str, kind: ErrorKind, now: DateTime<Utc>) {
        self.status = JobStatus::DeadLetter;
        self.set_error(error, kind, now);
        self.release_claim(now);
    }

    /// Admin recovery: back to `Queued`, attempts reset, errors cleared,
    /// metadata preserved.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.attempts = 0;
        self.last_error = None;
        self.error_kind = None;
        self.output_ref = None;
        self.next_run_at = now;
        self.release_claim(now);
    }

    /// Record a bounded error message and its classification
    pub fn set_error(&mut self, error: &str, kind: ErrorKind, now: DateTime<Utc>) {
        self.last_error = Some(bound_error(error));
        self.error_kind = Some(kind);
        self.updated_at = now;
    }

    fn release_claim(&mut self, now: DateTime<Utc>) {
        self.claimed_by = None;
        self.claimed_at = None;
        self.updated_at = now;
    }
}

/// Truncate an error message to `MAX_ERROR_BYTES`, appending an ellipsis.
/// Cuts on a char boundary so the stored value stays valid UTF-8.
pub fn bound_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_BYTES {
        return error.to_string();
    }
    let mut cut = MAX_ERROR_BYTES - '…'.len_utf8();
    while !error.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &error[..cut])
}
