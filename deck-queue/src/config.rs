use std::collections::HashMap;
use std::time::Duration;

use crate::types::JobType;

/// Configuration for the queue core.
///
/// A single value of this type is handed to the producer, worker, reaper and
/// dispatcher constructors. The core never reads process environment; the
/// embedding application decides how the value is assembled.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent jobs per worker process
    pub max_parallel_jobs: usize,
    /// Per-job deadline
    pub job_timeout: Duration,
    /// Per-type deadline overrides (render usually gets more headroom)
    pub timeout_overrides: HashMap<JobType, Duration>,
    /// How long a claim is honored before the job becomes reclaimable
    pub visibility_timeout: Duration,
    /// Transient retry budget
    pub max_attempts: u32,
    /// Base retry backoff duration
    pub backoff_base: Duration,
    /// Exponential backoff growth factor
    pub backoff_factor: f64,
    /// Maximum retry backoff duration
    pub backoff_max: Duration,
    /// Jitter applied to each backoff delay (0.2 = ±20 %)
    pub backoff_jitter: f64,
    /// Graceful shutdown wait for in-flight jobs
    pub drain_timeout: Duration,
    /// Idle sleep between empty claim attempts
    pub poll_interval: Duration,
    /// Interval between expired-claim sweeps
    pub reap_interval: Duration,
    /// Tokens that classify a handler error as permanent (word-boundary match)
    pub permanent_error_tokens: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let job_timeout = Duration::from_secs(120);
        Self {
            max_parallel_jobs: 4,
            job_timeout,
            timeout_overrides: HashMap::new(),
            visibility_timeout: job_timeout * 5,
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_factor: 2.0,
            backoff_max: Duration::from_secs(60),
            backoff_jitter: 0.2,
            drain_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            reap_interval: Duration::from_secs(30),
            permanent_error_tokens: Self::default_permanent_tokens(),
        }
    }
}

impl QueueConfig {
    /// The default permanent-classification token set
    pub fn default_permanent_tokens() -> Vec<String> {
        [
            "missing",
            "not found",
            "forbidden",
            "invalid input",
            "unsupported",
            "quota exceeded",
            "validation",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    /// Set the per-job deadline; the visibility timeout follows at 5x unless
    /// overridden afterwards.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self.visibility_timeout = timeout * 5;
        self
    }

    /// Override the deadline for one job type
    pub fn with_timeout_override(mut self, job_type: JobType, timeout: Duration) -> Self {
        self.timeout_overrides.insert(job_type, timeout);
        self
    }

    /// Set the stuck-claim reclaim window
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set the transient retry budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the per-worker concurrency bound
    pub fn with_max_parallel_jobs(mut self, max_parallel_jobs: usize) -> Self {
        self.max_parallel_jobs = max_parallel_jobs;
        self
    }

    /// Resolve the deadline for a job type
    pub fn timeout_for(&self, job_type: JobType) -> Duration {
        self.timeout_overrides
            .get(&job_type)
            .copied()
            .unwrap_or(self.job_timeout)
    }
}
