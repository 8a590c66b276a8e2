//! Retry/backoff policy.
//!
//! Given the attempt count and the classifier's verdict, decides whether the
//! job re-queues with a future `next_run_at` or dead-letters. The schedule is
//! exponential with jitter; the claim is the unit the budget counts, so the
//! attempt number seen here is the one stamped by `claim_next_due`.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::types::{ErrorKind, JobStatus};

/// Outcome of a failure decision
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    pub status: JobStatus,
    /// Set when `status == Queued`
    pub next_run_at: Option<DateTime<Utc>>,
    pub error_kind: ErrorKind,
}

/// Exponential backoff schedule with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    factor: f64,
    max: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base: config.backoff_base,
            factor: config.backoff_factor,
            max: config.backoff_max,
            jitter: config.backoff_jitter,
        }
    }

    /// Decide the next state after a failed attempt.
    ///
    /// Permanent errors dead-letter immediately. Transient errors re-queue
    /// while attempts remain, and dead-letter once the budget is spent.
    pub fn decide(
        &self,
        attempts: u32,
        max_attempts: u32,
        kind: ErrorKind,
        now: DateTime<Utc>,
    ) -> Disposition {
        match kind {
            ErrorKind::Permanent => Disposition {
                status: JobStatus::DeadLetter,
                next_run_at: None,
                error_kind: kind,
            },
            ErrorKind::Transient if attempts < max_attempts => {
                let delay = self.delay_for(attempts);
                Disposition {
                    status: JobStatus::Queued,
                    next_run_at: Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64)),
                    error_kind: kind,
                }
            }
            ErrorKind::Transient => Disposition {
                status: JobStatus::DeadLetter,
                next_run_at: None,
                error_kind: kind,
            },
        }
    }

    /// Backoff delay for the given (1-based) attempt number
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32) as i32;
        let raw = self.base.as_secs_f64() * self.factor.powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64((capped * (1.0 + spread)).max(0.0))
    }
}
