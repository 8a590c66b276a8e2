//! Stage dispatcher: routes a claimed job to the handler registered for its
//! type and runs it under a deadline-bound, cancellable context.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use anyhow::{anyhow, Result};

use crate::config::QueueConfig;
use crate::types::{Job, JobId, JobType};

/// A billable quantity reported by a handler on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringDelta {
    /// Billing kind (`generate`, `export`, ...)
    pub kind: String,
    pub quantity: u64,
}

impl MeteringDelta {
    pub fn new(kind: impl Into<String>, quantity: u64) -> Self {
        Self {
            kind: kind.into(),
            quantity,
        }
    }
}

/// What a handler produced
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Reference to the created entity (version id, asset id, ...)
    pub output_ref: String,
    /// Billable delta, if the stage is billable
    pub metering: Option<MeteringDelta>,
}

impl HandlerOutcome {
    pub fn new(output_ref: impl Into<String>) -> Self {
        Self {
            output_ref: output_ref.into(),
            metering: None,
        }
    }

    pub fn with_metering(mut self, delta: MeteringDelta) -> Self {
        self.metering = Some(delta);
        self
    }
}

/// Execution context handed to a handler. Handlers never consult global
/// state; the deadline and cancellation travel here, and every external call
/// a handler makes must respect them.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub tenant_id: String,
    pub attempt: u32,
    /// Resolved deadline for this run
    pub timeout: Duration,
    /// Cancelled when the deadline elapses or the worker shuts down.
    /// Subprocess-backed handlers (the renderer) must terminate their
    /// children when this fires.
    pub cancellation: CancellationToken,
}

/// Per-job-type business logic, invoked by the dispatcher
#[async_trait]
pub trait Handler: Send + Sync {
    /// The job type this handler processes
    fn job_type(&self) -> JobType;

    /// Execute one attempt. Errors are classified by message downstream, so
    /// wording matters: permanent conditions must carry a configured token
    /// ("missing ...", "... not found", ...).
    async fn run(&self, ctx: &JobContext, job: &Job) -> Result<HandlerOutcome>;
}

/// Routes claimed jobs to registered handlers under a deadline
pub struct Dispatcher {
    handlers: HashMap<JobType, Arc<dyn Handler>>,
    config: QueueConfig,
}

impl Dispatcher {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register a handler for its job type; the last registration wins
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    /// Job types with a registered handler
    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }

    /// Execute the handler for `job` under its deadline.
    ///
    /// The context is cancelled when the deadline elapses or `shutdown`
    /// fires, and either path surfaces as an error for the classifier
    /// (both read as transient conditions).
    #[instrument(skip(self, job, shutdown), fields(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts))]
    pub async fn dispatch(
        &self,
        job: &Job,
        shutdown: &CancellationToken,
    ) -> Result<HandlerOutcome> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or_else(|| anyhow!("unsupported job type: {}", job.job_type))?;

        let timeout = self.config.timeout_for(job.job_type);
        let ctx = JobContext {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            attempt: job.attempts,
            timeout,
            cancellation: shutdown.child_token(),
        };

        let started = Instant::now();
        let result = tokio::select! {
            result = handler.run(&ctx, job) => result,
            _ = tokio::time::sleep(timeout) => {
                ctx.cancellation.cancel();
                warn!(elapsed = ?started.elapsed(), "job deadline elapsed");
                Err(anyhow!("job deadline elapsed after {:.1}s", timeout.as_secs_f64()))
            }
            _ = shutdown.cancelled() => {
                ctx.cancellation.cancel();
                Err(anyhow!("worker shutting down"))
            }
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "stage finished"
        );
        result
    }
}
