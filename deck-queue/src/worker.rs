//! Worker loop: claim, dispatch, write back.
//!
//! Each worker process runs one `Worker` with a stable `WorkerId` and a
//! bounded pool of parallel job executions. Outcome settlement goes through
//! the classifier and the retry policy, and every write-back is optimistic:
//! a reclaimed job is never overwritten by a late worker.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classify::classify;
use crate::config::QueueConfig;
use crate::dispatch::{Dispatcher, HandlerOutcome};
use crate::retry::RetryPolicy;
use crate::store::{JobStore, MeteringEvent, MeteringStore};
use crate::types::{Job, JobStatus, JobType, WorkerId};
use crate::{QueueError, QueueResult};

/// Handle for managing a spawned worker's lifecycle
pub struct WorkerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<QueueResult<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the drain to finish
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("worker join error: {}", e)))?
    }
}

/// A claim-dispatch-settle loop over the job store
#[derive(Clone)]
pub struct Worker {
    id: WorkerId,
    store: Arc<dyn JobStore>,
    metering: Arc<dyn MeteringStore>,
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
    config: QueueConfig,
    types: Vec<JobType>,
}

impl Worker {
    /// Create a worker that processes every type the dispatcher can handle
    pub fn new(
        store: Arc<dyn JobStore>,
        metering: Arc<dyn MeteringStore>,
        dispatcher: Arc<Dispatcher>,
        config: QueueConfig,
    ) -> Self {
        let types = dispatcher.registered_types();
        Self {
            id: WorkerId::new(),
            store,
            metering,
            policy: RetryPolicy::from_config(&config),
            dispatcher,
            config,
            types,
        }
    }

    /// Restrict the worker to a subset of job types
    pub fn with_types(mut self, types: Vec<JobType>) -> Self {
        self.types = types;
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Start the loop on the runtime and return a shutdown handle
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown_tx,
            join_handle,
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) -> QueueResult<()> {
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_jobs.max(1)));
        let mut inflight: JoinSet<()> = JoinSet::new();

        info!(worker_id = %self.id, types = ?self.types, "worker started");

        loop {
            // Collect finished executions without blocking
            while inflight.try_join_next().is_some() {}

            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!(worker_id = %self.id, "worker shutdown requested");
                    break;
                }

                permit = semaphore.clone().acquire_owned() => {
                    let permit = permit
                        .map_err(|_| QueueError::Internal("worker semaphore closed".to_string()))?;

                    match self.store.claim_next_due(&self.id, &self.types, Utc::now()).await {
                        Ok(Some(job)) => {
                            let worker = self.clone();
                            let token = cancel.clone();
                            inflight.spawn(async move {
                                worker.process(job, &token).await;
                                drop(permit);
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                        Err(e) => {
                            error!(worker_id = %self.id, "claim failed: {}", e);
                            drop(permit);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        // Graceful drain: stop claiming, give in-flight jobs `drain_timeout`,
        // then cancel their contexts and wait for them to settle.
        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(worker_id = %self.id, "drain timeout; cancelling in-flight jobs");
            cancel.cancel();
            while inflight.join_next().await.is_some() {}
        }

        info!(worker_id = %self.id, "worker stopped");
        Ok(())
    }

    /// Execute one claimed job and settle its outcome
    #[instrument(skip(self, job, shutdown), fields(worker_id = %self.id, job_id = %job.id, job_type = %job.job_type))]
    async fn process(&self, mut job: Job, shutdown: &CancellationToken) {
        match self.dispatcher.dispatch(&job, shutdown).await {
            Ok(outcome) => {
                if let Err(err) = self.settle_success(&mut job, outcome).await {
                    self.settle_failure(&mut job, &format!("{:#}", err)).await;
                }
            }
            Err(err) => self.settle_failure(&mut job, &format!("{:#}", err)).await,
        }
    }

    /// Record metering (idempotently), then flip the job to done. Metering
    /// goes first; the `(tenant, kind, job)` guard absorbs the replay if the
    /// status write is lost.
    async fn settle_success(&self, job: &mut Job, outcome: HandlerOutcome) -> anyhow::Result<()> {
        if let Some(delta) = &outcome.metering {
            let event = MeteringEvent::for_job(job, delta.kind.clone(), delta.quantity);
            let inserted = self.metering.record(event).await?;
            if !inserted {
                debug!(job_id = %job.id, kind = %delta.kind, "metering already recorded for this job");
            }
        }

        job.complete(outcome.output_ref, Utc::now());
        match self.store.update(job, &self.id).await {
            Ok(()) => {
                info!(job_id = %job.id, output_ref = ?job.output_ref, attempts = job.attempts, "job done");
                Ok(())
            }
            Err(QueueError::ClaimLost(_)) => {
                warn!(job_id = %job.id, "claim lost before completion write-back; result dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Classify a failure and write the policy's disposition back
    async fn settle_failure(&self, job: &mut Job, message: &str) {
        let kind = classify(message, &self.config.permanent_error_tokens);
        let now = Utc::now();
        let disposition = self.policy.decide(job.attempts, job.max_attempts, kind, now);

        match disposition.status {
            JobStatus::Queued => {
                let next_run_at = disposition.next_run_at.unwrap_or(now);
                job.release_for_retry(next_run_at, message, now);
                warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    next_run_at = %next_run_at,
                    "attempt failed; retry scheduled: {}",
                    message
                );
            }
            _ => {
                job.dead_letter(message, disposition.error_kind, now);
                error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error_kind = %disposition.error_kind,
                    "job dead-lettered: {}",
                    message
                );
            }
        }

        match self.store.update(job, &self.id).await {
            Ok(()) => {}
            Err(QueueError::ClaimLost(_)) => {
                warn!(job_id = %job.id, "claim lost before failure write-back");
            }
            Err(e) => error!(job_id = %job.id, "failure write-back failed: {}", e),
        }
    }
}
