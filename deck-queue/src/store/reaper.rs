//! Expired-claim sweep.
//!
//! A worker that dies without writing back leaves its job in `running`. The
//! reaper is the safety net: it periodically returns such rows to `queued`
//! (or dead-letters them once the attempt budget is spent) so another worker
//! can pick them up.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::store::JobStore;
use crate::QueueResult;

/// Background sweep over `JobStore::reclaim_expired`
pub struct Reaper {
    store: Arc<dyn JobStore>,
    interval: Duration,
    visibility_timeout: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn JobStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            interval: config.reap_interval,
            visibility_timeout: config.visibility_timeout,
        }
    }

    /// Create a reaper with a custom sweep interval
    pub fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.interval = sweep_interval;
        self
    }

    /// Run the sweep loop until the task is dropped
    pub async fn start(self) -> QueueResult<()> {
        let mut ticker = interval(self.interval);
        info!(interval = ?self.interval, "starting claim reaper");

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(0) => debug!("no expired claims"),
                Ok(swept) => info!(swept, "reclaimed expired claims"),
                Err(e) => warn!("claim sweep failed: {}", e),
            }
        }
    }

    /// Run one sweep cycle (also the test entry point)
    pub async fn run_once(&self) -> QueueResult<usize> {
        self.store
            .reclaim_expired(Utc::now(), self.visibility_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::store::memory::MemoryJobStore;
    use crate::types::{Job, JobStatus, JobType, WorkerId};

    #[tokio::test]
    async fn sweep_recovers_a_stuck_claim() {
        let store = Arc::new(MemoryJobStore::new());
        let config = QueueConfig::default();
        let worker = WorkerId::new();

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
        store
            .claim_next_due(&worker, JobType::all(), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let reaper = Reaper::new(store.clone(), &config);
        assert_eq!(reaper.run_once().await.unwrap(), 0);

        store.force_claim_expiry(&job.id, config.visibility_timeout);
        assert_eq!(reaper.run_once().await.unwrap(), 1);

        let read = store.get("tenant_a", &job.id).await.unwrap();
        assert_eq!(read.status, JobStatus::Queued);
        assert_eq!(read.attempts, 1);
    }
}
