//! # deck-queue: Durable Job Coordination for the Presentation Pipeline
//!
//! **Multi-tenant work queue with at-most-once-per-fingerprint semantics**
//!
//! deck-queue drives the asynchronous pipeline (spec generation, binding,
//! rendering, export, thumbnails) across a stateless producer tier and a
//! pool of worker processes backed by a relational store:
//!
//! ## 🎯 Correctness Guarantees
//!
//! - **Fingerprint Dedup**: at most one non-terminal job per
//!   `(tenant, dedup_key)`, collapsed at enqueue, never by callers
//! - **Claim Discipline**: one worker owns a running job; stale claims are
//!   reclaimed after the visibility timeout with the attempt counted
//! - **Classified Retries**: permanent errors dead-letter immediately,
//!   transient errors back off exponentially with jitter up to the budget
//! - **Metadata Fidelity**: stage inputs round-trip the JSONB column byte
//!   equivalent, with a decoder that unwraps base64-happy driver read-backs
//! - **Billable Exactly Once**: metering rides a `(tenant, kind, job)`
//!   uniqueness guard so replays never double-bill
//! - **Tenant Isolation**: every read and write is tenant-scoped in the API
//!   contract, not by manual key prefixing
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use deck_queue::prelude::*;
//! use deck_queue::store::memory::{MemoryAuditStore, MemoryJobStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> deck_queue::QueueResult<()> {
//! let store = Arc::new(MemoryJobStore::new());
//! let audit = Arc::new(MemoryAuditStore::new());
//!
//! // One config value, handed to every constructor; no globals.
//! let producer = Producer::new(store.clone(), audit, QueueConfig::default());
//!
//! let ctx = JobCtx::new("tenant_123", "user_9");
//! let outcome = producer.enqueue(&ctx, JobType::Render, "ver_42", None).await?;
//! assert!(!outcome.duplicate);
//!
//! // The job is the handle; poll it (or subscribe to producer.events()).
//! let job = producer.get(&ctx, &outcome.job.id).await?;
//! assert_eq!(job.status, JobStatus::Queued);
//! # Ok(())
//! # }
//! ```
//!
//! Workers register [`Handler`]s on a [`Dispatcher`] and run the
//! claim-dispatch-settle loop; see [`Worker`] and the `deck-pipeline` crate
//! for the presentation stages.

pub mod admin;
pub mod classify;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod producer;
pub mod retry;
pub mod store;
pub mod types;
pub mod worker;

// Core API exports
pub use admin::Admin;
pub use codec::Metadata;
pub use config::QueueConfig;
pub use dispatch::{Dispatcher, Handler, HandlerOutcome, JobContext, MeteringDelta};
pub use error::{QueueError, QueueResult};
pub use fingerprint::fingerprint;
pub use producer::Producer;
pub use retry::{Disposition, RetryPolicy};
pub use store::reaper::Reaper;
pub use store::{
    AuditRecord, AuditStore, EnqueueOutcome, JobStore, MeteringEvent, MeteringStore,
};
pub use types::{
    ActorRole, ErrorKind, Job, JobCtx, JobEvent, JobId, JobStatus, JobType, WorkerId,
};
pub use worker::{Worker, WorkerHandle};

/// Everything a pipeline crate or embedding service usually needs
pub mod prelude {
    pub use crate::{
        Admin, Dispatcher, Handler, HandlerOutcome, JobContext, MeteringDelta, Producer, Reaper,
        Worker,
    };

    pub use crate::{
        ActorRole, ErrorKind, Job, JobCtx, JobEvent, JobId, JobStatus, JobType, Metadata,
        QueueConfig, QueueError, QueueResult, WorkerId,
    };

    pub use crate::store::{AuditStore, EnqueueOutcome, JobStore, MeteringStore};

    pub use async_trait::async_trait;
}
