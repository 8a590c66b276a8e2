//! Store-level conformance for the in-memory backend: the claim, dedup,
//! retry, reclaim and metadata guarantees every `JobStore` implementation
//! must uphold.

use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tokio_stream::StreamExt;

use deck_queue::classify::classify;
use deck_queue::store::memory::MemoryJobStore;
use deck_queue::store::JobStore;
use deck_queue::{
    fingerprint, ErrorKind, Job, JobEvent, JobStatus, JobType, Metadata, QueueConfig, QueueError,
    RetryPolicy, WorkerId,
};

fn job_with_metadata(job_type: JobType, input_ref: &str, metadata: Option<Metadata>) -> Job {
    Job::new(
        "tenant_a",
        "user_1",
        job_type,
        input_ref,
        metadata.clone(),
        fingerprint(job_type, input_ref, metadata.as_ref()),
        3,
    )
}

fn render_job(input_ref: &str) -> Job {
    job_with_metadata(JobType::Render, input_ref, None)
}

fn sample_metadata() -> Metadata {
    let mut map = Metadata::new();
    map.insert("prompt".into(), json!("city guide deck"));
    map.insert("language".into(), json!("en"));
    map.insert("rtl".into(), json!(false));
    map.insert("sections".into(), json!(["cover", "map", "food"]));
    map
}

async fn next_event(stream: &mut deck_queue::store::BoxStream<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("timeout waiting for event")
        .expect("event stream ended")
}

/// A1. Claim stamps ownership atomically
#[tokio::test]
async fn claim_stamps_ownership() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let job = store.enqueue(render_job("ver_1")).await.unwrap().job;

    let claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.claimed_by, Some(worker.clone()));
    assert!(claimed.claimed_at.is_some());
    assert_eq!(claimed.attempts, 1);

    // Nothing else is claimable while the job runs
    let second = store
        .claim_next_due(&WorkerId::new(), JobType::all(), Utc::now())
        .await
        .unwrap();
    assert!(second.is_none());
}

/// A2. Only the claim holder can write back
#[tokio::test]
async fn write_back_requires_the_claim() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    store.enqueue(render_job("ver_1")).await.unwrap();

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    claimed.complete("asset_1", Utc::now());

    let stranger = WorkerId::new();
    assert!(matches!(
        store.update(&claimed, &stranger).await,
        Err(QueueError::ClaimLost(_))
    ));
    store.update(&claimed, &worker).await.unwrap();
}

/// A3. Completion is at most once: a second write-back loses
#[tokio::test]
async fn completion_is_at_most_once() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    store.enqueue(render_job("ver_1")).await.unwrap();

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    claimed.complete("asset_1", Utc::now());
    store.update(&claimed, &worker).await.unwrap();

    // The stored row released its claim; the same worker cannot settle twice
    assert!(matches!(
        store.update(&claimed, &worker).await,
        Err(QueueError::ClaimLost(_))
    ));
}

/// B1. At most one active job per (tenant, fingerprint)
#[tokio::test]
async fn dedup_collapses_active_duplicates() {
    let store = MemoryJobStore::new();

    let first = store.enqueue(render_job("ver_1")).await.unwrap();
    let second = store.enqueue(render_job("ver_1")).await.unwrap();
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.job.id, second.job.id);

    // Scope isolation: tenant, type and input all split the key space
    let mut other_tenant = render_job("ver_1");
    other_tenant.tenant_id = "tenant_b".into();
    assert!(!store.enqueue(other_tenant).await.unwrap().duplicate);
    assert!(!store
        .enqueue(job_with_metadata(JobType::Thumbnail, "ver_1", None))
        .await
        .unwrap()
        .duplicate);
    assert!(!store.enqueue(render_job("ver_2")).await.unwrap().duplicate);
}

/// B2. A terminal job frees the fingerprint for new work
#[tokio::test]
async fn terminal_jobs_release_the_fingerprint() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let first = store.enqueue(render_job("ver_1")).await.unwrap().job;

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    claimed.complete("asset_1", Utc::now());
    store.update(&claimed, &worker).await.unwrap();

    let again = store.enqueue(render_job("ver_1")).await.unwrap();
    assert!(!again.duplicate);
    assert_ne!(again.job.id, first.id);
}

/// C1. A scheduled retry is not claimable before its due time
#[tokio::test]
async fn retry_respects_next_run_at() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let job = store.enqueue(render_job("ver_1")).await.unwrap().job;

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    let due = Utc::now() + chrono::Duration::seconds(60);
    claimed.release_for_retry(due, "connection reset", Utc::now());
    store.update(&claimed, &worker).await.unwrap();

    assert!(store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .is_none());

    store.force_due(&job.id);
    let reclaimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempts, 2);
}

/// D1. Metadata round-trips byte-equivalent, under both read shapes
#[tokio::test]
async fn metadata_round_trip_is_byte_equivalent() {
    for base64_readback in [false, true] {
        let store = if base64_readback {
            MemoryJobStore::new().with_base64_readback()
        } else {
            MemoryJobStore::new()
        };
        let metadata = sample_metadata();
        let job = job_with_metadata(JobType::Generate, "tpl_1", Some(metadata.clone()));
        let id = store.enqueue(job).await.unwrap().job.id;

        let observed = store
            .claim_next_due(&WorkerId::new(), JobType::all(), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.id, id);
        assert_eq!(
            observed.metadata,
            Some(metadata),
            "base64_readback={base64_readback}"
        );
    }
}

/// D2. Missing metadata stays missing; empty stays empty
#[tokio::test]
async fn null_metadata_is_distinct_from_empty() {
    let store = MemoryJobStore::new().with_base64_readback();

    let none = job_with_metadata(JobType::Render, "ver_1", None);
    let none_id = store.enqueue(none).await.unwrap().job.id;

    let empty = job_with_metadata(JobType::Generate, "tpl_1", Some(Metadata::new()));
    let empty_id = store.enqueue(empty).await.unwrap().job.id;

    assert_eq!(store.get("tenant_a", &none_id).await.unwrap().metadata, None);
    assert_eq!(
        store.get("tenant_a", &empty_id).await.unwrap().metadata,
        Some(Metadata::new())
    );
}

/// E1. A transiently failing job is claimed at most max_attempts times
#[tokio::test]
async fn transient_retry_budget_is_bounded() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let config = QueueConfig::default();
    let policy = RetryPolicy::from_config(&config);
    let job = store.enqueue(render_job("ver_1")).await.unwrap().job;

    let mut claims = 0;
    loop {
        store.force_due(&job.id);
        let Some(mut claimed) = store
            .claim_next_due(&worker, JobType::all(), Utc::now())
            .await
            .unwrap()
        else {
            break;
        };
        claims += 1;

        let message = "connection reset by peer";
        let kind = classify(message, &config.permanent_error_tokens);
        assert_eq!(kind, ErrorKind::Transient);
        let now = Utc::now();
        let disposition = policy.decide(claimed.attempts, claimed.max_attempts, kind, now);
        match disposition.status {
            JobStatus::Queued => {
                claimed.release_for_retry(disposition.next_run_at.unwrap(), message, now)
            }
            _ => claimed.dead_letter(message, kind, now),
        }
        store.update(&claimed, &worker).await.unwrap();
    }

    assert_eq!(claims, 3);
    let dead = store.get("tenant_a", &job.id).await.unwrap();
    assert_eq!(dead.status, JobStatus::DeadLetter);
    assert_eq!(dead.attempts, 3);
    assert_eq!(dead.error_kind, Some(ErrorKind::Transient));
}

/// E2. A permanent first failure is claimed exactly once
#[tokio::test]
async fn permanent_failure_never_retries() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let config = QueueConfig::default();
    let policy = RetryPolicy::from_config(&config);
    let job = store
        .enqueue(job_with_metadata(JobType::Export, "ver_1", None))
        .await
        .unwrap()
        .job;

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();

    // Unambiguous word-boundary hit on the "missing" token
    let message = "missing export metadata";
    let kind = classify(message, &config.permanent_error_tokens);
    assert_eq!(kind, ErrorKind::Permanent);
    let disposition = policy.decide(claimed.attempts, claimed.max_attempts, kind, Utc::now());
    assert_eq!(disposition.status, JobStatus::DeadLetter);
    claimed.dead_letter(message, kind, Utc::now());
    store.update(&claimed, &worker).await.unwrap();

    store.force_due(&job.id);
    assert!(store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .is_none());

    let dead = store.get("tenant_a", &job.id).await.unwrap();
    assert_eq!(dead.attempts, 1);
    assert_eq!(dead.error_kind, Some(ErrorKind::Permanent));
}

/// F1. A crashed claim is reclaimable with attempts advanced by one
#[tokio::test]
async fn crash_advances_attempts_by_exactly_one() {
    let store = MemoryJobStore::new();
    let config = QueueConfig::default();
    let job = store.enqueue(render_job("ver_1")).await.unwrap().job;

    let before = store.get("tenant_a", &job.id).await.unwrap().attempts;
    store
        .claim_next_due(&WorkerId::new(), JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();

    // The worker dies here; nothing is written back
    store.force_claim_expiry(&job.id, config.visibility_timeout);
    let swept = store
        .reclaim_expired(Utc::now(), config.visibility_timeout)
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let reclaimed = store.get("tenant_a", &job.id).await.unwrap();
    assert_eq!(reclaimed.status, JobStatus::Queued);
    assert_eq!(reclaimed.attempts, before + 1);
    assert_eq!(reclaimed.last_error.as_deref(), Some("claim expired"));
    assert_eq!(reclaimed.error_kind, Some(ErrorKind::Transient));

    // And another worker can finish the job
    let second = store
        .claim_next_due(&WorkerId::new(), JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, job.id);
    assert_eq!(second.attempts, before + 2);
}

/// G1. Admin retry resets the budget and preserves metadata
#[tokio::test]
async fn dead_letter_retry_preserves_metadata() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let metadata = sample_metadata();
    let job = store
        .enqueue(job_with_metadata(JobType::Bind, "ver_1", Some(metadata.clone())))
        .await
        .unwrap()
        .job;

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    claimed.dead_letter("spec failed validation", ErrorKind::Permanent, Utc::now());
    store.update(&claimed, &worker).await.unwrap();

    let listed = store.list_dead_letter("tenant_a").await.unwrap();
    assert_eq!(listed.len(), 1);

    let retried = store
        .retry_dead_letter("tenant_a", &job.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(retried.status, JobStatus::Queued);
    assert_eq!(retried.attempts, 0);
    assert!(retried.last_error.is_none());
    assert_eq!(retried.metadata, Some(metadata));

    // Back under the dedup umbrella: the same work collapses again
    let duplicate = store
        .enqueue(job_with_metadata(JobType::Bind, "ver_1", retried.metadata.clone()))
        .await
        .unwrap();
    assert!(duplicate.duplicate);
    assert_eq!(duplicate.job.id, job.id);
}

/// H1. Lifecycle events are observable in order
#[tokio::test]
async fn lifecycle_events_flow() {
    let store = MemoryJobStore::new();
    let worker = WorkerId::new();
    let mut events = store.event_stream();

    let job = store.enqueue(render_job("ver_1")).await.unwrap().job;
    assert!(matches!(
        next_event(&mut events).await,
        JobEvent::Enqueued { job_id, .. } if job_id == job.id
    ));

    let mut claimed = store
        .claim_next_due(&worker, JobType::all(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        JobEvent::Claimed { job_id, attempt: 1, .. } if job_id == job.id
    ));

    claimed.complete("asset_1", Utc::now());
    store.update(&claimed, &worker).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        JobEvent::Done { job_id, output_ref, .. } if job_id == job.id && output_ref == "asset_1"
    ));
}
