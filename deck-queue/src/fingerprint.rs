//! Deterministic dedup-key derivation.
//!
//! The fingerprint identifies "the work this job represents" and is the
//! uniqueness boundary for non-terminal jobs within a tenant. Tenant is never
//! part of the key itself; the store scopes uniqueness by `(tenant_id,
//! dedup_key)`.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::codec::{self, Metadata};
use crate::types::JobType;

/// Hex chars of the metadata digest kept in the key
const DIGEST_LEN: usize = 16;

/// Derive the dedup key for a job.
///
/// `render`, `export` and `thumbnail` are deterministic on `input_ref`, so
/// `type:input_ref` suffices. `generate` and `bind` depend on their metadata,
/// so the key also carries a truncated SHA-256 of the canonical encoding.
pub fn fingerprint(job_type: JobType, input_ref: &str, metadata: Option<&Metadata>) -> String {
    match job_type {
        JobType::Render | JobType::Export | JobType::Thumbnail => {
            format!("{}:{}", job_type, input_ref)
        }
        JobType::Generate | JobType::Bind => {
            format!(
                "{}:{}:{}",
                job_type,
                input_ref,
                metadata_digest(metadata)
            )
        }
    }
}

fn metadata_digest(metadata: Option<&Metadata>) -> String {
    let mut hasher = Sha256::new();
    match metadata {
        // Encoding a sorted map is canonical, so equal mappings hash equal.
        Some(map) => hasher.update(codec::encode(map).unwrap_or_default()),
        None => hasher.update(b"null"),
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(DIGEST_LEN);
    for byte in digest.iter().take(DIGEST_LEN / 2) {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}
