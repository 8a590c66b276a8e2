use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Optimistic write-back failed: the row is no longer claimed by the
    /// worker that is trying to settle it (reclaimed and handed elsewhere).
    #[error("claim lost for job {0}")]
    ClaimLost(String),

    #[error("job {0} is already in a terminal state")]
    JobAlreadyTerminal(String),

    #[error("job {0} is not dead-lettered")]
    NotDeadLettered(String),

    /// A non-terminal job with the same `(tenant, dedup_key)` already exists.
    #[error("active duplicate exists for dedup key {0}")]
    ActiveDuplicate(String),

    #[error("metadata codec error: {0}")]
    MetadataCodec(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::MetadataCodec(err.to_string())
    }
}
