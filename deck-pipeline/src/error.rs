use thiserror::Error;

/// Errors from the AI spec generator.
///
/// Display wording feeds the queue's classifier: variants that should
/// dead-letter carry a configured permanent token, everything else reads as
/// transient.
#[derive(Error, Debug, Clone)]
pub enum SpecError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("generation backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the PPTX renderer subprocess
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Failed(String),

    #[error("render canceled")]
    Canceled,

    #[error("unsupported spec feature: {0}")]
    Unsupported(String),
}

/// Errors from object storage
#[derive(Error, Debug, Clone)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob i/o error: {0}")]
    Io(String),
}

/// Errors from the version and asset stores
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("storage error: {0}")]
    Backend(String),
}
