//! External service contracts the pipeline stages are written against.
//!
//! Concrete implementations (AI orchestrator, renderer binary, S3-compatible
//! storage, SQL stores) live outside this crate; the in-memory versions in
//! [`crate::memory`] cover development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{BlobError, RenderError, SpecError, StoreError};

pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_PNG: &str = "image/png";

/// One slide of a deck spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideSpec {
    pub heading: String,
    #[serde(default)]
    pub bullets: Vec<String>,
}

/// The renderable description of a presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSpec {
    pub title: String,
    #[serde(default)]
    pub slides: Vec<SlideSpec>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub rtl: bool,
}

/// Input to a spec generation call
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub language: Option<String>,
    pub tone: Option<String>,
    pub rtl: bool,
    pub brand_kit_id: Option<String>,
    pub content_data: Option<Value>,
}

/// What a generation or binding call produced
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub spec: DeckSpec,
    pub tokens_used: u64,
    pub cost: f64,
    pub model: String,
}

/// AI orchestrator contract
#[async_trait]
pub trait SpecGenerator: Send + Sync {
    /// Produce a fresh deck spec from a prompt
    async fn generate(&self, req: GenerateRequest) -> Result<GenerationOutcome, SpecError>;

    /// Rework an existing spec around caller-supplied content
    async fn bind(&self, spec: DeckSpec, content: Value) -> Result<GenerationOutcome, SpecError>;
}

/// Renderer subprocess contract. Implementations must observe `cancel` and
/// terminate any child process when it fires.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render_pptx(
        &self,
        cancel: &CancellationToken,
        spec: &DeckSpec,
    ) -> Result<Bytes, RenderError>;

    /// One PNG per slide
    async fn generate_thumbnails(
        &self,
        cancel: &CancellationToken,
        spec: &DeckSpec,
    ) -> Result<Vec<Bytes>, RenderError>;
}

/// Metadata of an uploaded blob
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub key: String,
    pub size_bytes: u64,
    pub mime: String,
}

/// Object storage contract. Keys are chosen by callers so parallel writers
/// never collide; re-uploading a key overwrites it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Bytes, mime: &str) -> Result<BlobMeta, BlobError>;

    /// Signed or relative URL; consumers handle both
    async fn get_url(&self, key: &str, expiry: Duration) -> Result<String, BlobError>;

    async fn download(&self, key: &str) -> Result<Bytes, BlobError>;
}

/// A template owns its versions; the current pointer is a plain column, not a
/// back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub tenant_id: String,
    pub current_version_no: u64,
}

/// An immutable spec snapshot, keyed by a monotonically increasing number
/// within its template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub tenant_id: String,
    pub template_id: String,
    pub version_no: u64,
    pub spec: DeckSpec,
    pub created_at: DateTime<Utc>,
}

/// Version storage contract
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Append a new version to a template and advance its current pointer
    async fn create_version(
        &self,
        tenant_id: &str,
        template_id: &str,
        spec: DeckSpec,
    ) -> Result<Version, StoreError>;

    /// Tenant-scoped lookup by version id
    async fn get_version(&self, tenant_id: &str, version_id: &str) -> Result<Version, StoreError>;
}

/// Kind of a stored asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Pptx,
    Png,
    Generic,
}

/// A rendered artifact: created only after its blob upload succeeded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub tenant_id: String,
    pub asset_type: AssetType,
    pub blob_key: String,
    pub mime: String,
    /// Download filename hint, when the caller provided one
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        tenant_id: impl Into<String>,
        asset_type: AssetType,
        blob_key: impl Into<String>,
        mime: impl Into<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            id: format!("ast_{}", Uuid::new_v4().simple()),
            tenant_id: tenant_id.into(),
            asset_type,
            blob_key: blob_key.into(),
            mime: mime.into(),
            filename,
            created_at: Utc::now(),
        }
    }
}

/// Asset storage contract
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create(&self, asset: Asset) -> Result<Asset, StoreError>;

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Asset, StoreError>;

    /// Idempotent re-run guard: blob keys are derived from the job, so an
    /// existing row for the key means the asset was already created.
    async fn find_by_blob_key(
        &self,
        tenant_id: &str,
        blob_key: &str,
    ) -> Result<Option<Asset>, StoreError>;
}

/// The bundle of contracts handed to every stage handler
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<dyn SpecGenerator>,
    pub renderer: Arc<dyn Renderer>,
    pub blobs: Arc<dyn BlobStore>,
    pub versions: Arc<dyn VersionStore>,
    pub assets: Arc<dyn AssetStore>,
}

impl Services {
    pub fn new(
        generator: Arc<dyn SpecGenerator>,
        renderer: Arc<dyn Renderer>,
        blobs: Arc<dyn BlobStore>,
        versions: Arc<dyn VersionStore>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            generator,
            renderer,
            blobs,
            versions,
            assets,
        }
    }
}
