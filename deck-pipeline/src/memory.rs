//! In-memory service implementations for development and tests, in the same
//! spirit as the queue's memory backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{BlobError, RenderError, SpecError, StoreError};
use crate::services::{
    Asset, AssetStore, BlobMeta, BlobStore, DeckSpec, GenerateRequest, GenerationOutcome,
    Renderer, SlideSpec, SpecGenerator, Template, Version, VersionStore,
};

/// Deterministic spec generator: no model behind it, just enough structure
/// for wiring and tests.
pub struct StaticSpecGenerator;

#[async_trait]
impl SpecGenerator for StaticSpecGenerator {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerationOutcome, SpecError> {
        if req.prompt.trim().is_empty() {
            return Err(SpecError::InvalidInput("empty prompt".to_string()));
        }
        let spec = DeckSpec {
            title: req.prompt.clone(),
            slides: vec![
                SlideSpec {
                    heading: "Overview".to_string(),
                    bullets: vec![req.prompt.clone()],
                },
                SlideSpec {
                    heading: "Details".to_string(),
                    bullets: Vec::new(),
                },
            ],
            language: req.language,
            rtl: req.rtl,
        };
        Ok(GenerationOutcome {
            tokens_used: (req.prompt.split_whitespace().count() as u64 + 1) * 8,
            cost: 0.0,
            model: "static-v0".to_string(),
            spec,
        })
    }

    async fn bind(&self, spec: DeckSpec, content: serde_json::Value) -> Result<GenerationOutcome, SpecError> {
        let mut bound = spec;
        if let Some(title) = content.get("title").and_then(|v| v.as_str()) {
            bound.title = title.to_string();
        }
        Ok(GenerationOutcome {
            tokens_used: 64,
            cost: 0.0,
            model: "static-v0".to_string(),
            spec: bound,
        })
    }
}

/// Renderer stand-in: emits deterministic bytes for a spec and honors
/// cancellation the way a subprocess supervisor would.
pub struct StaticRenderer {
    latency: Duration,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }

    /// Simulate render time, so deadline tests have something to cancel
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn work(&self, cancel: &CancellationToken) -> Result<(), RenderError> {
        if self.latency.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(RenderError::Canceled),
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }
}

impl Default for StaticRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render_pptx(
        &self,
        cancel: &CancellationToken,
        spec: &DeckSpec,
    ) -> Result<Bytes, RenderError> {
        self.work(cancel).await?;
        let body = serde_json::to_vec(spec)
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        let mut bytes = b"PPTX".to_vec();
        bytes.extend_from_slice(&body);
        Ok(Bytes::from(bytes))
    }

    async fn generate_thumbnails(
        &self,
        cancel: &CancellationToken,
        spec: &DeckSpec,
    ) -> Result<Vec<Bytes>, RenderError> {
        self.work(cancel).await?;
        Ok(spec
            .slides
            .iter()
            .map(|slide| Bytes::from(format!("PNG:{}", slide.heading)))
            .collect())
    }
}

/// In-memory template/version store with the monotonic version counter
pub struct MemoryVersionStore {
    inner: Mutex<VersionInner>,
}

#[derive(Default)]
struct VersionInner {
    /// (tenant_id, template_id) -> template
    templates: HashMap<(String, String), Template>,
    /// (tenant_id, version_id) -> version
    versions: HashMap<(String, String), Version>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VersionInner::default()),
        }
    }

    /// Seed a version directly (test convenience); returns its id
    pub fn seed_version(&self, tenant_id: &str, template_id: &str, spec: DeckSpec) -> String {
        let mut inner = self.inner.lock();
        Self::insert_version(&mut inner, tenant_id, template_id, spec).id
    }

    fn insert_version(
        inner: &mut VersionInner,
        tenant_id: &str,
        template_id: &str,
        spec: DeckSpec,
    ) -> Version {
        let template = inner
            .templates
            .entry((tenant_id.to_string(), template_id.to_string()))
            .or_insert_with(|| Template {
                id: template_id.to_string(),
                tenant_id: tenant_id.to_string(),
                current_version_no: 0,
            });
        template.current_version_no += 1;

        let version = Version {
            id: format!("ver_{}", Uuid::new_v4().simple()),
            tenant_id: tenant_id.to_string(),
            template_id: template_id.to_string(),
            version_no: template.current_version_no,
            spec,
            created_at: Utc::now(),
        };
        inner
            .versions
            .insert((tenant_id.to_string(), version.id.clone()), version.clone());
        version
    }
}

impl Default for MemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn create_version(
        &self,
        tenant_id: &str,
        template_id: &str,
        spec: DeckSpec,
    ) -> Result<Version, StoreError> {
        let mut inner = self.inner.lock();
        Ok(Self::insert_version(&mut inner, tenant_id, template_id, spec))
    }

    async fn get_version(&self, tenant_id: &str, version_id: &str) -> Result<Version, StoreError> {
        self.inner
            .lock()
            .versions
            .get(&(tenant_id.to_string(), version_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound(version_id.to_string()))
    }
}

/// In-memory asset rows
pub struct MemoryAssetStore {
    assets: Mutex<HashMap<(String, String), Asset>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            assets: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of every asset row (test convenience)
    pub fn all(&self) -> Vec<Asset> {
        self.assets.lock().values().cloned().collect()
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn create(&self, asset: Asset) -> Result<Asset, StoreError> {
        self.assets
            .lock()
            .insert((asset.tenant_id.clone(), asset.id.clone()), asset.clone());
        Ok(asset)
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Asset, StoreError> {
        self.assets
            .lock()
            .get(&(tenant_id.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::AssetNotFound(id.to_string()))
    }

    async fn find_by_blob_key(
        &self,
        tenant_id: &str,
        blob_key: &str,
    ) -> Result<Option<Asset>, StoreError> {
        Ok(self
            .assets
            .lock()
            .values()
            .find(|asset| asset.tenant_id == tenant_id && asset.blob_key == blob_key)
            .cloned())
    }
}

/// In-memory blob storage; re-uploading a key overwrites it
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Bytes, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Bytes, mime: &str) -> Result<BlobMeta, BlobError> {
        let size_bytes = bytes.len() as u64;
        self.blobs
            .lock()
            .insert(key.to_string(), (bytes, mime.to_string()));
        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes,
            mime: mime.to_string(),
        })
    }

    async fn get_url(&self, key: &str, expiry: Duration) -> Result<String, BlobError> {
        if !self.blobs.lock().contains_key(key) {
            return Err(BlobError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{}?expires_in={}s", key, expiry.as_secs()))
    }

    async fn download(&self, key: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
