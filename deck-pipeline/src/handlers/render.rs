//! `render` stage: version spec in, PPTX asset out.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use deck_queue::{Handler, HandlerOutcome, Job, JobContext, JobType};

use crate::services::{Asset, AssetType, Services, MIME_PPTX};

pub struct RenderHandler {
    services: Arc<Services>,
}

impl RenderHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Blob key derived from the job, so a retried attempt overwrites its own
    /// partial upload instead of orphaning a new object.
    fn blob_key(job: &Job) -> String {
        format!("decks/{}/{}.pptx", job.tenant_id, job.id)
    }
}

#[async_trait]
impl Handler for RenderHandler {
    fn job_type(&self) -> JobType {
        JobType::Render
    }

    async fn run(&self, ctx: &JobContext, job: &Job) -> Result<HandlerOutcome> {
        if let Some(existing) = &job.output_ref {
            return Ok(HandlerOutcome::new(existing.clone()));
        }

        // input_ref is the version to render; no metadata required
        let version = self
            .services
            .versions
            .get_version(&job.tenant_id, &job.input_ref)
            .await?;

        let bytes = self
            .services
            .renderer
            .render_pptx(&ctx.cancellation, &version.spec)
            .await?;

        let key = Self::blob_key(job);
        let meta = self.services.blobs.upload(&key, bytes, MIME_PPTX).await?;

        // The asset row exists only once per successful blob
        if let Some(existing) = self
            .services
            .assets
            .find_by_blob_key(&job.tenant_id, &key)
            .await?
        {
            return Ok(HandlerOutcome::new(existing.id));
        }

        let asset = self
            .services
            .assets
            .create(Asset::new(
                &job.tenant_id,
                AssetType::Pptx,
                &key,
                MIME_PPTX,
                None,
            ))
            .await?;

        info!(asset_id = %asset.id, blob_key = %key, size_bytes = meta.size_bytes, "rendered deck");
        Ok(HandlerOutcome::new(asset.id))
    }
}
