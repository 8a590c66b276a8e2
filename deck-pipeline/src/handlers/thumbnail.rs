//! `thumbnail` stage: one PNG per slide, uploaded page by page; the first
//! page's asset row is the job's output. Not billable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use deck_queue::{Handler, HandlerOutcome, Job, JobContext, JobType};

use crate::services::{Asset, AssetType, Services, MIME_PNG};

pub struct ThumbnailHandler {
    services: Arc<Services>,
}

impl ThumbnailHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn page_key(job: &Job, page: usize) -> String {
        format!("thumbs/{}/{}/p{}.png", job.tenant_id, job.id, page + 1)
    }
}

#[async_trait]
impl Handler for ThumbnailHandler {
    fn job_type(&self) -> JobType {
        JobType::Thumbnail
    }

    async fn run(&self, ctx: &JobContext, job: &Job) -> Result<HandlerOutcome> {
        if let Some(existing) = &job.output_ref {
            return Ok(HandlerOutcome::new(existing.clone()));
        }

        let version = self
            .services
            .versions
            .get_version(&job.tenant_id, &job.input_ref)
            .await?;

        let pages = self
            .services
            .renderer
            .generate_thumbnails(&ctx.cancellation, &version.spec)
            .await?;
        if pages.is_empty() {
            return Err(anyhow!("renderer produced no thumbnail pages"));
        }

        let page_count = pages.len();
        for (page, bytes) in pages.into_iter().enumerate() {
            self.services
                .blobs
                .upload(&Self::page_key(job, page), bytes, MIME_PNG)
                .await?;
        }

        let cover_key = Self::page_key(job, 0);
        let asset = match self
            .services
            .assets
            .find_by_blob_key(&job.tenant_id, &cover_key)
            .await?
        {
            Some(existing) => existing,
            None => {
                self.services
                    .assets
                    .create(Asset::new(
                        &job.tenant_id,
                        AssetType::Png,
                        &cover_key,
                        MIME_PNG,
                        None,
                    ))
                    .await?
            }
        };

        info!(asset_id = %asset.id, page_count, "generated thumbnails");
        Ok(HandlerOutcome::new(asset.id))
    }
}
