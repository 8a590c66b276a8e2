//! `export` stage: render plus a billable export record and a download
//! filename taken from metadata.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use deck_queue::{Handler, HandlerOutcome, Job, JobContext, JobType, MeteringDelta};

use crate::services::{Asset, AssetType, Services, MIME_PPTX};

#[derive(Debug, Deserialize)]
struct ExportInputs {
    filename: String,
}

pub struct ExportHandler {
    services: Arc<Services>,
}

impl ExportHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn blob_key(job: &Job) -> String {
        format!("exports/{}/{}.pptx", job.tenant_id, job.id)
    }
}

#[async_trait]
impl Handler for ExportHandler {
    fn job_type(&self) -> JobType {
        JobType::Export
    }

    async fn run(&self, ctx: &JobContext, job: &Job) -> Result<HandlerOutcome> {
        if let Some(existing) = &job.output_ref {
            return Ok(HandlerOutcome::new(existing.clone()));
        }

        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| anyhow!("missing export metadata"))?;
        let inputs: ExportInputs = serde_json::from_value(Value::Object(metadata.clone()))
            .map_err(|e| anyhow!("invalid input for export job: {e}"))?;

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
        self.services.blobs.upload(&key, bytes, MIME_PPTX).await?;

        let asset = match self
            .services
            .assets
            .find_by_blob_key(&job.tenant_id, &key)
            .await?
        {
            Some(existing) => existing,
            None => {
                self.services
                    .assets
                    .create(Asset::new(
                        &job.tenant_id,
                        AssetType::Pptx,
                        &key,
                        MIME_PPTX,
                        Some(inputs.filename.clone()),
                    ))
                    .await?
            }
        };

        info!(asset_id = %asset.id, filename = %inputs.filename, "exported deck");
        Ok(HandlerOutcome::new(asset.id).with_metering(MeteringDelta::new("export", 1)))
    }
}
