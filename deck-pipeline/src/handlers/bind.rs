//! `bind` stage: rework a source version's spec around caller content and
//! persist it as a new deck version.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use deck_queue::{Handler, HandlerOutcome, Job, JobContext, JobType, MeteringDelta};

use crate::services::Services;

#[derive(Debug, Deserialize)]
struct BindInputs {
    source_version_id: String,
    content: Value,
    deck_id: String,
}

pub struct BindHandler {
    services: Arc<Services>,
}

impl BindHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for BindHandler {
    fn job_type(&self) -> JobType {
        JobType::Bind
    }

    async fn run(&self, _ctx: &JobContext, job: &Job) -> Result<HandlerOutcome> {
        if let Some(existing) = &job.output_ref {
            return Ok(HandlerOutcome::new(existing.clone()));
        }

        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| anyhow!("missing bind metadata"))?;
        let inputs: BindInputs = serde_json::from_value(Value::Object(metadata.clone()))
            .map_err(|e| anyhow!("invalid input for bind job: {e}"))?;

        let source = self
            .services
            .versions
            .get_version(&job.tenant_id, &inputs.source_version_id)
            .await?;

        // An AI failure falls back to the unmodified source spec and still
        // succeeds, with nothing metered.
        let (spec, tokens_used) = match self
            .services
            .generator
            .bind(source.spec.clone(), inputs.content)
            .await
        {
            Ok(outcome) => (outcome.spec, outcome.tokens_used),
            Err(err) => {
                warn!(
                    source_version_id = %source.id,
                    "binding failed, falling back to source spec: {err}"
                );
                (source.spec, 0)
            }
        };

        let version = self
            .services
            .versions
            .create_version(&job.tenant_id, &inputs.deck_id, spec)
            .await?;

        info!(
            version_id = %version.id,
            deck_id = %inputs.deck_id,
            tokens_used,
            "bound content into new deck version"
        );
        Ok(HandlerOutcome::new(version.id).with_metering(MeteringDelta::new("bind", tokens_used)))
    }
}
