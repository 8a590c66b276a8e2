//! `generate` stage: prompt in, new template version out.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use deck_queue::{Handler, HandlerOutcome, Job, JobContext, JobType, MeteringDelta};

use crate::services::{GenerateRequest, Services};

#[derive(Debug, Deserialize)]
struct GenerateInputs {
    prompt: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    rtl: bool,
    #[serde(default)]
    brand_kit_id: Option<String>,
    #[serde(default)]
    content_data: Option<Value>,
}

impl From<GenerateInputs> for GenerateRequest {
    fn from(inputs: GenerateInputs) -> Self {
        Self {
            prompt: inputs.prompt,
            language: inputs.language,
            tone: inputs.tone,
            rtl: inputs.rtl,
            brand_kit_id: inputs.brand_kit_id,
            content_data: inputs.content_data,
        }
    }
}

pub struct GenerateHandler {
    services: Arc<Services>,
}

impl GenerateHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for GenerateHandler {
    fn job_type(&self) -> JobType {
        JobType::Generate
    }

    async fn run(&self, _ctx: &JobContext, job: &Job) -> Result<HandlerOutcome> {
        if let Some(existing) = &job.output_ref {
            return Ok(HandlerOutcome::new(existing.clone()));
        }

        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| anyhow!("missing generate metadata"))?;
        let inputs: GenerateInputs = serde_json::from_value(Value::Object(metadata.clone()))
            .map_err(|e| anyhow!("invalid input for generate job: {e}"))?;

        let outcome = self.services.generator.generate(inputs.into()).await?;
        let tokens_used = outcome.tokens_used;

        // input_ref is the template whose spec is being (re)generated
        let version = self
            .services
            .versions
            .create_version(&job.tenant_id, &job.input_ref, outcome.spec)
            .await?;

        info!(
            version_id = %version.id,
            version_no = version.version_no,
            model = %outcome.model,
            tokens_used,
            "generated new template version"
        );
        Ok(HandlerOutcome::new(version.id)
            .with_metering(MeteringDelta::new("generate", tokens_used)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryAssetStore, MemoryBlobStore, MemoryVersionStore, StaticRenderer,
        StaticSpecGenerator,
    };
    use deck_queue::{fingerprint, Metadata};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn services() -> Arc<Services> {
        Arc::new(Services::new(
            Arc::new(StaticSpecGenerator),
            Arc::new(StaticRenderer::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryVersionStore::new()),
            Arc::new(MemoryAssetStore::new()),
        ))
    }

    fn ctx(job: &Job) -> JobContext {
        JobContext {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            attempt: 1,
            timeout: Duration::from_secs(120),
            cancellation: CancellationToken::new(),
        }
    }

    fn generate_job(metadata: Option<Metadata>) -> Job {
        Job::new(
            "tenant_a",
            "user_1",
            JobType::Generate,
            "tpl_1",
            metadata.clone(),
            fingerprint(JobType::Generate, "tpl_1", metadata.as_ref()),
            3,
        )
    }

    #[tokio::test]
    async fn generates_a_version_and_meters_tokens() {
        let services = services();
        let handler = GenerateHandler::new(services.clone());

        let mut metadata = Metadata::new();
        metadata.insert("prompt".into(), json!("three slide city guide"));
        metadata.insert("language".into(), json!("en"));
        let job = generate_job(Some(metadata));

        let outcome = handler.run(&ctx(&job), &job).await.unwrap();
        let delta = outcome.metering.unwrap();
        assert_eq!(delta.kind, "generate");
        assert!(delta.quantity > 0);

        let version = services
            .versions
            .get_version("tenant_a", &outcome.output_ref)
            .await
            .unwrap();
        assert_eq!(version.template_id, "tpl_1");
        assert_eq!(version.spec.title, "three slide city guide");
    }

    #[tokio::test]
    async fn missing_metadata_is_permanent_wording() {
        let handler = GenerateHandler::new(services());
        let job = generate_job(None);

        let err = handler.run(&ctx(&job), &job).await.unwrap_err();
        assert_eq!(err.to_string(), "missing generate metadata");
    }

    #[tokio::test]
    async fn malformed_metadata_reads_as_invalid_input() {
        let handler = GenerateHandler::new(services());
        let mut metadata = Metadata::new();
        metadata.insert("prompt".into(), json!(["not", "a", "string"]));
        let job = generate_job(Some(metadata));

        let err = handler.run(&ctx(&job), &job).await.unwrap_err();
        assert!(err.to_string().contains("invalid input"));
    }
}
