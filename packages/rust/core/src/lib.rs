//! Matching pipeline and the services built around it.
//!
//! [`pipeline::MatchPipeline`] turns fact statements into ranked, enriched
//! problem matches. [`search::ClientSearch`] wraps it with validation,
//! transcript normalization and optional client-fact provisioning.
//! [`ingest`] fills the problem collection and [`interview`] turns a free-form
//! voice transcript into a structured request.

pub mod enrichment;
pub mod ingest;
pub mod interview;
pub mod pipeline;
pub mod prompts;
pub mod provision;
pub mod search;

mod ids;
#[cfg(test)]
mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pitchmatch_gateways::{
    EmbeddingGateway, GenerationGateway, MistralClient, QdrantIndex, VectorIndex,
};
use pitchmatch_shared::{
    AppConfig, PipelineStep, PitchMatchError, Result, optional_api_key, require_api_key,
};

pub use enrichment::Enricher;
pub use pipeline::{MatchPipeline, MatchSettings, ProgressReporter, SilentProgress};
pub use prompts::Prompts;
pub use provision::{ProvisionReport, Provisioner};
pub use search::ClientSearch;

/// The three external collaborators, shared by every service.
#[derive(Clone)]
pub struct Gateways {
    pub embedder: Arc<dyn EmbeddingGateway>,
    pub generator: Arc<dyn GenerationGateway>,
    pub index: Arc<dyn VectorIndex>,
}

impl Gateways {
    /// Connect to Mistral and Qdrant as configured.
    ///
    /// The Mistral key is required; the index key is optional (local Qdrant).
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = config.matching.call_timeout();
        let mistral_key = require_api_key(&config.mistral.api_key_env, "Mistral")?;
        let mistral = Arc::new(
            MistralClient::new(&mistral_key, &config.mistral, timeout)?
                .with_dimensions(config.index.vector_size),
        );
        let index_key = optional_api_key(&config.index.api_key_env);
        let index = QdrantIndex::new(&config.index.url, index_key.as_deref(), timeout)?;

        Ok(Self {
            embedder: mistral.clone(),
            generator: mistral,
            index: Arc::new(index),
        })
    }
}

/// Run one gateway call under a timeout, tagging failures with `step`.
pub(crate) async fn run_step<T, F>(step: PipelineStep, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| e.at_step(step)),
        Err(_) => Err(PitchMatchError::DeadlineExceeded {
            step: Some(step),
            after: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_step_retags_upstream_errors() {
        let err = run_step(PipelineStep::Summarize, Duration::from_secs(1), async {
            Err::<(), _>(PitchMatchError::upstream(PipelineStep::Generate, "quota"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "upstream error during summarize: quota");
    }

    #[tokio::test]
    async fn run_step_times_out() {
        let err = run_step(PipelineStep::VectorSearch, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PitchMatchError::DeadlineExceeded {
                step: Some(PipelineStep::VectorSearch),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn run_step_leaves_validation_errors_alone() {
        let err = run_step(PipelineStep::Provision, Duration::from_secs(1), async {
            Err::<(), _>(PitchMatchError::validation("bad"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PitchMatchError::Validation { .. }));
    }
}
