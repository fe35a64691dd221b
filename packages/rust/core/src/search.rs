//! Client search: the single entry point used by both binaries.

use tracing::{info, instrument};

use pitchmatch_shared::{AppConfig, ClientSearchRequest, EnrichedResult, PitchMatchError, Result};
use pitchmatch_transcript::{NormalizeOptions, normalize};

use crate::pipeline::{MatchPipeline, ProgressReporter};
use crate::provision::Provisioner;
use crate::Gateways;

/// Trimmed product name, or a validation error when it is blank.
///
/// Callers that talk to a gateway before searching (interview structuring)
/// check this first.
pub fn validate_product_name(product_name: &str) -> Result<&str> {
    let trimmed = product_name.trim();
    if trimmed.is_empty() {
        return Err(PitchMatchError::validation("productName is required"));
    }
    Ok(trimmed)
}

/// Validate → normalize → (optionally) provision → match.
#[derive(Clone)]
pub struct ClientSearch {
    pipeline: MatchPipeline,
    provisioner: Provisioner,
    normalize: NormalizeOptions,
    result_limit: usize,
    persist: bool,
}

impl ClientSearch {
    pub fn new(gateways: Gateways, config: &AppConfig) -> Self {
        Self {
            pipeline: MatchPipeline::new(gateways.clone(), config),
            provisioner: Provisioner::new(gateways, config),
            normalize: NormalizeOptions::from(&config.matching),
            result_limit: config.matching.result_limit,
            persist: config.matching.persist_client_facts,
        }
    }

    /// Override whether client facts are written to a per-product collection.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Override the number of matches requested.
    pub fn with_result_limit(mut self, result_limit: usize) -> Self {
        self.result_limit = result_limit;
        self
    }

    /// Run one client search request end to end.
    ///
    /// Validation problems fail before any gateway is called. Provisioning
    /// and matching share the configured deadline.
    #[instrument(skip_all, fields(product = %request.product_name, persist = self.persist))]
    pub async fn search(
        &self,
        request: &ClientSearchRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<EnrichedResult>> {
        let product_name = validate_product_name(&request.product_name)?;

        progress.phase("Normalizing transcript");
        let facts = normalize(
            &request.conversation_transcript,
            request.conversation_problem_hint.as_deref(),
            request.conversation_solution_hint.as_deref(),
            request.pdf_slides_text.as_deref(),
            &self.normalize,
        )?;
        info!(facts = facts.len(), "transcript normalized");

        // One deadline covers provisioning and the match together.
        let deadline = self.pipeline.settings().deadline;
        let work = async {
            if self.persist {
                progress.phase("Provisioning client collection");
                self.provisioner
                    .provision_client_collection(product_name, &facts)
                    .await?;
            }
            self.pipeline
                .run(product_name, &facts, self.result_limit, progress)
                .await
        };

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(PitchMatchError::DeadlineExceeded {
                step: None,
                after: deadline,
            }),
        }
    }
}
