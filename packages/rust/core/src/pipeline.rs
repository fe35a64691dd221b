//! Matching pipeline: facts → summary → search query → embedding → search → enrichment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use pitchmatch_gateways::ScoredPoint;
use pitchmatch_shared::{
    AppConfig, EnrichedResult, FactStatement, MatchCandidate, PipelineStep, PitchMatchError,
    ProblemRecord, Result,
};

use crate::enrichment::Enricher;
use crate::prompts::Prompts;
use crate::{Gateways, run_step};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time one candidate finishes enrichment (in completion order).
    fn candidate_enriched(&self, _current: usize, _total: usize) {}
    /// Called after each ingestion batch is written.
    fn batch_written(&self, _current: usize, _total: usize) {}
    /// Called when a match completes.
    fn done(&self, _results: &[EnrichedResult]) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
}

/// Knobs of a [`MatchPipeline`] run.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Collection holding the collected problem records.
    pub problem_collection: String,
    /// Timeout applied to every gateway call.
    pub call_timeout: Duration,
    /// Budget for one whole `run`.
    pub deadline: Duration,
    /// Concurrent enrichment tasks; `None` means one per candidate.
    pub enrich_concurrency: Option<usize>,
}

impl MatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            problem_collection: config.index.problem_collection.clone(),
            call_timeout: config.matching.call_timeout(),
            deadline: config.matching.deadline(),
            enrich_concurrency: config.matching.enrich_concurrency,
        }
    }
}

/// A search hit after payload validation.
enum Ranked {
    Candidate(MatchCandidate),
    /// Payload failed validation; reported as-is, never enriched.
    Malformed(EnrichedResult),
}

/// The core orchestrator.
///
/// Steps run strictly in sequence; only per-candidate enrichment fans out.
#[derive(Clone)]
pub struct MatchPipeline {
    gateways: Gateways,
    prompts: Arc<Prompts>,
    enricher: Enricher,
    settings: MatchSettings,
}

impl MatchPipeline {
    pub fn new(gateways: Gateways, config: &AppConfig) -> Self {
        Self::with_settings(
            gateways,
            Prompts::new(config.prompts.clone()),
            MatchSettings::from_config(config),
        )
    }

    pub fn with_settings(gateways: Gateways, prompts: Prompts, settings: MatchSettings) -> Self {
        let prompts = Arc::new(prompts);
        let enricher = Enricher::new(
            Arc::clone(&gateways.generator),
            Arc::clone(&prompts),
            settings.call_timeout,
        );
        Self {
            gateways,
            prompts,
            enricher,
            settings,
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Match `facts` against the problem collection.
    ///
    /// Returns at most `result_limit` results, ranked by descending similarity.
    /// Failures before enrichment abort the run; enrichment failures only
    /// degrade the affected candidate. The whole run is bounded by the
    /// configured deadline.
    #[instrument(skip_all, fields(product = product_name, facts = facts.len(), result_limit = result_limit))]
    pub async fn run(
        &self,
        product_name: &str,
        facts: &[FactStatement],
        result_limit: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<EnrichedResult>> {
        if facts.is_empty() {
            return Err(PitchMatchError::validation("no fact statements to match"));
        }
        if result_limit == 0 {
            return Err(PitchMatchError::validation("result limit must be at least 1"));
        }

        let deadline = self.settings.deadline;
        match tokio::time::timeout(deadline, self.run_steps(product_name, facts, result_limit, progress))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PitchMatchError::DeadlineExceeded {
                step: None,
                after: deadline,
            }),
        }
    }

    async fn run_steps(
        &self,
        product_name: &str,
        facts: &[FactStatement],
        result_limit: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<EnrichedResult>> {
        let start = Instant::now();
        let timeout = self.settings.call_timeout;

        // --- Step 1-2: Project summary ---
        progress.phase("Summarizing project");
        let description = facts
            .iter()
            .map(FactStatement::text)
            .collect::<Vec<_>>()
            .join("\n");
        let summary = run_step(
            PipelineStep::Summarize,
            timeout,
            self.gateways
                .generator
                .generate(&self.prompts.summary(product_name, &description)),
        )
        .await?;

        // --- Step 3: Search query ---
        progress.phase("Writing search query");
        let query = run_step(
            PipelineStep::SearchQuery,
            timeout,
            self.gateways
                .generator
                .generate(&self.prompts.search_query(&summary)),
        )
        .await?;

        // --- Step 4: Query vector ---
        progress.phase("Embedding search query");
        let vector = run_step(
            PipelineStep::EmbedQuery,
            timeout,
            self.gateways.embedder.embed(&query),
        )
        .await?;

        // --- Step 5: Nearest neighbors ---
        progress.phase("Searching problem collection");
        let hits = run_step(
            PipelineStep::VectorSearch,
            timeout,
            self.gateways
                .index
                .search(&self.settings.problem_collection, &vector, result_limit),
        )
        .await?;
        let ranked = rank(hits, result_limit);

        // --- Step 6: Enrichment ---
        progress.phase("Enriching matches");
        let results = self.enrich_all(ranked, summary, progress).await;

        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        info!(
            results = results.len(),
            degraded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "match complete"
        );
        progress.done(&results);
        Ok(results)
    }

    /// Enrich every candidate concurrently, returning results in rank order.
    async fn enrich_all(
        &self,
        ranked: Vec<Ranked>,
        summary: String,
        progress: &dyn ProgressReporter,
    ) -> Vec<EnrichedResult> {
        let slots_len = ranked.len();
        let mut slots: Vec<Option<EnrichedResult>> = vec![None; slots_len];
        let mut candidates: Vec<(usize, MatchCandidate)> = Vec::new();

        for (i, entry) in ranked.into_iter().enumerate() {
            match entry {
                Ranked::Candidate(candidate) => candidates.push((i, candidate)),
                Ranked::Malformed(result) => slots[i] = Some(result),
            }
        }

        let total = candidates.len();
        let permits = self
            .settings
            .enrich_concurrency
            .unwrap_or(total)
            .clamp(1, total.max(1));
        let semaphore = Arc::new(Semaphore::new(permits));
        let summary: Arc<str> = summary.into();

        // Dropping the set (deadline hit) aborts whatever is still running.
        let mut tasks = JoinSet::new();
        for (i, candidate) in &candidates {
            let i = *i;
            let candidate = candidate.clone();
            let enricher = self.enricher.clone();
            let summary = Arc::clone(&summary);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match enricher.enrich(&candidate, &summary).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(point = %candidate.point_id, error = %e, "enrichment failed, degrading candidate");
                        EnrichedResult::degraded(&candidate, &e)
                    }
                };
                (i, result)
            });
        }

        let mut finished = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, result)) => slots[i] = Some(result),
                Err(e) => warn!(error = %e, "enrichment task did not complete"),
            }
            finished += 1;
            progress.candidate_enriched(finished, total);
        }

        // A panicked task leaves its slot empty.
        for (i, candidate) in &candidates {
            if slots[*i].is_none() {
                let err = PitchMatchError::upstream(
                    PipelineStep::EnrichMessage,
                    "enrichment task did not complete",
                );
                slots[*i] = Some(EnrichedResult::degraded(candidate, &err));
            }
        }

        slots.into_iter().flatten().collect()
    }
}

/// Order hits by descending score (stable, so ties keep index order), cap at
/// `limit`, and validate each payload.
fn rank(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<Ranked> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);

    hits.into_iter()
        .map(|hit| match ProblemRecord::from_payload(&hit.payload) {
            Ok(record) => Ranked::Candidate(MatchCandidate {
                point_id: hit.id,
                record,
                similarity_score: hit.score,
            }),
            Err(e) => {
                warn!(point = %hit.id, error = %e, "malformed problem payload");
                Ranked::Malformed(EnrichedResult::malformed(&hit.payload, hit.score, &e))
            }
        })
        .collect()
}
