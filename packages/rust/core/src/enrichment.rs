//! Per-candidate enrichment: personalized message + short problem summary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use pitchmatch_gateways::GenerationGateway;
use pitchmatch_shared::{
    EnrichedResult, MatchCandidate, PipelineStep, ProblemRecord, ProblemView, Result,
};

use crate::prompts::Prompts;
use crate::run_step;

/// Turns one [`MatchCandidate`] into an [`EnrichedResult`].
///
/// Cheap to clone; the pipeline hands one copy to each concurrent task.
#[derive(Clone)]
pub struct Enricher {
    generator: Arc<dyn GenerationGateway>,
    prompts: Arc<Prompts>,
    call_timeout: Duration,
}

impl Enricher {
    pub fn new(
        generator: Arc<dyn GenerationGateway>,
        prompts: Arc<Prompts>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            prompts,
            call_timeout,
        }
    }

    /// Enrich one candidate against the request's project summary.
    ///
    /// Makes one generation call for the message and, unless the record
    /// already carries a stored summary, a second one for the problem summary.
    #[instrument(skip_all, fields(point = %candidate.point_id, score = candidate.similarity_score))]
    pub async fn enrich(&self, candidate: &MatchCandidate, summary: &str) -> Result<EnrichedResult> {
        let record = &candidate.record;
        let description = problem_description(record);

        let marketing = run_step(
            PipelineStep::EnrichMessage,
            self.call_timeout,
            self.generator
                .generate(&self.prompts.personalized_message(&description, summary)),
        )
        .await?;

        let problem_summary = match &record.summary {
            Some(stored) => {
                debug!("reusing stored problem summary");
                stored.clone()
            }
            None => run_step(
                PipelineStep::EnrichSummary,
                self.call_timeout,
                self.generator
                    .generate(&self.prompts.problem_summary(&record.embedding_text())),
            )
            .await?
            .trim()
            .to_string(),
        };

        Ok(EnrichedResult {
            problem: ProblemView {
                title: record.title.clone(),
                subreddit: record.subreddit.clone(),
                user_id: record.id.clone(),
                url: record.url.clone(),
                similarity_score: candidate.similarity_score,
                summary: Some(problem_summary),
            },
            marketing: Some(marketing.trim().to_string()),
            error: None,
        })
    }
}

/// Description of a problem post as given to the message prompt.
pub fn problem_description(record: &ProblemRecord) -> String {
    let mut out = format!("Title: {}\n", record.title);
    if !record.text.trim().is_empty() {
        out.push_str(&format!("Text: {}\n", record.text.trim()));
    }
    out.push_str(&format!("URL: {}", record.url));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, StubGenerator, problem_payload, tagged_prompts};

    fn candidate(summary: Option<&str>) -> MatchCandidate {
        let mut payload = problem_payload("abc", "Notes vanish after sync");
        if let Some(s) = summary {
            payload.insert("summary".into(), serde_json::json!(s));
        }
        MatchCandidate {
            point_id: "p-1".into(),
            record: ProblemRecord::from_payload(&payload).unwrap(),
            similarity_score: 0.8,
        }
    }

    fn enricher(generator: StubGenerator) -> Enricher {
        Enricher::new(
            Arc::new(generator),
            Arc::new(Prompts::new(tagged_prompts())),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn description_includes_title_text_and_url() {
        let c = candidate(None);
        let d = problem_description(&c.record);
        assert_eq!(
            d,
            "Title: Notes vanish after sync\nText: Notes vanish after sync body\nURL: https://reddit.com/r/productivity/abc"
        );
    }

    #[tokio::test]
    async fn generates_message_then_summary() {
        let log = CallLog::default();
        let result = enricher(StubGenerator::new(log.clone()))
            .enrich(&candidate(None), "A sync app")
            .await
            .unwrap();

        assert_eq!(log.entries(), ["generate(message)", "generate(brief)"]);
        assert_eq!(result.problem.user_id, "abc");
        assert_eq!(result.problem.similarity_score, 0.8);
        assert!(result.problem.summary.unwrap().starts_with("brief of"));
        assert!(result.marketing.unwrap().starts_with("Hi!"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn stored_summary_is_reused() {
        let log = CallLog::default();
        let result = enricher(StubGenerator::new(log.clone()))
            .enrich(&candidate(Some("Sync eats notes.")), "A sync app")
            .await
            .unwrap();

        assert_eq!(log.entries(), ["generate(message)"]);
        assert_eq!(result.problem.summary.as_deref(), Some("Sync eats notes."));
    }

    #[tokio::test]
    async fn enrich_is_idempotent_with_deterministic_gateways() {
        let log = CallLog::default();
        let e = enricher(StubGenerator::new(log));
        let c = candidate(None);
        let before = c.clone();

        let first = e.enrich(&c, "A sync app").await.unwrap();
        let second = e.enrich(&c, "A sync app").await.unwrap();
        assert_eq!(first.marketing, second.marketing);
        assert_eq!(first, second);
        assert_eq!(c, before);
    }

    #[tokio::test]
    async fn failures_are_tagged_with_the_enrichment_step() {
        let log = CallLog::default();
        let err = enricher(StubGenerator::failing_on(log, "BRIEF"))
            .enrich(&candidate(None), "A sync app")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "upstream error during enrich_summary: stub failure"
        );
    }
}
