//! Recording gateway stubs shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use pitchmatch_gateways::{
    EmbeddingGateway, GenerationGateway, InMemoryIndex, PointRecord, ScoredPoint, VectorIndex,
};
use pitchmatch_shared::{Distance, PipelineStep, PitchMatchError, PromptsConfig, Result};

use crate::Gateways;

/// Ordered log of gateway calls, shared between stubs.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Templates whose first word tells the stub generator which call it is serving.
pub(crate) fn tagged_prompts() -> PromptsConfig {
    PromptsConfig {
        summary: "SUMMARY {product}\n{description}".into(),
        search_query: "QUERY {summary}".into(),
        personalized_message: "MESSAGE {problem}\nFOR {summary}".into(),
        problem_summary: "BRIEF {problem}".into(),
    }
}

/// Deterministic generator keyed on the first word of the prompt.
pub(crate) struct StubGenerator {
    log: CallLog,
    /// Prompts containing this text fail with an upstream error.
    fail_on: Option<String>,
}

impl StubGenerator {
    pub(crate) fn new(log: CallLog) -> Self {
        Self { log, fail_on: None }
    }

    pub(crate) fn failing_on(log: CallLog, needle: &str) -> Self {
        Self {
            log,
            fail_on: Some(needle.to_string()),
        }
    }
}

#[async_trait]
impl GenerationGateway for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let kind = prompt.split_whitespace().next().unwrap_or_default();
        let entry = match kind {
            "SUMMARY" => "generate(summary)",
            "QUERY" => "generate(query)",
            "MESSAGE" => "generate(message)",
            "BRIEF" => "generate(brief)",
            _ => "generate(other)",
        };
        self.log.push(entry);

        if let Some(needle) = &self.fail_on {
            if prompt.contains(needle.as_str()) {
                return Err(PitchMatchError::upstream(PipelineStep::Generate, "stub failure"));
            }
        }

        Ok(match kind {
            "SUMMARY" => "A note app that syncs to the cloud.".to_string(),
            "QUERY" => "I keep losing my notes".to_string(),
            "MESSAGE" => format!("Hi! ({} chars of context)", prompt.len()),
            "BRIEF" => format!("brief of {} chars", prompt.len()),
            _ => prompt.to_string(),
        })
    }
}

/// Embedder returning a fixed two-dimensional vector.
pub(crate) struct StubEmbedder {
    log: CallLog,
    fail: bool,
}

impl StubEmbedder {
    pub(crate) fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }

    pub(crate) fn failing(log: CallLog) -> Self {
        Self { log, fail: true }
    }
}

#[async_trait]
impl EmbeddingGateway for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.log.push("embed");
        if self.fail {
            return Err(PitchMatchError::upstream(PipelineStep::Embed, "stub failure"));
        }
        Ok(vec![1.0, 0.0])
    }
}

/// Index that answers every search with a fixed hit list, in the given order.
pub(crate) struct StubIndex {
    log: CallLog,
    hits: Vec<ScoredPoint>,
}

impl StubIndex {
    pub(crate) fn new(log: CallLog, hits: Vec<ScoredPoint>) -> Self {
        Self { log, hits }
    }
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn recreate_collection(&self, name: &str, _: usize, _: Distance) -> Result<()> {
        self.log.push(format!("recreate({name})"));
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        self.log.push(format!("upsert({collection}, {})", points.len()));
        Ok(())
    }

    async fn search(&self, collection: &str, _: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        self.log.push(format!("search({collection})"));
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

pub(crate) fn problem_payload(id: &str, title: &str) -> Map<String, Value> {
    json!({
        "reddit_id": id,
        "title": title,
        "text": format!("{title} body"),
        "subreddit": "productivity",
        "url": format!("https://reddit.com/r/productivity/{id}"),
    })
    .as_object()
    .cloned()
    .unwrap()
}

pub(crate) fn hit(id: &str, score: f32) -> ScoredPoint {
    ScoredPoint {
        id: id.to_string(),
        score,
        payload: problem_payload(id, &format!("post {id}")),
    }
}

pub(crate) fn stub_gateways(log: &CallLog, hits: Vec<ScoredPoint>) -> Gateways {
    Gateways {
        embedder: Arc::new(StubEmbedder::new(log.clone())),
        generator: Arc::new(StubGenerator::new(log.clone())),
        index: Arc::new(StubIndex::new(log.clone(), hits)),
    }
}

/// Stub embedder and generator over a real in-memory index.
pub(crate) fn memory_gateways(log: &CallLog, index: Arc<InMemoryIndex>) -> Gateways {
    Gateways {
        embedder: Arc::new(StubEmbedder::new(log.clone())),
        generator: Arc::new(StubGenerator::new(log.clone())),
        index,
    }
}
