//! Problem corpus ingestion.
//!
//! Reads collected posts from a JSON-lines file, keeps the ones matching a
//! configured category, embeds them in batches and writes them to the
//! problem collection. Point ids derive from the post id, so re-ingesting
//! the same file overwrites instead of duplicating.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use pitchmatch_gateways::PointRecord;
use pitchmatch_shared::{
    AppConfig, CategoryFilter, Distance, PipelineStep, PitchMatchError, ProblemRecord, Result,
};

use crate::pipeline::ProgressReporter;
use crate::{Gateways, ids, run_step};

/// Default number of posts embedded per request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// One collected post, as written by the collector (one JSON object per line).
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub url: String,
    #[serde(default)]
    pub subreddit: String,
    /// Category already assigned by the collector, if any.
    #[serde(default)]
    pub category: Option<String>,
}

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub collection: String,
    pub vector_size: usize,
    pub distance: Distance,
    pub batch_size: usize,
    /// Drop and recreate the collection before writing.
    pub recreate: bool,
    pub categories: Vec<CategoryFilter>,
    pub call_timeout: Duration,
}

impl IngestOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            collection: config.index.problem_collection.clone(),
            vector_size: config.index.vector_size,
            distance: config.index.distance,
            batch_size: DEFAULT_BATCH_SIZE,
            recreate: false,
            categories: config.ingest.categories.clone(),
            call_timeout: config.matching.call_timeout(),
        }
    }
}

/// What an ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-empty lines read.
    pub read: usize,
    /// Lines that did not parse or lacked a title/url.
    pub invalid: usize,
    /// Valid posts rejected by every category filter.
    pub filtered_out: usize,
    /// Posts written to the collection.
    pub ingested: usize,
    /// Written posts per category (`uncategorized` when no filters are set).
    pub per_category: BTreeMap<String, usize>,
    pub elapsed: Duration,
}

const UNCATEGORIZED: &str = "uncategorized";

/// Parse JSON-lines content. Bad lines are counted, logged and skipped.
pub fn parse_posts(content: &str) -> (Vec<CollectedPost>, usize, usize) {
    let mut posts = Vec::new();
    let mut read = 0;
    let mut invalid = 0;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        read += 1;
        match serde_json::from_str::<CollectedPost>(line) {
            Ok(post) if !post.title.trim().is_empty() && !post.url.trim().is_empty() => {
                posts.push(post)
            }
            Ok(post) => {
                warn!(line = line_no + 1, id = %post.id, "post without title or url, skipping");
                invalid += 1;
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "unparseable post, skipping");
                invalid += 1;
            }
        }
    }

    (posts, read, invalid)
}

/// Category of `post`, or `None` if no filter accepts it.
///
/// A filter accepts a post when the post's subreddit is one of its sources
/// (any source when the list is empty) and the lowercased title + text
/// contains one of its keywords (any text when the list is empty). The first
/// accepting filter wins. With no filters configured every post is kept,
/// carrying whatever category the collector gave it.
pub fn categorize(post: &CollectedPost, filters: &[CategoryFilter]) -> Option<String> {
    if filters.is_empty() {
        return Some(
            post.category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
        );
    }

    let haystack = format!("{} {}", post.title, post.text).to_lowercase();
    filters
        .iter()
        .find(|filter| {
            let source_ok = filter.sources.is_empty()
                || filter
                    .sources
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&post.subreddit));
            let keyword_ok = filter.keywords.is_empty()
                || filter
                    .keywords
                    .iter()
                    .any(|k| haystack.contains(&k.to_lowercase()));
            source_ok && keyword_ok
        })
        .map(|filter| filter.name.clone())
}

fn record_for(post: &CollectedPost, category: &str) -> ProblemRecord {
    ProblemRecord {
        id: post.id.clone(),
        title: post.title.clone(),
        text: post.text.clone(),
        subreddit: post.subreddit.clone(),
        url: post.url.clone(),
        category: (category != UNCATEGORIZED).then(|| category.to_string()),
        summary: None,
    }
}

fn payload_for(record: &ProblemRecord) -> Result<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PitchMatchError::data_consistency("problem record did not serialize to an object")),
        Err(e) => Err(PitchMatchError::data_consistency(format!(
            "failed to serialize problem record: {e}"
        ))),
    }
}

/// Ingest a JSON-lines posts file into the problem collection.
#[instrument(skip_all, fields(path = %path.display(), collection = %options.collection))]
pub async fn ingest_file(
    gateways: &Gateways,
    path: &Path,
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PitchMatchError::io(path, e))?;
    ingest_posts(gateways, &content, options, progress).await
}

/// Ingest JSON-lines content already in memory.
pub async fn ingest_posts(
    gateways: &Gateways,
    content: &str,
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let start = Instant::now();
    if options.batch_size == 0 {
        return Err(PitchMatchError::validation("batch size must be at least 1"));
    }

    progress.phase("Reading posts");
    let (posts, read, invalid) = parse_posts(content);

    let mut report = IngestReport {
        read,
        invalid,
        ..IngestReport::default()
    };
    let mut records = Vec::with_capacity(posts.len());
    for post in &posts {
        match categorize(post, &options.categories) {
            Some(category) => records.push(record_for(post, &category)),
            None => report.filtered_out += 1,
        }
    }
    debug!(kept = records.len(), filtered_out = report.filtered_out, "posts filtered");

    if options.recreate {
        progress.phase("Recreating collection");
        run_step(
            PipelineStep::Provision,
            options.call_timeout,
            gateways
                .index
                .recreate_collection(&options.collection, options.vector_size, options.distance),
        )
        .await?;
    }

    if records.is_empty() {
        warn!("no posts matched any category, nothing to ingest");
        report.elapsed = start.elapsed();
        return Ok(report);
    }

    progress.phase("Embedding and writing posts");
    let batches = records.len().div_ceil(options.batch_size);
    for (batch_no, batch) in records.chunks(options.batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(ProblemRecord::embedding_text).collect();
        let vectors = run_step(
            PipelineStep::EmbedPayload,
            options.call_timeout,
            gateways.embedder.embed_batch(&texts),
        )
        .await?;
        if vectors.len() != batch.len() {
            return Err(PitchMatchError::upstream(
                PipelineStep::EmbedPayload,
                format!("received {} embeddings for {} posts", vectors.len(), batch.len()),
            ));
        }

        let mut points = Vec::with_capacity(batch.len());
        for (record, vector) in batch.iter().zip(vectors) {
            points.push(PointRecord {
                id: ids::point_id(&options.collection, &record.id),
                vector,
                payload: payload_for(record)?,
            });
        }

        run_step(
            PipelineStep::Upsert,
            options.call_timeout,
            gateways.index.upsert(&options.collection, points),
        )
        .await?;

        for record in batch {
            let key = record.category.as_deref().unwrap_or(UNCATEGORIZED);
            *report.per_category.entry(key.to_string()).or_default() += 1;
        }
        report.ingested += batch.len();
        progress.batch_written(batch_no + 1, batches);
    }

    report.elapsed = start.elapsed();
    info!(
        read = report.read,
        ingested = report.ingested,
        invalid = report.invalid,
        filtered_out = report.filtered_out,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingestion complete"
    );
    Ok(report)
}
