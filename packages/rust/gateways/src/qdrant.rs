//! Qdrant REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use url::Url;

use pitchmatch_shared::{Distance, PipelineStep, PitchMatchError, Result};

use crate::http::{build_client, check_status, secret_header, transport_error};
use crate::{PointRecord, ScoredPoint, VectorIndex};

const STEP: PipelineStep = PipelineStep::IndexRequest;

/// Vector index backed by a Qdrant server.
pub struct QdrantIndex {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl QdrantIndex {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PitchMatchError::config(format!("invalid index url `{base_url}`: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert("api-key", secret_header(key)?);
        }

        Ok(Self {
            client: build_client(timeout, headers)?,
            base_url,
            timeout,
        })
    }

    fn collection_url(&self, name: &str, suffix: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PitchMatchError::config("index url cannot be a base"))?
            .pop_if_empty()
            .push("collections")
            .push(name)
            .extend(suffix);
        Ok(url)
    }
}

fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
        Distance::Euclid => "Euclid",
    }
}

/// Point ids come back as either unsigned integers or UUID strings.
fn point_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[instrument(skip_all, fields(collection = name, vector_size = vector_size))]
    async fn recreate_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let url = self.collection_url(name, &[])?;

        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(STEP, self.timeout, e))?;
        if response.status() != StatusCode::NOT_FOUND {
            check_status(STEP, response).await?;
        }

        let body = CreateCollection {
            vectors: VectorParams {
                size: vector_size,
                distance: distance_name(distance),
            },
        };
        let response = self
            .client
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(STEP, self.timeout, e))?;
        check_status(STEP, response).await?;

        info!(collection = name, vector_size, "collection recreated");
        Ok(())
    }

    #[instrument(skip_all, fields(collection = collection, count = points.len()))]
    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut url = self.collection_url(collection, &["points"])?;
        url.set_query(Some("wait=true"));

        let body = UpsertPoints {
            points: points
                .into_iter()
                .map(|p| WirePoint {
                    id: p.id,
                    vector: p.vector,
                    payload: p.payload,
                })
                .collect(),
        };
        let response = self
            .client
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(STEP, self.timeout, e))?;
        check_status(STEP, response).await?;

        debug!(collection, count = body.points.len(), "points upserted");
        Ok(())
    }

    #[instrument(skip_all, fields(collection = collection, limit = limit))]
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let url = self.collection_url(collection, &["points", "search"])?;
        let body = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(STEP, self.timeout, e))?;
        let response = check_status(STEP, response).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PitchMatchError::upstream(STEP, format!("malformed search response: {e}")))?;

        let hits: Vec<ScoredPoint> = parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: point_id(&hit.id),
                score: hit.score,
                payload: hit.payload.unwrap_or_default(),
            })
            .collect();

        debug!(collection, hits = hits.len(), "search complete");
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<WirePoint>,
}

#[derive(Serialize)]
struct WirePoint {
    id: String,
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}
