//! Per-product collections of client fact statements.
//!
//! The caller owns the collection lifecycle: provisioning recreates the
//! collection named after the product and writes one point per fact. The
//! matching pipeline never calls this on its own.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use pitchmatch_gateways::PointRecord;
use pitchmatch_shared::{AppConfig, Distance, FactStatement, PipelineStep, PitchMatchError, Result};

use crate::{Gateways, ids, run_step};

/// Outcome of one provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub collection: String,
    pub points: usize,
}

/// Writes client facts into their own collection.
#[derive(Clone)]
pub struct Provisioner {
    gateways: Gateways,
    vector_size: usize,
    distance: Distance,
    /// Name the client collection must never take.
    problem_collection: String,
    call_timeout: Duration,
}

impl Provisioner {
    pub fn new(gateways: Gateways, config: &AppConfig) -> Self {
        Self {
            gateways,
            vector_size: config.index.vector_size,
            distance: config.index.distance,
            problem_collection: config.index.problem_collection.clone(),
            call_timeout: config.matching.call_timeout(),
        }
    }

    /// Replace the product's collection with the given facts.
    ///
    /// Facts are embedded before the collection is touched, so an embedding
    /// failure leaves any previous collection intact. Point ids derive from
    /// the fact text, so retries never duplicate.
    #[instrument(skip_all, fields(product = product_name, facts = facts.len()))]
    pub async fn provision_client_collection(
        &self,
        product_name: &str,
        facts: &[FactStatement],
    ) -> Result<ProvisionReport> {
        let collection = collection_name(product_name)?;
        if collection == self.problem_collection {
            return Err(PitchMatchError::validation(format!(
                "product name `{product_name}` collides with the problem collection"
            )));
        }
        if facts.is_empty() {
            return Err(PitchMatchError::validation("no fact statements to provision"));
        }

        let texts: Vec<String> = facts.iter().map(|f| f.text().to_string()).collect();
        let vectors = run_step(
            PipelineStep::Provision,
            self.call_timeout,
            self.gateways.embedder.embed_batch(&texts),
        )
        .await?;
        if vectors.len() != facts.len() {
            return Err(PitchMatchError::upstream(
                PipelineStep::Provision,
                format!("received {} embeddings for {} facts", vectors.len(), facts.len()),
            ));
        }

        run_step(
            PipelineStep::Provision,
            self.call_timeout,
            self.gateways
                .index
                .recreate_collection(&collection, self.vector_size, self.distance),
        )
        .await?;

        let points: Vec<PointRecord> = facts
            .iter()
            .zip(vectors)
            .map(|(fact, vector)| PointRecord {
                id: ids::point_id(&collection, fact.text()),
                vector,
                payload: fact_payload(fact),
            })
            .collect();
        let count = points.len();

        run_step(
            PipelineStep::Upsert,
            self.call_timeout,
            self.gateways.index.upsert(&collection, points),
        )
        .await?;

        info!(collection = %collection, points = count, "client collection provisioned");
        Ok(ProvisionReport {
            collection,
            points: count,
        })
    }
}

fn fact_payload(fact: &FactStatement) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("content".into(), Value::String(fact.text().to_string()));
    payload.insert("origin".into(), Value::String(fact.origin().as_str().to_string()));
    payload
}

/// Collection name for a product: runs of characters outside
/// `[A-Za-z0-9_-]` become `_`, leading and trailing `_` are dropped.
pub fn collection_name(product_name: &str) -> Result<String> {
    static UNSAFE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid regex"));

    let name = UNSAFE_RE.replace_all(product_name.trim(), "_");
    let name = name.trim_matches('_');
    if name.is_empty() {
        return Err(PitchMatchError::validation(format!(
            "product name `{product_name}` has no usable characters for a collection name"
        )));
    }
    Ok(name.to_string())
}
