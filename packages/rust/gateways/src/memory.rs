//! In-process vector index.
//!
//! Brute-force scoring over every point of a collection. Used by tests and
//! dry runs that should not need a running index server.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use pitchmatch_shared::{Distance, PipelineStep, PitchMatchError, Result};

use crate::{PointRecord, ScoredPoint, VectorIndex};

const STEP: PipelineStep = PipelineStep::IndexRequest;

struct Collection {
    vector_size: usize,
    distance: Distance,
    /// Insertion order is kept so ties rank deterministically.
    points: Vec<PointRecord>,
}

/// A [`VectorIndex`] that keeps every collection in memory.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in `collection`, or `None` if it does not exist.
    pub fn len(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .ok()?
            .get(collection)
            .map(|c| c.points.len())
    }

    /// Payloads of `collection` in insertion order.
    pub fn payloads(&self, collection: &str) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.collections
            .read()
            .ok()
            .and_then(|guard| {
                guard
                    .get(collection)
                    .map(|c| c.points.iter().map(|p| p.payload.clone()).collect())
            })
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> PitchMatchError {
    PitchMatchError::upstream(STEP, "in-memory index lock poisoned")
}

fn missing(collection: &str) -> PitchMatchError {
    PitchMatchError::upstream(STEP, format!("collection `{collection}` does not exist"))
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
        }
        // Higher is better, so Euclidean distance is negated.
        Distance::Euclid => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn recreate_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        guard.insert(
            name.to_string(),
            Collection {
                vector_size,
                distance,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let target = guard.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != target.vector_size) {
            return Err(PitchMatchError::upstream(
                STEP,
                format!(
                    "point `{}` has {} dimensions, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    target.vector_size
                ),
            ));
        }

        for point in points {
            match target.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => target.points.push(point),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let guard = self.collections.read().map_err(poisoned)?;
        let target = guard.get(collection).ok_or_else(|| missing(collection))?;

        if vector.len() != target.vector_size {
            return Err(PitchMatchError::upstream(
                STEP,
                format!(
                    "query has {} dimensions, collection expects {}",
                    vector.len(),
                    target.vector_size
                ),
            ));
        }

        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: score(target.distance, vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn point(id: &str, vector: Vec<f32>, title: &str) -> PointRecord {
        let mut payload = Map::new();
        payload.insert("title".into(), json!(title));
        PointRecord {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let index = InMemoryIndex::new();
        index.recreate_collection("c", 2, Distance::Cosine).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("a", vec![0.0, 1.0], "orthogonal"),
                    point("b", vec![1.0, 0.0], "same"),
                    point("c", vec![1.0, 1.0], "diagonal"),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let index = InMemoryIndex::new();
        index.recreate_collection("c", 1, Distance::Dot).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0], "old")]).await.unwrap();
        index.upsert("c", vec![point("a", vec![2.0], "new")]).await.unwrap();

        assert_eq!(index.len("c"), Some(1));
        assert_eq!(index.payloads("c")[0]["title"], "new");
    }

    #[tokio::test]
    async fn recreate_drops_existing_points() {
        let index = InMemoryIndex::new();
        index.recreate_collection("c", 1, Distance::Dot).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0], "x")]).await.unwrap();
        index.recreate_collection("c", 1, Distance::Dot).await.unwrap();
        assert_eq!(index.len("c"), Some(0));
    }

    #[tokio::test]
    async fn missing_collection_and_wrong_dimension_fail() {
        let index = InMemoryIndex::new();
        assert!(index.search("nope", &[1.0], 1).await.is_err());
        assert_eq!(index.len("nope"), None);

        index.recreate_collection("c", 2, Distance::Euclid).await.unwrap();
        assert!(index.upsert("c", vec![point("a", vec![1.0], "x")]).await.is_err());
        assert!(index.search("c", &[1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn euclid_prefers_closer_points() {
        let index = InMemoryIndex::new();
        index.recreate_collection("c", 1, Distance::Euclid).await.unwrap();
        index
            .upsert("c", vec![point("far", vec![10.0], "f"), point("near", vec![1.0], "n")])
            .await
            .unwrap();
        let hits = index.search("c", &[0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "near");
    }
}
