//! Gateways to the external services the pipeline depends on.
//!
//! The pipeline only sees three traits:
//! - [`EmbeddingGateway`]: text → fixed-length vector
//! - [`GenerationGateway`]: prompt → completion text
//! - [`VectorIndex`]: per-collection nearest-neighbor store
//!
//! Concrete clients: [`MistralClient`] (embedding + generation),
//! [`QdrantIndex`] (vector index over HTTP) and [`InMemoryIndex`] (local,
//! for tests and dry runs).

mod http;
pub mod memory;
pub mod mistral;
pub mod qdrant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use pitchmatch_shared::{Distance, Result};

pub use memory::InMemoryIndex;
pub use mistral::MistralClient;
pub use qdrant::QdrantIndex;

// ---------------------------------------------------------------------------
// Index records
// ---------------------------------------------------------------------------

/// A point to write into a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    /// UUID string; identical ids overwrite instead of duplicating.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A point returned by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Gateway traits
// ---------------------------------------------------------------------------

/// Text → embedding vector.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Prompt → completion.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Per-collection nearest-neighbor store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `name`, replacing any prior collection with the same name.
    async fn recreate_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    /// Up to `limit` points ranked by descending similarity.
    async fn search(&self, collection: &str, vector: &[f32], limit: usize)
    -> Result<Vec<ScoredPoint>>;
}
