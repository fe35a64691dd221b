//! Router, shared state and handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use pitchmatch_core::{ClientSearch, Gateways, SilentProgress};
use pitchmatch_gateways::EmbeddingGateway;
use pitchmatch_shared::{AppConfig, ClientSearchRequest, EnrichedResult};

use crate::error::ApiError;

#[derive(Clone)]
pub(crate) struct AppState {
    search: Arc<ClientSearch>,
    embedder: Arc<dyn EmbeddingGateway>,
}

impl AppState {
    pub(crate) fn new(gateways: Gateways, config: &AppConfig) -> Self {
        Self {
            embedder: Arc::clone(&gateways.embedder),
            search: Arc::new(ClientSearch::new(gateways, config)),
        }
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/client_search", post(client_search))
        .route("/client_search/", post(client_search))
        .route("/upload_problem", post(upload_problem))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip_all)]
async fn client_search(
    State(state): State<AppState>,
    body: Result<Json<ClientSearchRequest>, JsonRejection>,
) -> Result<Json<Vec<EnrichedResult>>, ApiError> {
    let Json(request) = body?;
    let results = state.search.search(&request, &SilentProgress).await?;
    info!(product = %request.product_name, results = results.len(), "client search served");
    Ok(Json(results))
}

#[derive(Deserialize)]
struct UploadProblem {
    #[serde(default)]
    payload: String,
}

#[instrument(skip_all)]
async fn upload_problem(
    State(state): State<AppState>,
    body: Result<Json<UploadProblem>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(UploadProblem { payload }) = body?;
    if payload.trim().is_empty() {
        return Err(ApiError::bad_request("payload is required"));
    }
    let embedding = state.embedder.embed(&payload).await?;
    Ok(Json(json!({ "embedding": embedding })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Map;
    use tower::ServiceExt;

    use pitchmatch_gateways::{GenerationGateway, InMemoryIndex, PointRecord, VectorIndex};
    use pitchmatch_shared::{Distance, PipelineStep, PitchMatchError, Result};

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingGateway for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(PitchMatchError::upstream(PipelineStep::Embed, "quota exceeded"));
            }
            Ok(vec![1.0, 0.0])
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl GenerationGateway for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(format!("reply to {} chars", prompt.len()))
        }
    }

    fn payload(title: &str) -> Map<String, Value> {
        json!({
            "reddit_id": "abc",
            "title": title,
            "text": "I keep losing my notes",
            "subreddit": "productivity",
            "url": "https://reddit.com/r/productivity/abc",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    async fn app(fail_embed: bool) -> Router {
        let config = AppConfig::default();
        let index = Arc::new(InMemoryIndex::new());
        index
            .recreate_collection(&config.index.problem_collection, 2, Distance::Cosine)
            .await
            .unwrap();
        index
            .upsert(
                &config.index.problem_collection,
                vec![PointRecord {
                    id: "p1".into(),
                    vector: vec![1.0, 0.0],
                    payload: payload("Notes vanish"),
                }],
            )
            .await
            .unwrap();

        let gateways = Gateways {
            embedder: Arc::new(FixedEmbedder { fail: fail_embed }),
            generator: Arc::new(EchoGenerator),
            index,
        };
        router(AppState::new(gateways, &config))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn note_app() -> Value {
        json!({
            "productName": "NoteApp",
            "conversationTranscript": "AI: What problem?\nFounder: Users lose notes.\nAI: How?\nFounder: Auto-sync.",
            "conversationProblemHint": "lost notes",
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app(false)
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn client_search_returns_enriched_results() {
        let (status, body) = post_json(app(false).await, "/client_search", note_app()).await;
        assert_eq!(status, StatusCode::OK);

        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["problem"]["title"], "Notes vanish");
        assert!(results[0]["marketing"].as_str().unwrap().starts_with("reply to"));
    }

    #[tokio::test]
    async fn trailing_slash_route_is_served() {
        let (status, _) = post_json(app(false).await, "/client_search/", note_app()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_product_name_is_400() {
        let mut request = note_app();
        request["productName"] = json!("");
        let (status, body) = post_json(app(false).await, "/client_search", request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation error: productName is required");
    }

    #[tokio::test]
    async fn upstream_failure_is_502() {
        let (status, body) = post_json(app(true).await, "/client_search", note_app()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn malformed_body_is_400_json() {
        let response = app(false)
            .await
            .oneshot(
                Request::post("/client_search")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn upload_problem_returns_embedding() {
        let (status, body) =
            post_json(app(false).await, "/upload_problem", json!({ "payload": "lost notes" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["embedding"], json!([1.0, 0.0]));

        let (status, _) = post_json(app(false).await, "/upload_problem", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
