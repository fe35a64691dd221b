//! Mistral API client for embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use pitchmatch_shared::{MistralConfig, PipelineStep, PitchMatchError, Result};

use crate::http::{build_client, check_status, secret_header, transport_error};
use crate::{EmbeddingGateway, GenerationGateway};

/// Embedding + generation client talking to a Mistral-compatible API.
#[derive(Clone)]
pub struct MistralClient {
    client: Client,
    base_url: String,
    embed_model: String,
    chat_model: String,
    timeout: Duration,
    /// When set, embeddings of any other length are rejected.
    dimensions: Option<usize>,
}

impl MistralClient {
    /// Build a client from config and an already-resolved API key.
    pub fn new(api_key: &str, config: &MistralConfig, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PitchMatchError::config("missing Mistral API key"));
        }
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {}", api_key.trim()))?);

        Ok(Self {
            client: build_client(timeout, headers)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            chat_model: config.chat_model.clone(),
            timeout,
            dimensions: None,
        })
    }

    /// Reject embeddings whose length differs from the index dimension.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Same connection, different chat model.
    pub fn with_chat_model(&self, model: impl Into<String>) -> Self {
        Self {
            chat_model: model.into(),
            ..self.clone()
        }
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    async fn request_embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let step = PipelineStep::Embed;
        let request = EmbeddingRequest {
            model: &self.embed_model,
            input: inputs,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(step, self.timeout, e))?;
        let response = check_status(step, response).await?;

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            PitchMatchError::upstream(step, format!("malformed embedding response: {e}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(PitchMatchError::upstream(
                step,
                format!(
                    "received {} embeddings for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                ),
            ));
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(expected) = self.dimensions {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(PitchMatchError::upstream(
                    step,
                    format!(
                        "embedding has {} dimensions, index expects {expected}",
                        bad.len()
                    ),
                ));
            }
        }

        debug!(count = vectors.len(), model = %self.embed_model, "embeddings received");
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingGateway for MistralClient {
    #[instrument(skip_all, fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embeddings(&[text])
            .await?
            .pop()
            .ok_or_else(|| PitchMatchError::upstream(PipelineStep::Embed, "empty embedding response"))
    }

    #[instrument(skip_all, fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request_embeddings(&inputs).await
    }
}

#[async_trait]
impl GenerationGateway for MistralClient {
    #[instrument(skip_all, fields(model = %self.chat_model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let step = PipelineStep::Generate;
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(step, self.timeout, e))?;
        let response = check_status(step, response).await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            PitchMatchError::upstream(step, format!("malformed completion response: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PitchMatchError::upstream(step, "completion response has no choices"))?;

        debug!(len = text.len(), "completion received");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MistralClient {
        let config = MistralConfig {
            base_url: format!("{}/v1", server.uri()),
            ..MistralConfig::default()
        };
        MistralClient::new("test-key", &config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rejects_blank_api_key() {
        let result = MistralClient::new("  ", &MistralConfig::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(PitchMatchError::Config { .. })));
    }

    #[tokio::test]
    async fn embed_sends_model_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral-embed",
                "input": ["hello"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vector = client_for(&server).embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_batch_restores_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "embedding": [2.0], "index": 1 },
                    { "embedding": [1.0], "index": 0 }
                ]
            })))
            .mount(&server)
            .await;

        let vectors = client_for(&server)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2], "index": 0 }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .with_dimensions(1024)
            .embed("hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("index expects 1024"));
    }

    #[tokio::test]
    async fn generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral-medium-latest",
                "messages": [{ "role": "user", "content": "Say hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi" } }]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).generate("Say hi").await.unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn generate_uses_overridden_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "model": "mistral-small-latest" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "ok" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).with_chat_model("mistral-small-latest");
        assert_eq!(client.chat_model(), "mistral-small-latest");
        assert_eq!(client.generate("x").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn http_errors_are_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("x").await.unwrap_err();
        match err {
            PitchMatchError::Upstream { step, message } => {
                assert_eq!(step, PipelineStep::Generate);
                assert!(message.contains("429"));
                assert!(message.contains("rate limited"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).generate("x").await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn slow_responses_hit_the_call_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let config = MistralConfig {
            base_url: format!("{}/v1", server.uri()),
            ..MistralConfig::default()
        };
        let client = MistralClient::new("k", &config, Duration::from_millis(200)).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, PitchMatchError::DeadlineExceeded { .. }));
    }
}
