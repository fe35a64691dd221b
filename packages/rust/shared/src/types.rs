//! Core domain types for the matching pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PitchMatchError, Result};

// ---------------------------------------------------------------------------
// FactStatement
// ---------------------------------------------------------------------------

/// Where a fact statement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactOrigin {
    QaPair,
    Hint,
    Slide,
}

impl FactOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QaPair => "qa_pair",
            Self::Hint => "hint",
            Self::Slide => "slide",
        }
    }
}

/// A single normalized piece of information extracted from a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStatement {
    text: String,
    origin: FactOrigin,
}

impl FactStatement {
    /// `question:<q> answer:<a>`
    pub fn qa_pair(question: &str, answer: &str) -> Self {
        Self {
            text: format!("question:{question} answer:{answer}"),
            origin: FactOrigin::QaPair,
        }
    }

    /// A labeled hint, e.g. `productHint : <hint>`.
    pub fn hint(label: &str, hint: &str) -> Self {
        Self {
            text: format!("{label} : {hint}"),
            origin: FactOrigin::Hint,
        }
    }

    /// Cleaned text of one slide.
    pub fn slide(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: FactOrigin::Slide,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> FactOrigin {
        self.origin
    }
}

impl std::fmt::Display for FactStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text extracted from one page of an uploaded slide deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideText {
    pub page_number: u32,
    pub filename: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// PipelineStep
// ---------------------------------------------------------------------------

/// Named stages that call out to a gateway. Used to tag upstream failures.
///
/// Gateway clients tag errors with the raw call kind (`Embed`, `Generate`,
/// `IndexRequest`); orchestrators re-tag them with the stage they were running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Embed,
    Generate,
    IndexRequest,
    Summarize,
    SearchQuery,
    EmbedQuery,
    VectorSearch,
    EnrichMessage,
    EnrichSummary,
    Provision,
    Upsert,
    EmbedPayload,
    StructureInterview,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embed => "embed",
            Self::Generate => "generate",
            Self::IndexRequest => "index_request",
            Self::Summarize => "summarize",
            Self::SearchQuery => "search_query",
            Self::EmbedQuery => "embed_query",
            Self::VectorSearch => "vector_search",
            Self::EnrichMessage => "enrich_message",
            Self::EnrichSummary => "enrich_summary",
            Self::Provision => "provision",
            Self::Upsert => "upsert",
            Self::EmbedPayload => "embed_payload",
            Self::StructureInterview => "structure_interview",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProblemRecord / MatchCandidate
// ---------------------------------------------------------------------------

/// A collected problem post, as stored in the problem collection payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    /// Source-side identifier (the post id).
    #[serde(rename = "reddit_id", default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subreddit: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Precomputed short summary, when the ingestion job stored one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ProblemRecord {
    /// Validate an index payload into a typed record.
    ///
    /// `title` and `url` are required and must be non-empty strings; everything
    /// else falls back to an empty value.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            match payload.get(key).and_then(Value::as_str).map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(PitchMatchError::data_consistency(format!(
                    "problem payload is missing `{key}`"
                ))),
            }
        };
        let optional = |key: &str| -> Option<String> {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        Ok(Self {
            title: required("title")?,
            url: required("url")?,
            id: optional("reddit_id")
                .or_else(|| optional("id"))
                .unwrap_or_default(),
            text: optional("text").unwrap_or_default(),
            subreddit: optional("subreddit").unwrap_or_default(),
            category: optional("category"),
            summary: optional("summary"),
        })
    }

    /// Text used both for embedding at ingestion time and for summarization.
    pub fn embedding_text(&self) -> String {
        format!("{} \n\n{}", self.title, self.text)
    }
}

/// A problem record returned by a nearest-neighbor query, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// Point identifier inside the vector index.
    pub point_id: String,
    pub record: ProblemRecord,
    pub similarity_score: f32,
}

// ---------------------------------------------------------------------------
// EnrichedResult
// ---------------------------------------------------------------------------

/// Problem half of an [`EnrichedResult`], in the wire shape callers expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemView {
    pub title: String,
    pub subreddit: String,
    pub user_id: String,
    pub url: String,
    pub similarity_score: f32,
    pub summary: Option<String>,
}

/// Terminal artifact for one match: the problem plus a personalized message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub problem: ProblemView,
    pub marketing: Option<String>,
    /// Why enrichment degraded for this candidate, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnrichedResult {
    /// Placeholder for a candidate whose enrichment failed.
    pub fn degraded(candidate: &MatchCandidate, error: &PitchMatchError) -> Self {
        Self {
            problem: ProblemView {
                title: candidate.record.title.clone(),
                subreddit: candidate.record.subreddit.clone(),
                user_id: candidate.record.id.clone(),
                url: candidate.record.url.clone(),
                similarity_score: candidate.similarity_score,
                summary: None,
            },
            marketing: None,
            error: Some(error.to_string()),
        }
    }

    /// Placeholder for an index hit whose payload could not be validated.
    ///
    /// Keeps whatever string fields the payload did carry.
    pub fn malformed(payload: &Map<String, Value>, score: f32, error: &PitchMatchError) -> Self {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            problem: ProblemView {
                title: field("title"),
                subreddit: field("subreddit"),
                user_id: field("reddit_id"),
                url: field("url"),
                similarity_score: score,
                summary: None,
            },
            marketing: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Client search request, as received from the HTTP boundary or a request file.
///
/// Missing fields deserialize to empty values so that validation, not
/// deserialization, reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSearchRequest {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub conversation_transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_problem_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_solution_hint: Option<String>,
    /// Slide pages; web clients also send them as `pdfPages`.
    #[serde(default, alias = "pdfPages", skip_serializing_if = "Option::is_none")]
    pub pdf_slides_text: Option<Vec<SlideText>>,
}
