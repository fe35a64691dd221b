//! Interview structuring.
//!
//! Turns a free-form voice transcript (plus optional slide pages) into a
//! problem statement, a solution statement and a marker-formatted dialogue
//! that the transcript normalizer can pair.

use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use pitchmatch_gateways::{GenerationGateway, MistralClient};
use pitchmatch_shared::{
    AppConfig, ClientSearchRequest, PipelineStep, PitchMatchError, Result, SlideText,
    require_api_key,
};
use pitchmatch_transcript::RoleMarkers;

use crate::run_step;

const STEP: PipelineStep = PipelineStep::StructureInterview;

/// Structured view of a founder interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredInterview {
    pub problem: String,
    pub solution: String,
    pub formatted_transcript: String,
}

impl StructuredInterview {
    /// Build the client search request this interview feeds.
    pub fn into_request(
        self,
        product_name: impl Into<String>,
        slides: Option<Vec<SlideText>>,
    ) -> ClientSearchRequest {
        ClientSearchRequest {
            product_name: product_name.into(),
            conversation_transcript: self.formatted_transcript,
            conversation_problem_hint: Some(self.problem),
            conversation_solution_hint: Some(self.solution),
            pdf_slides_text: slides,
        }
    }
}

/// Generation client bound to the configured structuring model.
pub fn structure_generator(config: &AppConfig) -> Result<MistralClient> {
    let key = require_api_key(&config.mistral.api_key_env, "Mistral")?;
    Ok(
        MistralClient::new(&key, &config.mistral, config.matching.call_timeout())?
            .with_chat_model(&config.mistral.structure_model),
    )
}

/// Ask the generation gateway to structure `transcript`.
///
/// The voice transcript is the primary source; slide text is context only.
/// The reply must contain a JSON object with non-empty `problem`, `solution`
/// and `formattedTranscript` fields.
#[instrument(skip_all, fields(transcript_len = transcript.len(), slides = slides.len()))]
pub async fn structure_interview(
    generator: &dyn GenerationGateway,
    transcript: &str,
    slides: &[SlideText],
    markers: &RoleMarkers,
    call_timeout: Duration,
) -> Result<StructuredInterview> {
    if transcript.trim().is_empty() && slides.is_empty() {
        return Err(PitchMatchError::validation(
            "no transcript or slide content to structure",
        ));
    }

    let prompt = structure_prompt(transcript, slides, markers);
    let reply = run_step(STEP, call_timeout, generator.generate(&prompt)).await?;
    let structured = parse_reply(&reply)?;
    debug!(
        transcript_lines = structured.formatted_transcript.lines().count(),
        "interview structured"
    );
    Ok(structured)
}

fn structure_prompt(transcript: &str, slides: &[SlideText], markers: &RoleMarkers) -> String {
    let (ai, founder) = (&markers.prompter, &markers.responder);
    let transcript = if transcript.trim().is_empty() {
        "No voice transcript provided."
    } else {
        transcript.trim()
    };

    let mut prompt = format!(
        "You are analyzing a startup based on the founder's voice interview. \
         The voice transcript is the PRIMARY SOURCE for the problem and solution.\n\n\
         PRIMARY SOURCE - VOICE TRANSCRIPT FROM FOUNDER:\n{transcript}\n\n\
         SECONDARY SOURCE - SUPPORTING DOCUMENTS (context only):\n"
    );
    if slides.is_empty() {
        prompt.push_str("No document content provided.\n");
    }
    for slide in slides {
        let text = if slide.text.trim().is_empty() {
            "No text found on this page."
        } else {
            slide.text.trim()
        };
        let _ = write!(
            prompt,
            "Document {}, Page {}:\n{text}\n\n",
            slide.filename, slide.page_number
        );
    }

    let _ = write!(
        prompt,
        "\nIf the transcript and the documents describe different companies, use the transcript.\n\n\
         Provide three things:\n\
         1. problem: the specific problem the founder's company solves (1-3 sentences).\n\
         2. solution: the founder's product or service (1-3 sentences).\n\
         3. formattedTranscript: the transcript rewritten as an interview of 4-6 exchanges, \
         one line per turn, each line starting with \"{ai}: \" for the interviewer's questions \
         or \"{founder}: \" for the founder's answers taken from the transcript, \
         always alternating and starting with \"{ai}: \".\n\n\
         Respond ONLY with a JSON object of this exact shape, without markdown:\n\
         {{\"problem\": \"...\", \"solution\": \"...\", \"formattedTranscript\": \"{ai}: ...\\n{founder}: ...\"}}"
    );
    prompt
}

/// Pull the first `{ ... }` span out of a reply and validate it.
fn parse_reply(reply: &str) -> Result<StructuredInterview> {
    static JSON_OBJECT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));

    let json = JSON_OBJECT_RE
        .find(reply)
        .map_or(reply, |m| m.as_str());

    let raw: RawInterview = serde_json::from_str(json)
        .map_err(|e| PitchMatchError::upstream(STEP, format!("reply is not valid JSON: {e}")))?;

    let field = |name: &str, value: Option<String>| -> Result<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PitchMatchError::upstream(STEP, format!("reply is missing `{name}`")))
    };

    Ok(StructuredInterview {
        problem: field("problem", raw.problem)?,
        solution: field("solution", raw.solution)?,
        formatted_transcript: field("formattedTranscript", raw.formatted_transcript)?,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInterview {
    problem: Option<String>,
    solution: Option<String>,
    formatted_transcript: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use pitchmatch_transcript::{NormalizeOptions, normalize};

    struct Canned(&'static str);

    #[async_trait]
    impl GenerationGateway for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    const REPLY: &str = r#"Sure! Here you go:
```json
{"problem": "Users lose notes.", "solution": "Cloud sync.", "formattedTranscript": "AI: What problem?\nFounder: Users lose notes.\nAI: How?\nFounder: Cloud sync."}
```"#;

    fn slide() -> SlideText {
        SlideText {
            page_number: 2,
            filename: "deck.pdf".into(),
            text: "Market: students".into(),
        }
    }

    #[test]
    fn prompt_mentions_markers_and_slides() {
        let markers = RoleMarkers {
            prompter: "Interviewer".into(),
            responder: "Guest".into(),
        };
        let prompt = structure_prompt("we sync notes", &[slide()], &markers);
        assert!(prompt.contains("we sync notes"));
        assert!(prompt.contains("Document deck.pdf, Page 2:\nMarket: students"));
        assert!(prompt.contains("\"Interviewer: \""));
        assert!(prompt.contains("\"Guest: \""));
    }

    #[test]
    fn json_is_extracted_from_chatty_replies() {
        let parsed = parse_reply(REPLY).unwrap();
        assert_eq!(parsed.problem, "Users lose notes.");
        assert!(parsed.formatted_transcript.starts_with("AI: What problem?"));
    }

    #[test]
    fn missing_fields_are_upstream_errors() {
        let err = parse_reply(r#"{"problem": "x", "solution": "  "}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "upstream error during structure_interview: reply is missing `solution`"
        );
        assert!(parse_reply("no json at all").is_err());
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_a_call() {
        struct Unreachable;

        #[async_trait]
        impl GenerationGateway for Unreachable {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                panic!("generator must not be called");
            }
        }

        let err = structure_interview(
            &Unreachable,
            "   ",
            &[],
            &RoleMarkers::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PitchMatchError::Validation { .. }));
    }

    #[tokio::test]
    async fn structured_interview_normalizes_into_enough_facts() {
        let structured = structure_interview(
            &Canned(REPLY),
            "we built a note app that syncs",
            &[],
            &RoleMarkers::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let request = structured.into_request("NoteApp", None);
        assert_eq!(request.conversation_problem_hint.as_deref(), Some("Users lose notes."));

        let facts = normalize(
            &request.conversation_transcript,
            request.conversation_problem_hint.as_deref(),
            request.conversation_solution_hint.as_deref(),
            None,
            &NormalizeOptions::default(),
        )
        .unwrap();
        assert_eq!(facts.len(), 4);
    }
}
