//! Transcript normalization: raw conversation + hints + slides → fact statements.
//!
//! A transcript is a sequence of lines, each starting with one of two role
//! markers (`AI:` asks, `Founder:` answers by default). Only a prompter line
//! immediately followed by a responder line forms a question/answer fact; every
//! other adjacency is skipped one line at a time. Lines without a marker are
//! dropped before pairing.

mod slides;

use tracing::{debug, instrument};

use pitchmatch_shared::{FactStatement, MatchingConfig, PitchMatchError, Result, SlideText};

pub use slides::clean_slide;

/// Label used for the problem hint fact.
pub const PROBLEM_HINT_LABEL: &str = "productHint";

/// Label used for the solution hint fact.
pub const SOLUTION_HINT_LABEL: &str = "productSolution";

/// Default minimum number of facts needed to run a match.
pub const DEFAULT_MIN_FACTS: usize = 3;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// The two speaker markers recognised in a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMarkers {
    /// Marker of the asking side (without the trailing colon).
    pub prompter: String,
    /// Marker of the answering side (without the trailing colon).
    pub responder: String,
}

impl Default for RoleMarkers {
    fn default() -> Self {
        Self {
            prompter: "AI".into(),
            responder: "Founder".into(),
        }
    }
}

/// Options for [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub markers: RoleMarkers,
    /// Fewer facts than this is a validation error.
    pub min_facts: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            markers: RoleMarkers::default(),
            min_facts: DEFAULT_MIN_FACTS,
        }
    }
}

impl From<&MatchingConfig> for NormalizeOptions {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            markers: RoleMarkers {
                prompter: config.prompter_marker.clone(),
                responder: config.responder_marker.clone(),
            },
            min_facts: config.min_facts,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Prompter,
    Responder,
}

/// Turn a conversation and its side inputs into ordered fact statements.
///
/// Order: question/answer pairs, then the problem hint, the solution hint,
/// then one fact per slide. Fails with a validation error when fewer than
/// `opts.min_facts` facts result.
#[instrument(skip_all, fields(transcript_len = raw_transcript.len()))]
pub fn normalize(
    raw_transcript: &str,
    problem_hint: Option<&str>,
    solution_hint: Option<&str>,
    slides: Option<&[SlideText]>,
    opts: &NormalizeOptions,
) -> Result<Vec<FactStatement>> {
    let mut facts = pair_dialogue(raw_transcript, &opts.markers);
    let pairs = facts.len();

    if let Some(hint) = non_blank(problem_hint) {
        facts.push(FactStatement::hint(PROBLEM_HINT_LABEL, hint));
    }
    if let Some(hint) = non_blank(solution_hint) {
        facts.push(FactStatement::hint(SOLUTION_HINT_LABEL, hint));
    }

    for slide in slides.unwrap_or_default() {
        if let Some(text) = clean_slide(&slide.text) {
            facts.push(FactStatement::slide(text));
        } else {
            debug!(page = slide.page_number, file = %slide.filename, "slide has no body text");
        }
    }

    debug!(pairs, total = facts.len(), "transcript normalized");

    if facts.len() < opts.min_facts {
        return Err(PitchMatchError::validation(format!(
            "could not extract enough product information: {} fact(s) found, at least {} required",
            facts.len(),
            opts.min_facts
        )));
    }

    Ok(facts)
}

/// Pair adjacent prompter → responder lines into question/answer facts.
///
/// Never fails; unusable lines are simply skipped.
pub fn pair_dialogue(raw_transcript: &str, markers: &RoleMarkers) -> Vec<FactStatement> {
    let parsed: Vec<(Role, &str)> = raw_transcript
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| classify(line, markers))
        .collect();

    let mut facts = Vec::new();
    let mut i = 0;
    while i + 1 < parsed.len() {
        match (parsed[i], parsed[i + 1]) {
            ((Role::Prompter, question), (Role::Responder, answer)) => {
                facts.push(FactStatement::qa_pair(question, answer));
                i += 2;
            }
            _ => i += 1,
        }
    }
    facts
}

/// Split a line into its role and the text after `<marker>:`.
fn classify<'a>(line: &'a str, markers: &RoleMarkers) -> Option<(Role, &'a str)> {
    let strip = |marker: &str| {
        line.strip_prefix(marker)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    };

    if let Some(text) = strip(&markers.prompter) {
        Some((Role::Prompter, text))
    } else {
        strip(&markers.responder).map(|text| (Role::Responder, text))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
