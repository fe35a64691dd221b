//! Application configuration for pitchmatch.
//!
//! User config lives at `~/.pitchmatch/pitchmatch.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file, only the names of the env vars holding them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PitchMatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pitchmatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pitchmatch";

// ---------------------------------------------------------------------------
// Config structs (matching pitchmatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vector index connection.
    #[serde(default)]
    pub index: IndexConfig,

    /// Mistral (embedding + generation) settings.
    #[serde(default)]
    pub mistral: MistralConfig,

    /// Prompt templates.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Matching pipeline knobs.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Problem corpus ingestion filters.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the Qdrant HTTP API.
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Name of the env var holding the index API key (optional for local instances).
    #[serde(default = "default_index_key_env")]
    pub api_key_env: String,

    /// Collection holding the collected problem records.
    #[serde(default = "default_problem_collection")]
    pub problem_collection: String,

    /// Embedding dimensionality; must match the collection's configured size.
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// Distance metric used when a collection is (re)created.
    #[serde(default)]
    pub distance: Distance,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            api_key_env: default_index_key_env(),
            problem_collection: default_problem_collection(),
            vector_size: default_vector_size(),
            distance: Distance::default(),
        }
    }
}

fn default_index_url() -> String {
    "http://localhost:6333".into()
}
fn default_index_key_env() -> String {
    "QDRANT_API_KEY".into()
}
fn default_problem_collection() -> String {
    "problem_collection".into()
}
fn default_vector_size() -> usize {
    1024
}

/// Vector distance metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

/// `[mistral]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_mistral_key_env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(default = "default_mistral_base_url")]
    pub base_url: String,

    /// Embedding model.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Chat model used for summaries, queries, and messages.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Chat model used to structure raw interviews.
    #[serde(default = "default_structure_model")]
    pub structure_model: String,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_mistral_key_env(),
            base_url: default_mistral_base_url(),
            embed_model: default_embed_model(),
            chat_model: default_chat_model(),
            structure_model: default_structure_model(),
        }
    }
}

fn default_mistral_key_env() -> String {
    "MISTRAL_API_KEY".into()
}
fn default_mistral_base_url() -> String {
    "https://api.mistral.ai/v1".into()
}
fn default_embed_model() -> String {
    "mistral-embed".into()
}
fn default_chat_model() -> String {
    "mistral-medium-latest".into()
}
fn default_structure_model() -> String {
    "mistral-small-latest".into()
}

/// `[prompts]` section.
///
/// Placeholders: `{description}` (joined facts), `{summary}` (project summary),
/// `{problem}` (candidate description), `{product}` (product name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_summary_prompt")]
    pub summary: String,

    #[serde(default = "default_search_query_prompt")]
    pub search_query: String,

    #[serde(default = "default_personalized_message_prompt")]
    pub personalized_message: String,

    #[serde(default = "default_problem_summary_prompt")]
    pub problem_summary: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            summary: default_summary_prompt(),
            search_query: default_search_query_prompt(),
            personalized_message: default_personalized_message_prompt(),
            problem_summary: default_problem_summary_prompt(),
        }
    }
}

fn default_summary_prompt() -> String {
    "Summarize the following information about a product called {product}. \
     Describe the problem it addresses, who has that problem, and how the product solves it, \
     in one short paragraph.\n\n{description}"
        .into()
}
fn default_search_query_prompt() -> String {
    "You write search queries for a database of online posts in which people describe \
     problems they struggle with. Given the product summary below, write a single short \
     paragraph, phrased the way a frustrated user would describe their problem, that would \
     match posts from people who need this product. Reply with the query text only.\n\n{summary}"
        .into()
}
fn default_personalized_message_prompt() -> String {
    "Write a short, friendly, non-pushy message replying to the person who wrote the post \
     below. Acknowledge their specific problem and explain how the product described after \
     it could help. Do not invent features.\n\nPost:\n{problem}\n\nProduct:\n{summary}"
        .into()
}
fn default_problem_summary_prompt() -> String {
    "Summarize the problem described in this post in one or two sentences.\n\n{problem}".into()
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Number of nearest neighbors requested per search.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Maximum concurrent enrichment tasks (defaults to the result limit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrich_concurrency: Option<usize>,

    /// Per gateway call timeout in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Whole-request deadline in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Whether client facts are persisted into a per-product collection.
    #[serde(default)]
    pub persist_client_facts: bool,

    /// Minimum number of fact statements required to proceed.
    #[serde(default = "default_min_facts")]
    pub min_facts: usize,

    /// Role marker for the asking side of a transcript.
    #[serde(default = "default_prompter_marker")]
    pub prompter_marker: String,

    /// Role marker for the answering side of a transcript.
    #[serde(default = "default_responder_marker")]
    pub responder_marker: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            result_limit: default_result_limit(),
            enrich_concurrency: None,
            call_timeout_secs: default_call_timeout_secs(),
            deadline_secs: default_deadline_secs(),
            persist_client_facts: false,
            min_facts: default_min_facts(),
            prompter_marker: default_prompter_marker(),
            responder_marker: default_responder_marker(),
        }
    }
}

impl MatchingConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

fn default_result_limit() -> usize {
    4
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_deadline_secs() -> u64 {
    180
}
fn default_min_facts() -> usize {
    3
}
fn default_prompter_marker() -> String {
    "AI".into()
}
fn default_responder_marker() -> String {
    "Founder".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".into()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Keyword filters, one per problem category.
    #[serde(default)]
    pub categories: Vec<CategoryFilter>,
}

/// `[[ingest.categories]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryFilter {
    /// Category label stored on matching records.
    pub name: String,
    /// Source communities (subreddits) belonging to this category.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Keywords; a post matches when its title or text contains any of them.
    #[serde(default)]
    pub keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pitchmatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PitchMatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pitchmatch/pitchmatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PitchMatchError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| PitchMatchError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PitchMatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PitchMatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PitchMatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.index.vector_size == 0 {
        return Err(PitchMatchError::config("index.vector_size must be greater than 0"));
    }
    if config.matching.result_limit == 0 {
        return Err(PitchMatchError::config("matching.result_limit must be at least 1"));
    }
    if config.index.problem_collection.trim().is_empty() {
        return Err(PitchMatchError::config("index.problem_collection must not be empty"));
    }
    Url::parse(&config.index.url).map_err(|e| {
        PitchMatchError::config(format!("index.url '{}' is not a valid URL: {e}", config.index.url))
    })?;
    Ok(())
}

/// Read a required API key from the env var named by `var_name`.
pub fn require_api_key(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PitchMatchError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read an optional API key; unset or blank means "no key".
pub fn optional_api_key(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

/// Check that the keys needed for a full pipeline run are present.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    require_api_key(&config.mistral.api_key_env, "Mistral").map(|_| ())
}
