//! Shared types, error model, and configuration for pitchmatch.
//!
//! This crate is the foundation depended on by all other pitchmatch crates.
//! It provides:
//! - [`PitchMatchError`], the unified error type
//! - Domain types ([`FactStatement`], [`ProblemRecord`], [`MatchCandidate`], [`EnrichedResult`])
//! - Configuration ([`AppConfig`], [`MatchingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryFilter, Distance, IndexConfig, IngestConfig, MatchingConfig, MistralConfig,
    PromptsConfig, ServerConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, optional_api_key, require_api_key, validate_api_keys, validate_config,
};
pub use error::{ErrorKind, PitchMatchError, Result};
pub use types::{
    ClientSearchRequest, EnrichedResult, FactOrigin, FactStatement, MatchCandidate, PipelineStep,
    ProblemRecord, ProblemView, SlideText,
};
