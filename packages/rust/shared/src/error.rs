//! Error types for pitchmatch.
//!
//! Library crates use [`PitchMatchError`] via `thiserror`.
//! App crates (cli/server) wrap this with `color-eyre` for rich diagnostics,
//! and the server maps [`PitchMatchError::http_status`] onto responses.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::PipelineStep;

/// Top-level error type for all pitchmatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PitchMatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller input is unusable (missing product name, too few facts, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An embedding, generation, or vector index call failed.
    #[error("upstream error during {step}: {message}")]
    Upstream { step: PipelineStep, message: String },

    /// The vector index returned a record missing required payload fields.
    #[error("data consistency error: {message}")]
    DataConsistency { message: String },

    /// A gateway call or the whole request ran past its time budget.
    #[error("deadline exceeded after {after:?}{}", during(.step))]
    DeadlineExceeded {
        step: Option<PipelineStep>,
        after: Duration,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn during(step: &Option<PipelineStep>) -> String {
    step.map(|s| format!(" during {s}")).unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PitchMatchError>;

/// Coarse classification used by callers that only care about who is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Upstream,
    DataConsistency,
    Internal,
}

impl PitchMatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an upstream error tagged with the step that failed.
    pub fn upstream(step: PipelineStep, msg: impl Into<String>) -> Self {
        Self::Upstream {
            step,
            message: msg.into(),
        }
    }

    /// Create a data consistency error from any displayable message.
    pub fn data_consistency(msg: impl Into<String>) -> Self {
        Self::DataConsistency {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Re-tag an upstream error with a different step, leaving other variants untouched.
    pub fn at_step(self, step: PipelineStep) -> Self {
        match self {
            Self::Upstream { message, .. } => Self::Upstream { step, message },
            Self::DeadlineExceeded { after, .. } => Self::DeadlineExceeded {
                step: Some(step),
                after,
            },
            other => other,
        }
    }

    /// Which side of the boundary caused this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Upstream { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Upstream,
            Self::DataConsistency { .. } => ErrorKind::DataConsistency,
            Self::Config { .. } | Self::Io { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status code a request boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::DeadlineExceeded { .. } => 504,
            Self::Upstream { .. } | Self::DataConsistency { .. } => 502,
            Self::Config { .. } | Self::Io { .. } => 500,
        }
    }
}
