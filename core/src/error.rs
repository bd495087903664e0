//! Error taxonomy for the totals engine and the service facade.

use thiserror::Error;

/// Errors surfaced by recompute and entry-mutation paths.
///
/// Storage errors keep their `anyhow` chain so callers can log the full
/// context; nothing in the core turns them into default values.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage read error: {0:#}")]
    Read(anyhow::Error),

    #[error("Storage write error: {0:#}")]
    Write(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn validation(err: impl std::fmt::Display) -> Self {
        EngineError::Validation(err.to_string())
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
