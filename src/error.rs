//! Error types for trust level transitions

use thiserror::Error;

/// Errors raised while evaluating or committing a trust level change
#[derive(Debug, Error)]
pub enum PromotionError {
    /// Target level outside the recognized trust levels
    #[error("Invalid trust level {0}")]
    InvalidTrustLevel(i32),

    /// Refused demotion of a user who still qualifies for their level
    #[error("{0}")]
    InvalidAccess(String),

    /// Validation or storage failure inside the transition commit
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// A statistics, calculator or requirements collaborator failed
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl PromotionError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, PromotionError::InvalidAccess(_))
    }
}

impl From<sqlx::Error> for PromotionError {
    fn from(e: sqlx::Error) -> Self {
        PromotionError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromotionError>;
