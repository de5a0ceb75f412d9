//! Error type shared by every stage of a generation run.
//!
//! Each variant carries enough context (offending field, fragment index, lengths)
//! for a caller to decide whether to fix the policy, loosen the budget, or switch
//! dialect. Nothing in the pipeline retries on its own.

use thiserror::Error;

use crate::policy::TrimAlgorithm;
use crate::services::encoder::Dialect;

/// Failure of a single generation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// The policy's selection or filter configuration is malformed.
    #[error("Invalid policy field '{field}': {reason}")]
    InvalidPolicy { field: &'static str, reason: String },

    /// The selected items do not yield a usable pattern.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No subset of fragments respecting the minimum piece length fits the budget.
    #[error(
        "Cannot trim to {budget} bytes without violating the {floor}-byte fragment floor \
         (smallest achievable total is {smallest} bytes)"
    )]
    TrimExhausted { budget: usize, floor: usize, smallest: usize },

    /// The pattern is over budget and the strategy may not (or can no longer) remove anything.
    #[error("Pattern is {total} bytes, over the {budget}-byte budget ({algorithm:?} trimming)")]
    BudgetExceeded { total: usize, budget: usize, algorithm: TrimAlgorithm },

    /// A qualifier or mask cannot be expressed in the requested dialect.
    #[error("Fragment {fragment} cannot be encoded as {dialect}: {reason}")]
    UnsupportedConstruct { dialect: Dialect, fragment: usize, reason: String },

    /// The attached signature sink rejected a finished signature.
    #[error("Publication failed: {0}")]
    Publication(String),
}

/// Convenience result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

impl GenerationError {
    pub(crate) fn invalid_policy(field: &'static str, reason: impl Into<String>) -> Self {
        GenerationError::InvalidPolicy { field, reason: reason.into() }
    }
}
