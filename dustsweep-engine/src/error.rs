//! Engine error types.

use dustsweep_domain::DomainError;
use thiserror::Error;

/// Errors produced by the pure fee, sequencing and planning logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed numeric or structural input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No wrapped native asset is known for the chain
    #[error("Unsupported chain: no wrapped native asset for chain {0}")]
    UnsupportedChain(u64),

    /// `insert_at` received different numbers of items and indices
    #[error("Insertion count mismatch: {items} items, {indices} indices")]
    InsertionCountMismatch { items: usize, indices: usize },

    /// `insert_at` index past the end of the sequence
    #[error("Invalid insertion index {index} for sequence of length {len}")]
    InvalidInsertionIndex { index: usize, len: usize },

    /// Domain validation error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
