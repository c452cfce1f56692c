use thiserror::Error;

/// Domain errors surfaced to callers with a specific code.
///
/// Channel delivery failures are deliberately absent: they are absorbed into
/// the DeliveryReport as data and never raised as a request failure.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Unknown signal, responder, or notification id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal status transition, invalid location, or an escalation level
    /// lower than the current one.
    #[error("validation error: {0}")]
    Validation(String),

    /// Conditional update precondition failed — the record was mutated
    /// concurrently. Caller must re-read and retry.
    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// Repository-internal failure.
    #[error("repository error: {0}")]
    Repository(String),
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;
