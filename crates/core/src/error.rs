//! Ledger error model.

use thiserror::Error;

use crate::issue::ValidationIssue;

/// Result type used across the ledger engine.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Keep this focused on deterministic, business/domain failures. Expected
/// business-rule violations travel as issue lists inside a validation outcome,
/// not as errors; `ValidationFailed` is reserved for rejected mutations and
/// transitions whose preconditions did not hold.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A mutation or transition was rejected. Carries every blocking and
    /// advisory issue; callers must surface the whole list, never just the
    /// first item.
    #[error("validation failed with {} issue(s)", .0.len())]
    ValidationFailed(Vec<ValidationIssue>),

    /// Optimistic concurrency check failed: the caller acted on a stale
    /// sheet version. Re-fetch and retry; never auto-merge.
    #[error("concurrency conflict on sheet {sheet_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        sheet_id: String,
        expected: u64,
        actual: u64,
    },

    /// Role-gated operation invoked by a non-privileged actor.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Stored state no longer matches its recorded fingerprint. Logged loudly
    /// by callers and never silently repaired.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// All issues carried by a `ValidationFailed`, empty otherwise.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::ValidationFailed(issues) => issues,
            _ => &[],
        }
    }
}
