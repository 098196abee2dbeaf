//! Errors raised while loading, mutating, or persisting the ledger.

/// Ledger-level failures. Integrity findings are not errors; they live in
/// the reconcile crate's check report.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger not found: {0}")]
    NotFound(String),

    #[error("{path}: parse error: {message}")]
    Parse { path: String, message: String },

    #[error("corrupted ledger: {0}")]
    Corrupt(String),

    #[error("failed to persist ledger: {0}")]
    Persist(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("migration group not found: {0}")]
    GroupNotFound(String),

    #[error("no ledger entry for `{address}` in group `{group}`")]
    EntryNotFound { group: String, address: String },

    #[error("ledger has no target project name (set projects.project or projects.target)")]
    MissingProjectName,

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
}

impl LedgerError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether an operator can recover by pointing at the right file or
    /// entry, as opposed to fixing a malformed document.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::GroupNotFound(_) | Self::EntryNotFound { .. }
        )
    }
}
