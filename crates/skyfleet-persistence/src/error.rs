//! Persistence layer error types

use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },

    #[error("Duplicate {entity_type} for key {key}")]
    Duplicate { entity_type: String, key: String },

    #[error("Query timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid query parameters: {0}")]
    InvalidQuery(String),
}

impl PersistenceError {
    pub fn not_found(entity_type: &str, key: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity_type: &str, key: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
        }
    }

    /// Unique-key violation raised by the store
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Transient failures worth retrying at a higher layer
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
