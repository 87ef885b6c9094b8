//! Error types for the interoperability record store.

use thiserror::Error;

/// Result type alias for record store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// A record with the same identity already exists. The orchestrator
    /// probes before storing, so hitting this is an invariant violation,
    /// not a condition to recover from.
    #[error("record already exists: {0}")]
    Conflict(String),

    /// Update targeted a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),
}
