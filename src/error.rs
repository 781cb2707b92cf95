//! Error types for Leadflow
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Leadflow
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Consumer not found in storage
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// Lead not found in the pool
    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    /// No assignment exists for the (consumer, lead) pair
    #[error("Assignment not found: consumer={consumer_id} lead={lead_id}")]
    AssignmentNotFound { consumer_id: String, lead_id: String },

    /// Per-consumer critical section could not be entered in time
    #[error("Timed out after {waited_ms}ms waiting for consumer lock: {consumer_id}")]
    LockTimeout { consumer_id: String, waited_ms: u64 },

    /// Cursor moved between read and commit (another writer won)
    #[error("Cursor changed concurrently for consumer: {consumer_id}")]
    CursorConflict { consumer_id: String },

    /// Missing or wrong shared-secret credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller supplied a malformed value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IPC communication error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LeadflowError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeadflowError::LockTimeout { .. } | LeadflowError::CursorConflict { .. })
    }
}

/// Result type alias for Leadflow operations
pub type Result<T> = std::result::Result<T, LeadflowError>;
