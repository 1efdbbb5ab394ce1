use thiserror::Error;

/// Main error type for the dispatch engine
#[derive(Error, Debug)]
pub enum DrayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    // Locking errors
    #[error("Timed out acquiring {scope} lock for {key}")]
    LockTimeout { scope: &'static str, key: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DrayError
pub type Result<T> = std::result::Result<T, DrayError>;

/// Specific error types for the assignment ledger
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Assignment already recorded for order {order_ref}")]
    DuplicateAssignment { order_ref: String },

    #[error("Assignment references unknown agent {agent_id}")]
    UnknownAgent { agent_id: i64 },
}

impl From<LedgerError> for DrayError {
    fn from(err: LedgerError) -> Self {
        DrayError::Ledger(err.to_string())
    }
}
