//! Error types for flowstatsyncd

use fsfw_openflow::StatsQueryError;
use thiserror::Error;

/// Flow statistics daemon errors
#[derive(Error, Debug)]
pub enum FlowStatError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted cache image I/O error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persisted cache image has an unusable format
    #[error("Cache image format error: {0}")]
    CacheFormat(String),

    /// Stats query error
    #[error("Stats query error: {0}")]
    Query(#[from] StatsQueryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

/// Result type for flowstatsyncd operations
pub type Result<T> = std::result::Result<T, FlowStatError>;
