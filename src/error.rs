//! Error type shared by the planner library.

use thiserror::Error;

/// Everything that can abort a planning run or a ledger operation.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown shift label `{label}`")]
    UnknownShift { label: String },

    #[error("Invalid shift catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid edit for day {day}: {reason}")]
    InvalidEdit { day: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
