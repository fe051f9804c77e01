use thiserror::Error;

pub type AttributionResult<T> = Result<T, AttributionError>;

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input invariant violated: {} sessions with missing channel group (e.g. {})", .sessions.len(), sample(.sessions))]
    MissingChannelGroup { sessions: Vec<String> },

    #[error("Input invariant violated: {} sessions with multiple last event dates (e.g. {})", .sessions.len(), sample(.sessions))]
    ConflictingLastEventDate { sessions: Vec<String> },

    #[error("Input invariant violated: {} sessions with multiple purchase flags (e.g. {})", .sessions.len(), sample(.sessions))]
    ConflictingPurchaseFlag { sessions: Vec<String> },

    #[error("Input invariant violated: {reason} in {} sessions (e.g. {})", .sessions.len(), sample(.sessions))]
    InvalidChannelLabel { reason: String, sessions: Vec<String> },

    #[error("Input invariant violated: {} sessions with negative or non-finite revenue (e.g. {})", .sessions.len(), sample(.sessions))]
    InvalidRevenue { sessions: Vec<String> },

    #[error("Input table is empty")]
    EmptyInput,

    #[error("Conversion count mismatch after {stage}: expected {expected}, found {found}")]
    ConversionCountMismatch {
        stage: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate conversion id after {stage}: {conversion_id} assigned to {occurrences} chains")]
    DuplicateConversionId {
        stage: &'static str,
        conversion_id: String,
        occurrences: usize,
    },

    #[error("Row count changed by {stage}: {before} chains in, {after} chains out")]
    RowCountChanged {
        stage: &'static str,
        before: usize,
        after: usize,
    },

    #[error("Attribution solver error: {0}")]
    Solver(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn sample(sessions: &[String]) -> String {
    sessions
        .iter()
        .take(5)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}
