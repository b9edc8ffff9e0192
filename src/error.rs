// 🚨 Error taxonomy - fatal document errors vs. recovered line/field problems
//
// Line-level and field-level problems never show up here: malformed lines
// are counted and missing header fields are flagged on the ParsedStatement.

use thiserror::Error;

/// Document could not be opened at all. Aborts the parse for that document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("document is empty")]
    Empty,

    #[error("document is not a valid PDF: {0}")]
    NotPdf(String),

    #[error("document is password protected; supply its password")]
    PasswordRequired,

    #[error("the supplied document password is incorrect")]
    IncorrectPassword,

    #[error("document has no pages")]
    NoPages,
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("document is {size} bytes, limit is {max}")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("bank '{0}' is disabled for parsing")]
    UnsupportedBank(String),

    #[error("parse exceeded the {secs}s timeout")]
    TimeoutExceeded { secs: u64 },

    #[error("statement was already uploaded for this user")]
    DuplicateStatement,

    #[error("unknown category '{0}'")]
    InvalidCategory(String),

    #[error("merchant is empty after normalization")]
    EmptyMerchant,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("could not serialize statement: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("parse worker stopped before producing a result")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, StatementError>;

impl StatementError {
    /// Stable machine-readable code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            StatementError::UnsupportedBank(_) => "PARSE_001",
            StatementError::Extraction(ExtractionFailure::PasswordRequired) => "PARSE_003",
            StatementError::Extraction(ExtractionFailure::IncorrectPassword) => "PARSE_004",
            StatementError::Extraction(_) => "PARSE_002",
            StatementError::WorkerLost => "PARSE_005",
            StatementError::DuplicateStatement => "PARSE_006",
            StatementError::TimeoutExceeded { .. } => "PARSE_007",
            StatementError::DocumentTooLarge { .. } => "API_002",
            StatementError::InvalidCategory(_) | StatementError::EmptyMerchant => "API_007",
            StatementError::Storage(_) => "DB_001",
            StatementError::Serialization(_) => "DB_002",
        }
    }

    /// True for errors caused by the request rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            StatementError::Storage(_)
                | StatementError::Serialization(_)
                | StatementError::WorkerLost
        )
    }
}
