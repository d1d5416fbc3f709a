use thiserror::Error;

/// Rejected input. Raised before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid amount: '{0}' is not a decimal number in range")]
    InvalidAmount(String),

    #[error("No card selected for this transaction")]
    MissingCard,

    #[error("Merchant name must not be empty")]
    EmptyName,

    #[error("Transaction date is in the future")]
    FutureDate,

    #[error("Reward multiplier for '{0}' must not be negative")]
    NegativeMultiplier(String),

    #[error("Card already has a reward rule for '{0}'")]
    DuplicateRule(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Remote(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
