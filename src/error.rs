use thiserror::Error;

/// Failure fetching a batch from the upstream API. The client performs no
/// retries — pollers retry on their next scheduled tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: timeout, DNS, connection reset.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// Upstream answered with a non-2xx status or an undecodable body.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // Non-2xx statuses are mapped explicitly by the client; anything
        // arriving through this path is transport-level.
        FetchError::Unreachable(e.to_string())
    }
}

/// A payload that cannot be converted into a pipeline entity. The record is
/// skipped and counted — never persisted with substituted defaults.
#[derive(Debug, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct MappingError {
    pub field: &'static str,
    pub reason: String,
}

impl MappingError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }

    pub fn missing(field: &'static str) -> Self {
        Self { field, reason: "missing or not of the expected type".to_string() }
    }
}

/// Failure at the store boundary. A `StoreError` from a bulk upsert means the
/// whole call's transaction rolled back — zero rows committed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Process-level umbrella used by `main` and the orchestrator.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backfill failed: {0}")]
    Backfill(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
