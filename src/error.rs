use serde::Serialize;
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a single record could not be rescued. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no extraction strategy produced enough content")]
    NoContentExtracted,

    #[error("no archived snapshot found")]
    NoSnapshotFound,

    #[error("no archived snapshot produced enough content")]
    RecoveryExhausted,

    #[error("failed to persist article: {0}")]
    Persistence(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "InvalidUrl",
            FetchError::Network(_) => "NetworkError",
            FetchError::NoContentExtracted => "NoContentExtracted",
            FetchError::NoSnapshotFound => "NoSnapshotFound",
            FetchError::RecoveryExhausted => "RecoveryExhausted",
            FetchError::Persistence(_) => "PersistenceError",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        let reason = if e.is_timeout() {
            "timeout".to_string()
        } else if e.is_connect() {
            "connection failed".to_string()
        } else if e.is_redirect() {
            "too many redirects".to_string()
        } else {
            e.to_string()
        };
        FetchError::Network(reason)
    }
}

impl From<AppError> for FetchError {
    fn from(e: AppError) -> Self {
        FetchError::Persistence(e.to_string())
    }
}
