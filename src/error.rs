use thiserror::Error;

/// Invalid scan configuration, always reported before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("at least one scheme (http, https) is required")]
    NoSchemes,

    #[error("at least one request path is required")]
    NoPaths,

    #[error("invalid request path {0:?}: whitespace and control characters are not allowed")]
    InvalidPath(String),

    #[error("timeout must be positive")]
    InvalidTimeout,

    #[error("concurrency must be between 1 and {}", tokio::sync::Semaphore::MAX_PERMITS)]
    InvalidConcurrency,

    #[error("max_bytes must be at least 1")]
    InvalidMaxBytes,

    #[error("status class {0} is not one of 2, 3, 4, 5")]
    InvalidStatusClass(u16),

    #[error("status code {0} is not a 3-digit code")]
    InvalidStatusCode(u16),

    #[error("match_substring and match_regex are mutually exclusive")]
    ConflictingMatch,

    #[error("invalid match pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors surfaced by the library outside of per-probe failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
