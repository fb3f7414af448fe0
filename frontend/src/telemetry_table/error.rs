use std::path::PathBuf;

use thiserror::Error;

/// Failure of one request against the data service.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read table config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid table config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid table config: {0}")]
    Invalid(String),
}
