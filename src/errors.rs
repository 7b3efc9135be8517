use thiserror::Error;

/// Failures of the fetch collaborator. Every variant is retryable up to the
/// configured bound; `RetriesExhausted` is what the caller sees afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn transport(url: &str, reason: impl ToString) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Problems that make a run (or a part of it) impossible to start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
