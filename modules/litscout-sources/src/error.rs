use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("API error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported source: {0}")]
    Unsupported(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(String),
}

impl SourceError {
    /// Whether a retry of the same request could plausibly succeed.
    /// Rate limits, server errors, timeouts, and truncated bodies are
    /// transient; auth and 4xx errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            SourceError::Timeout | SourceError::Network(_) | SourceError::Decode(_) => true,
            SourceError::Unsupported(_) | SourceError::MissingApiKey(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SourceError::Http { status: 429, message: String::new() }.is_transient());
        assert!(SourceError::Http { status: 503, message: String::new() }.is_transient());
        assert!(!SourceError::Http { status: 403, message: String::new() }.is_transient());
        assert!(!SourceError::Http { status: 404, message: String::new() }.is_transient());
        assert!(SourceError::Timeout.is_transient());
        assert!(!SourceError::MissingApiKey("core".into()).is_transient());
    }
}
