//! Analyzer backend error type, in the sibling `LlmError` idiom.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalyzerError::Timeout
        } else {
            AnalyzerError::Network(err.to_string())
        }
    }
}
