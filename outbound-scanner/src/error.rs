use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Renderer unavailable: {0}")]
    Renderer(String),

    #[error("Not supported by this renderer: {0}")]
    Unsupported(&'static str),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Only a dead rendering engine ends a crawl. Everything else is
    /// recovered per page or per element.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Renderer(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
