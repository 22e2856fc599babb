//! Gemini-specific errors.

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use thiserror::Error;

/// Gemini-specific errors.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// HTTP request failed.
    #[error(transparent)]
    Http(HttpError),

    /// The API key was rejected.
    ///
    /// Google answers 400 rather than 401 for a malformed or revoked key.
    #[error("API key rejected: {0}")]
    InvalidApiKey(String),
}

impl From<HttpError> for GeminiError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status { status: 400, ref body, .. } if mentions_api_key(body) => {
                GeminiError::InvalidApiKey(body.clone())
            }
            other => GeminiError::Http(other),
        }
    }
}

fn mentions_api_key(body: &str) -> bool {
    let upper = body.to_ascii_uppercase();
    upper.contains("API_KEY") || upper.contains("API KEY")
}

impl From<GeminiError> for ProviderError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::Http(e) => e.into(),
            GeminiError::InvalidApiKey(msg) => ProviderError::Authentication(msg),
        }
    }
}
