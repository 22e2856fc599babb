//! DigitalOcean-specific errors.

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use thiserror::Error;

/// DigitalOcean-specific errors.
#[derive(Debug, Error)]
pub enum DigitalOceanError {
    /// HTTP request failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The API answered with an unexpected body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DigitalOceanError> for ProviderError {
    fn from(err: DigitalOceanError) -> Self {
        match err {
            DigitalOceanError::Http(e) => e.into(),
            DigitalOceanError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}
