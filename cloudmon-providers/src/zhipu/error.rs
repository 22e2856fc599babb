//! Zhipu-specific errors.

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use thiserror::Error;

/// Zhipu-specific errors.
#[derive(Debug, Error)]
pub enum ZhipuError {
    /// HTTP request failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The API answered with an error object.
    #[error("Zhipu error {code}: {message}")]
    Api {
        /// Platform error code, e.g. `1002`.
        code: String,
        /// Error text.
        message: String,
    },
}

impl ZhipuError {
    /// Returns true for the 1000-1004 authentication codes.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Api { code, .. } if matches!(code.as_str(), "1000" | "1001" | "1002" | "1003" | "1004"))
    }
}

impl From<ZhipuError> for ProviderError {
    fn from(err: ZhipuError) -> Self {
        if err.is_auth_error() {
            return ProviderError::Authentication(err.to_string());
        }
        match err {
            ZhipuError::Http(e) => e.into(),
            ZhipuError::Api { code, message } if matches!(code.as_str(), "1302" | "1303" | "1305") => {
                ProviderError::transient(format!("Zhipu error {code}: {message}"))
            }
            api @ ZhipuError::Api { .. } => ProviderError::InvalidResponse(api.to_string()),
        }
    }
}
