//! Azure-specific errors.

use std::time::Duration;

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use serde::Deserialize;
use thiserror::Error;

/// ARM error codes meaning the principal is unknown, expired, or lacks a role.
const AUTH_CODES: &[&str] = &[
    "AuthenticationFailed",
    "AuthorizationFailed",
    "ExpiredAuthenticationToken",
    "InvalidAuthenticationToken",
    "InvalidAuthenticationTokenTenant",
    "RBACAccessDenied",
];

/// Azure-specific errors.
#[derive(Debug, Error)]
pub enum AzureError {
    /// HTTP request failed without an Azure error document.
    #[error(transparent)]
    Http(HttpError),

    /// Entra ID refused to issue a token.
    #[error("Token request rejected (HTTP {status}): {code}: {description}")]
    Token {
        /// HTTP status.
        status: u16,
        /// OAuth error code (`invalid_client`, ...).
        code: String,
        /// `AADSTS...` description.
        description: String,
    },

    /// Azure Resource Manager returned an error document.
    #[error("Azure error {code} (HTTP {status}): {message}")]
    Service {
        /// HTTP status.
        status: u16,
        /// ARM error code.
        code: String,
        /// ARM error message.
        message: String,
        /// `Retry-After`, if sent.
        retry_after: Option<Duration>,
    },

    /// The response could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: ArmError,
}

#[derive(Debug, Deserialize)]
struct ArmError {
    code: String,
    #[serde(default)]
    message: String,
}

/// `{"error": "invalid_client", "error_description": "..."}`
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

impl AzureError {
    /// Interprets a failure of the token endpoint.
    pub fn from_token_failure(err: HttpError) -> Self {
        if let HttpError::Status { status, ref body, .. } = err {
            if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
                return AzureError::Token {
                    status,
                    code: parsed.error,
                    description: parsed.error_description,
                };
            }
            if status == 400 || status == 401 {
                return AzureError::Token {
                    status,
                    code: "invalid_request".to_string(),
                    description: body.clone(),
                };
            }
        }
        AzureError::Http(err)
    }
}

impl From<HttpError> for AzureError {
    fn from(err: HttpError) -> Self {
        if let HttpError::Status {
            status,
            retry_after,
            ref body,
        } = err
        {
            if let Ok(parsed) = serde_json::from_str::<ArmErrorBody>(body) {
                return AzureError::Service {
                    status,
                    code: parsed.error.code,
                    message: parsed.error.message,
                    retry_after,
                };
            }
        }
        AzureError::Http(err)
    }
}

impl From<AzureError> for ProviderError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::Http(e) => e.into(),
            AzureError::Token {
                status,
                code,
                description,
            } => {
                let detail = format!("{code}: {description}");
                if code == "temporarily_unavailable" || status == 429 || status >= 500 {
                    ProviderError::transient(detail)
                } else {
                    ProviderError::Authentication(detail)
                }
            }
            AzureError::Service {
                status,
                code,
                message,
                retry_after,
            } => {
                let detail = format!("{code}: {message}");
                if AUTH_CODES.contains(&code.as_str()) {
                    ProviderError::Authentication(detail)
                } else {
                    HttpError::Status {
                        status,
                        retry_after,
                        body: detail,
                    }
                    .into()
                }
            }
            AzureError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}
