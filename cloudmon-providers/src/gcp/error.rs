//! GCP-specific errors.

use std::time::Duration;

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use serde::Deserialize;
use thiserror::Error;

/// GCP-specific errors.
#[derive(Debug, Error)]
pub enum GcpError {
    /// HTTP request failed without a Google error document.
    #[error(transparent)]
    Http(HttpError),

    /// The service account key is unreadable or malformed.
    #[error("Invalid service account key: {0}")]
    Key(String),

    /// The billing export table name is malformed.
    #[error("Invalid BigQuery table: {0:?}")]
    Table(String),

    /// The token endpoint refused the signed assertion.
    #[error("Token request rejected: {code}: {description}")]
    Token {
        /// HTTP status.
        status: u16,
        /// OAuth error code (`invalid_grant`, ...).
        code: String,
        /// Human-readable detail.
        description: String,
    },

    /// A Google API returned an error document.
    #[error("Google API error {status_text} (HTTP {status}): {message}")]
    Service {
        /// HTTP status.
        status: u16,
        /// Canonical status (`PERMISSION_DENIED`, `NOT_FOUND`, ...).
        status_text: String,
        /// Error message.
        message: String,
        /// `Retry-After`, if sent.
        retry_after: Option<Duration>,
    },

    /// BigQuery did not finish the query within the request timeout.
    #[error("BigQuery job did not complete in time")]
    JobIncomplete,

    /// The response could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// `{"error": {"code": 403, "message": "...", "status": "PERMISSION_DENIED"}}`
#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// `{"error": "invalid_grant", "error_description": "..."}`
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

impl GcpError {
    /// Interprets a failure of the token endpoint.
    pub fn from_token_failure(err: HttpError) -> Self {
        if let HttpError::Status { status, ref body, .. } = err {
            if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
                return GcpError::Token {
                    status,
                    code: parsed.error,
                    description: parsed.error_description,
                };
            }
            if status == 400 || status == 401 {
                return GcpError::Token {
                    status,
                    code: "invalid_request".to_string(),
                    description: body.clone(),
                };
            }
        }
        GcpError::Http(err)
    }
}

impl From<HttpError> for GcpError {
    fn from(err: HttpError) -> Self {
        if let HttpError::Status {
            status,
            retry_after,
            ref body,
        } = err
        {
            if let Ok(parsed) = serde_json::from_str::<GoogleErrorBody>(body) {
                return GcpError::Service {
                    status,
                    status_text: parsed.error.status,
                    message: parsed.error.message,
                    retry_after,
                };
            }
        }
        GcpError::Http(err)
    }
}

impl From<GcpError> for ProviderError {
    fn from(err: GcpError) -> Self {
        match err {
            GcpError::Http(e) => e.into(),
            GcpError::Key(msg) => {
                ProviderError::Authentication(format!("Invalid service account key: {msg}"))
            }
            GcpError::Table(table) => ProviderError::MissingCredential(format!(
                "bigquery_table ({table:?} is not project.dataset.table)"
            )),
            GcpError::Token {
                status,
                code,
                description,
            } => {
                let detail = format!("{code}: {description}");
                if status == 429 || status >= 500 {
                    ProviderError::transient(detail)
                } else {
                    ProviderError::Authentication(detail)
                }
            }
            GcpError::Service {
                status,
                status_text,
                message,
                retry_after,
            } => {
                let detail = format!("{status_text}: {message}");
                match status_text.as_str() {
                    "PERMISSION_DENIED" | "UNAUTHENTICATED" => {
                        ProviderError::Authentication(detail)
                    }
                    "RESOURCE_EXHAUSTED" | "UNAVAILABLE" | "DEADLINE_EXCEEDED" => {
                        ProviderError::Transient {
                            message: detail,
                            retry_after,
                        }
                    }
                    _ => HttpError::Status {
                        status,
                        retry_after,
                        body: detail,
                    }
                    .into(),
                }
            }
            GcpError::JobIncomplete => {
                ProviderError::transient("BigQuery job did not complete in time")
            }
            GcpError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, body: &str) -> HttpError {
        HttpError::Status {
            status: code,
            retry_after: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_invalid_grant_is_authentication() {
        let err: ProviderError = GcpError::from_token_failure(status(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid JWT Signature."}"#,
        ))
        .into();
        assert!(matches!(err, ProviderError::Authentication(ref m) if m.contains("invalid_grant")));
        assert!(err.kind().needs_reauth());
    }

    #[test]
    fn test_permission_denied_is_authentication() {
        let err: ProviderError = GcpError::from(status(
            403,
            r#"{"error":{"code":403,"message":"Access Denied: Table p:d.t","status":"PERMISSION_DENIED"}}"#,
        ))
        .into();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[test]
    fn test_missing_table_is_invalid_response() {
        let err: ProviderError = GcpError::from(status(
            404,
            r#"{"error":{"code":404,"message":"Not found: Table p:d.t","status":"NOT_FOUND"}}"#,
        ))
        .into();
        assert!(matches!(err, ProviderError::InvalidResponse(ref m) if m.contains("Not found")));
    }

    #[test]
    fn test_quota_exhaustion_on_403_is_transient() {
        let err: ProviderError = GcpError::from(status(
            403,
            r#"{"error":{"code":403,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        ))
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_incomplete_job_is_transient() {
        let err: ProviderError = GcpError::JobIncomplete.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_bad_table_is_a_credential_problem() {
        let err: ProviderError = GcpError::Table("a`; DROP".to_string()).into();
        assert!(matches!(err, ProviderError::MissingCredential(_)));
    }
}
