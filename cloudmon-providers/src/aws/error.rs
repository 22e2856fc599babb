//! AWS-specific errors.

use std::sync::LazyLock;
use std::time::Duration;

use cloudmon_core::ProviderError;
use cloudmon_fetch::HttpError;
use regex::Regex;
use thiserror::Error;

/// `"__type": "com.amazon.coral.service#UnrecognizedClientException"`
static JSON_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##""__type"\s*:\s*"(?:[^"#]*#)?([^"]+)""##).expect("Invalid regex")
});

/// `"message": "..."` (Cost Explorer spells it either way)
static JSON_MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:message|Message)"\s*:\s*"([^"]*)"#).expect("Invalid regex")
});

/// `<Code>AuthFailure</Code>`
static XML_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Code>([^<]+)</Code>").expect("Invalid regex"));

/// `<Message>...</Message>`
static XML_MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Message>([^<]*)</Message>").expect("Invalid regex"));

/// Error codes meaning the key pair is wrong, expired, or lacks permission.
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "ExpiredToken",
    "ExpiredTokenException",
    "IncompleteSignature",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "MissingAuthenticationToken",
    "SignatureDoesNotMatch",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
];

/// Error codes AWS documents as retryable.
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "LimitExceededException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "Throttling",
    "ThrottlingException",
    "Unavailable",
];

/// AWS-specific errors.
#[derive(Debug, Error)]
pub enum AwsError {
    /// HTTP request failed without an AWS error document.
    #[error(transparent)]
    Http(HttpError),

    /// AWS returned an error document.
    #[error("AWS error {code} (HTTP {status}): {message}")]
    Service {
        /// HTTP status.
        status: u16,
        /// AWS error code.
        code: String,
        /// AWS error message.
        message: String,
        /// `Retry-After`, if sent.
        retry_after: Option<Duration>,
    },

    /// The request could not be signed.
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// The response could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Extracts the error code and message from a JSON or XML error body.
pub fn parse_error_body(body: &str) -> Option<(String, String)> {
    let (code_re, message_re): (&Regex, &Regex) = if body.trim_start().starts_with('<') {
        (&XML_CODE_RE, &XML_MESSAGE_RE)
    } else {
        (&JSON_TYPE_RE, &JSON_MESSAGE_RE)
    };

    let code = code_re.captures(body)?.get(1)?.as_str().to_string();
    let message = message_re
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some((code, message))
}

impl From<HttpError> for AwsError {
    fn from(err: HttpError) -> Self {
        if let HttpError::Status {
            status,
            retry_after,
            ref body,
        } = err
        {
            if let Some((code, message)) = parse_error_body(body) {
                return AwsError::Service {
                    status,
                    code,
                    message,
                    retry_after,
                };
            }
        }
        AwsError::Http(err)
    }
}

impl From<AwsError> for ProviderError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Http(e) => e.into(),
            AwsError::Service {
                status,
                code,
                message,
                retry_after,
            } => {
                let detail = format!("{code}: {message}");
                if AUTH_CODES.contains(&code.as_str()) {
                    ProviderError::Authentication(detail)
                } else if TRANSIENT_CODES.contains(&code.as_str()) {
                    ProviderError::Transient {
                        message: detail,
                        retry_after,
                    }
                } else {
                    HttpError::Status {
                        status,
                        retry_after,
                        body: detail,
                    }
                    .into()
                }
            }
            AwsError::Signing(msg) => ProviderError::Authentication(msg),
            AwsError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
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
    fn test_parse_json_error() {
        let body = r#"{"__type":"com.amazon.coral.service#UnrecognizedClientException","message":"The security token included in the request is invalid."}"#;
        let (code, message) = parse_error_body(body).unwrap();
        assert_eq!(code, "UnrecognizedClientException");
        assert!(message.starts_with("The security token"));
    }

    #[test]
    fn test_parse_xml_error() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response><Errors><Error><Code>AuthFailure</Code><Message>AWS was not able to validate the provided access credentials</Message></Error></Errors></Response>"#;
        let (code, _) = parse_error_body(body).unwrap();
        assert_eq!(code, "AuthFailure");
    }

    #[test]
    fn test_auth_codes_map_to_authentication() {
        let err: ProviderError = AwsError::from(status(
            400,
            r#"{"__type":"AccessDeniedException","Message":"User is not authorized"}"#,
        ))
        .into();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[test]
    fn test_throttling_on_400_is_transient() {
        let err: ProviderError = AwsError::from(status(
            400,
            r#"{"__type":"ThrottlingException","message":"Rate exceeded"}"#,
        ))
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_code_falls_back_to_status() {
        let err: ProviderError = AwsError::from(status(
            400,
            r#"{"__type":"DataUnavailableException","message":"Data is not available"}"#,
        ))
        .into();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));

        let err: ProviderError = AwsError::from(status(503, "<html>busy</html>")).into();
        assert!(err.is_transient());
    }
}
