//! AWS API client.
//!
//! Three endpoints, all SigV4-signed:
//! - Cost Explorer `GetCostAndUsage` (JSON 1.1, global in `us-east-1`)
//! - EC2 `DescribeInstances` (query API, regional)
//! - STS `GetCallerIdentity` (query API, used for validation)

use chrono::{NaiveDate, Utc};
use cloudmon_fetch::{HttpClient, HttpError};
use reqwest::RequestBuilder;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use super::error::AwsError;
use super::parser::{
    parse_caller_identity, parse_instances, CallerIdentity, CostAndUsageResponse,
};
use super::sigv4::{sign, AwsCredentials};
use crate::instances::Instance;

// ============================================================================
// Constants
// ============================================================================

/// Domain every AWS endpoint lives under.
const AWS_DOMAIN: &str = "amazonaws.com";

/// Cost Explorer endpoint.
const CE_ENDPOINT: &str = "https://ce.us-east-1.amazonaws.com";

/// Cost Explorer only exists in `us-east-1`.
const CE_REGION: &str = "us-east-1";

/// JSON 1.1 target for `GetCostAndUsage`.
const CE_TARGET: &str = "AWSInsightsIndexService.GetCostAndUsage";

/// Global STS endpoint.
const STS_ENDPOINT: &str = "https://sts.amazonaws.com";

/// EC2 query API version.
const EC2_API_VERSION: &str = "2016-11-15";

/// STS query API version.
const STS_API_VERSION: &str = "2011-06-15";

/// Region used when neither the account nor the credentials name one.
pub const DEFAULT_REGION: &str = "us-east-1";

// ============================================================================
// API Client
// ============================================================================

/// AWS API client.
#[derive(Debug, Clone)]
pub struct AwsApiClient {
    http: HttpClient,
    endpoint_override: Option<String>,
}

impl AwsApiClient {
    /// Creates a client for the public AWS endpoints.
    pub fn new() -> Self {
        Self {
            http: HttpClient::with_allowed_domains(vec![AWS_DOMAIN.to_string()]),
            endpoint_override: None,
        }
    }

    /// Sends every call to one endpoint (tests, LocalStack).
    pub fn with_endpoint(endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[endpoint.as_str()]),
            endpoint_override: Some(endpoint),
        }
    }

    fn endpoint(&self, default: String) -> Result<Url, AwsError> {
        let base = self.endpoint_override.clone().unwrap_or(default);
        Url::parse(&format!("{base}/"))
            .map_err(|e| AwsError::Http(HttpError::InvalidUrl(e.to_string())))
    }

    fn signed(
        &self,
        request: RequestBuilder,
        signature: Vec<(String, String)>,
    ) -> RequestBuilder {
        signature
            .into_iter()
            .fold(request, |req, (name, value)| req.header(name, value))
    }

    /// Fetches month-to-date cost grouped by service.
    #[instrument(skip(self, credentials))]
    pub async fn get_cost_and_usage(
        &self,
        credentials: AwsCredentials<'_>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CostAndUsageResponse, AwsError> {
        debug!("Fetching AWS cost and usage");

        let url = self.endpoint(CE_ENDPOINT.to_string())?;
        let body = json!({
            "TimePeriod": {
                "Start": start.format("%Y-%m-%d").to_string(),
                "End": end.format("%Y-%m-%d").to_string(),
            },
            "Granularity": "MONTHLY",
            "Metrics": ["BlendedCost", "UnblendedCost"],
            "GroupBy": [{"Type": "DIMENSION", "Key": "SERVICE"}],
        })
        .to_string();

        let headers = [
            ("content-type", "application/x-amz-json-1.1"),
            ("x-amz-target", CE_TARGET),
        ];
        let signature = sign(
            credentials,
            CE_REGION,
            "ce",
            "POST",
            &url,
            &headers,
            body.as_bytes(),
            Utc::now(),
        )?;

        let request = headers
            .iter()
            .fold(self.http.post(url.as_str())?, |req, (name, value)| {
                req.header(*name, *value)
            });
        let request = self.signed(request, signature).body(body);

        let text = self.http.send_text(request).await?;
        serde_json::from_str(&text).map_err(|e| AwsError::InvalidResponse(e.to_string()))
    }

    /// Lists the instances of one region.
    #[instrument(skip(self, credentials))]
    pub async fn describe_instances(
        &self,
        credentials: AwsCredentials<'_>,
        region: &str,
    ) -> Result<Vec<Instance>, AwsError> {
        debug!("Describing EC2 instances");

        let mut url = self.endpoint(format!("https://ec2.{region}.{AWS_DOMAIN}"))?;
        url.query_pairs_mut()
            .append_pair("Action", "DescribeInstances")
            .append_pair("Version", EC2_API_VERSION);

        let signature = sign(credentials, region, "ec2", "GET", &url, &[], b"", Utc::now())?;
        let request = self.signed(self.http.get(url.as_str())?, signature);

        let xml = self.http.send_text(request).await?;
        parse_instances(&xml)
    }

    /// Returns the identity behind the access key.
    #[instrument(skip(self, credentials))]
    pub async fn get_caller_identity(
        &self,
        credentials: AwsCredentials<'_>,
    ) -> Result<CallerIdentity, AwsError> {
        debug!("Calling STS GetCallerIdentity");

        let mut url = self.endpoint(STS_ENDPOINT.to_string())?;
        url.query_pairs_mut()
            .append_pair("Action", "GetCallerIdentity")
            .append_pair("Version", STS_API_VERSION);

        let signature = sign(credentials, DEFAULT_REGION, "sts", "GET", &url, &[], b"", Utc::now())?;
        let request = self.signed(self.http.get(url.as_str())?, signature);

        let xml = self.http.send_text(request).await?;
        parse_caller_identity(&xml)
    }
}

impl Default for AwsApiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_endpoint() {
        let client = AwsApiClient::new();
        let url = client.endpoint(format!("https://ec2.eu-west-1.{AWS_DOMAIN}")).unwrap();
        assert_eq!(url.as_str(), "https://ec2.eu-west-1.amazonaws.com/");
        assert!(client.http.get(url.as_str()).is_ok());
    }

    #[test]
    fn test_region_cannot_escape_the_aws_domain() {
        let client = AwsApiClient::new();
        let url = client.endpoint("https://ec2.evil.example/x.amazonaws.com".to_string()).unwrap();
        assert!(client.http.get(url.as_str()).is_err());
    }

    #[test]
    fn test_endpoint_override_applies_to_all_calls() {
        let client = AwsApiClient::with_endpoint("http://127.0.0.1:4566/");
        let url = client.endpoint(STS_ENDPOINT.to_string()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4566/");
    }
}
