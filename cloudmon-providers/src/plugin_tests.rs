//! End-to-end plugin tests against mock provider APIs.
//!
//! Each test starts a wiremock server, points a plugin at it through its
//! base-URL override, and checks the resulting payload or error category.

#[cfg(test)]
mod digitalocean_plugin_tests {
    use std::time::Duration;

    use cloudmon_core::{AccountContext, CredentialBundle, ProviderError, ProviderPlugin, QueryKind};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::digitalocean::{DigitalOceanPlugin, API_TOKEN};

    fn account() -> AccountContext {
        AccountContext::new("digitalocean", "team")
    }

    fn secrets() -> CredentialBundle {
        CredentialBundle::new().with(API_TOKEN, "dop_v1_test")
    }

    #[tokio::test]
    async fn test_cost_with_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/customers/my/balance"))
            .and(header("authorization", "Bearer dop_v1_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "month_to_date_balance": "23.44",
                "account_balance": "12.23",
                "month_to_date_usage": "23.44",
                "generated_at": "2024-01-15T12:00:00Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/customers/my/billing_history"))
            .and(query_param("per_page", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "billing_history": [
                    {"description": "Invoice for December 2023", "amount": "12.34", "type": "Invoice"},
                    {"description": "Payment (MC 2018)", "amount": "-12.34", "type": "Payment"}
                ]
            })))
            .mount(&server)
            .await;

        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();

        assert_eq!(payload.headline().unwrap().value, "23.44");
        assert_eq!(payload.metrics.len(), 5);
        assert_eq!(payload.metrics[3].value, "-12.34");
        assert_eq!(payload.metrics[4].value, "12.34");
    }

    #[tokio::test]
    async fn test_cost_survives_missing_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/customers/my/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "month_to_date_usage": "1.00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/customers/my/billing_history"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();
        assert_eq!(payload.metrics.len(), 3);
    }

    #[tokio::test]
    async fn test_droplets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/droplets"))
            .and(query_param("per_page", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "droplets": [
                    {"id": 1, "name": "web", "status": "active", "size_slug": "s-1vcpu-1gb",
                     "region": {"slug": "ams3"},
                     "networks": {"v4": [{"ip_address": "10.0.0.2", "type": "private"},
                                         {"ip_address": "203.0.113.7", "type": "public"}]}},
                    {"id": 2, "name": "batch", "status": "off", "size_slug": "s-2vcpu-4gb"}
                ]
            })))
            .mount(&server)
            .await;

        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let payload = plugin
            .fetch(&account(), QueryKind::InstanceList, &secrets())
            .await
            .unwrap();

        assert_eq!(payload.headline().unwrap().label, "Running (all regions)");
        assert_eq!(payload.headline().unwrap().value, "1");
        assert_eq!(payload.attributes["instances"][0]["ip"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_rejected_token_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/account"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "id": "Unauthorized",
                "message": "Unable to authenticate you"
            })))
            .mount(&server)
            .await;

        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let err = plugin.validate_credentials(&account(), &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/droplets"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "30")
                    .set_body_string("too many requests"),
            )
            .mount(&server)
            .await;

        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let err = plugin
            .fetch(&account(), QueryKind::InstanceList, &secrets())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_request() {
        let server = MockServer::start().await;
        let plugin = DigitalOceanPlugin::with_base_url(&server.uri());
        let err = plugin
            .fetch(&account(), QueryKind::Cost, &CredentialBundle::new())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential(API_TOKEN.to_string()));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod gemini_plugin_tests {
    use cloudmon_core::{AccountContext, CredentialBundle, ProviderError, ProviderPlugin, QueryKind};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::gemini::{GeminiPlugin, API_KEY};

    fn account() -> AccountContext {
        AccountContext::new("gemini", "personal")
    }

    fn secrets() -> CredentialBundle {
        CredentialBundle::new().with(API_KEY, "AIza-test")
    }

    #[tokio::test]
    async fn test_quota_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(header("x-goog-api-key", "AIza-test"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{
                    "name": "models/gemini-1.5-flash",
                    "inputTokenLimit": 1_048_576,
                    "outputTokenLimit": 8192,
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {
                        "name": "models/gemini-1.5-pro",
                        "inputTokenLimit": 2_097_152,
                        "outputTokenLimit": 8192,
                        "supportedGenerationMethods": ["generateContent"]
                    },
                    {
                        "name": "models/text-embedding-004",
                        "supportedGenerationMethods": ["embedContent"]
                    }
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let plugin = GeminiPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Quota, &secrets()).await.unwrap();

        assert_eq!(payload.headline().unwrap().value, "2");
        assert_eq!(payload.metrics[1].value, "2M/8K");
        assert_eq!(payload.metrics[2].value, "1M/8K");
    }

    #[tokio::test]
    async fn test_invalid_key_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{"reason": "API_KEY_INVALID"}]
                }
            })))
            .mount(&server)
            .await;

        let plugin = GeminiPlugin::with_base_url(&server.uri());
        let err = plugin.validate_credentials(&account(), &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_cost_is_unsupported() {
        let server = MockServer::start().await;
        let plugin = GeminiPlugin::with_base_url(&server.uri());
        let err = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedQuery(QueryKind::Cost));
    }
}

#[cfg(test)]
mod zhipu_plugin_tests {
    use cloudmon_core::{
        AccountContext, CredentialBundle, MetricStatus, ProviderError, ProviderPlugin, QueryKind,
    };
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::zhipu::{ZhipuPlugin, API_KEY};

    fn account() -> AccountContext {
        AccountContext::new("zhipu", "research")
    }

    fn secrets() -> CredentialBundle {
        CredentialBundle::new().with(API_KEY, "zp-test-key")
    }

    async fn balance_server(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/balance"))
            .and(header("authorization", "Bearer zp-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_cost_reports_balance_and_packages() {
        let server = balance_server(json!({
            "balance": 100.50,
            "currency": "CNY",
            "packages": [{
                "name": "Free tier",
                "remaining": 1000,
                "total": 5000,
                "expires_at": "2099-12-31T23:59:59Z"
            }]
        }))
        .await;

        let plugin = ZhipuPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();

        let headline = payload.headline().unwrap();
        assert_eq!(headline.value, "100.50");
        assert_eq!(headline.unit.as_deref(), Some("CNY"));
        assert_eq!(headline.status, MetricStatus::Normal);
        assert_eq!(payload.metrics.len(), 2);
        assert_eq!(payload.metrics[1].label, "Free tier");
        assert_eq!(payload.metrics[1].value, "1,000/5,000");
    }

    #[tokio::test]
    async fn test_low_balance_warns() {
        let server = balance_server(json!({"balance": 5.0, "currency": "CNY", "packages": []})).await;

        let plugin = ZhipuPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();

        assert_eq!(payload.overall_status(), MetricStatus::Warning);
        let quota = plugin.fetch(&account(), QueryKind::Quota, &secrets()).await.unwrap();
        assert_eq!(quota.headline().unwrap().value, "0");
    }

    #[tokio::test]
    async fn test_rejected_key_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/balance"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "1002", "message": "Authorization Token invalid"}
            })))
            .mount(&server)
            .await;

        let plugin = ZhipuPlugin::with_base_url(&server.uri());
        let err = plugin.validate_credentials(&account(), &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_error_object_in_ok_response() {
        let server = balance_server(json!({
            "error": {"code": 1003, "message": "Authorization Token expired"}
        }))
        .await;

        let plugin = ZhipuPlugin::with_base_url(&server.uri());
        let err = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(ref m) if m.contains("1003")));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/balance"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let plugin = ZhipuPlugin::with_base_url(&server.uri());
        let err = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_key_and_instances() {
        let server = MockServer::start().await;
        let plugin = ZhipuPlugin::with_base_url(&server.uri());

        let err = plugin
            .fetch(&account(), QueryKind::Cost, &CredentialBundle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential(_)));

        let err = plugin
            .fetch(&account(), QueryKind::InstanceList, &secrets())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedQuery(QueryKind::InstanceList));
    }
}

#[cfg(test)]
mod aws_plugin_tests {
    use cloudmon_core::{AccountContext, CredentialBundle, ProviderError, ProviderPlugin, QueryKind};
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::aws::{AwsPlugin, ACCESS_KEY_ID, SECRET_ACCESS_KEY};

    fn secrets() -> CredentialBundle {
        CredentialBundle::new()
            .with(ACCESS_KEY_ID, "AKIDEXAMPLE")
            .with(SECRET_ACCESS_KEY, "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    #[tokio::test]
    async fn test_cost_request_is_signed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "AWSInsightsIndexService.GetCostAndUsage"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [{
                    "TimePeriod": {"Start": "2024-05-01", "End": "2024-05-16"},
                    "Estimated": true,
                    "Groups": [
                        {"Keys": ["Amazon Elastic Compute Cloud - Compute"],
                         "Metrics": {"BlendedCost": {"Amount": "40.5", "Unit": "USD"}}},
                        {"Keys": ["Amazon Simple Storage Service"],
                         "Metrics": {"BlendedCost": {"Amount": "2.25", "Unit": "USD"}}}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let plugin = AwsPlugin::with_endpoint(&server.uri());
        let payload = plugin
            .fetch(&AccountContext::new("aws", "prod"), QueryKind::Cost, &secrets())
            .await
            .unwrap();
        assert_eq!(payload.headline().unwrap().value, "42.75");
        assert_eq!(payload.attributes["estimated"], true);

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("/us-east-1/ce/aws4_request"));
    }

    #[tokio::test]
    async fn test_instances_use_account_region() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Action", "DescribeInstances"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<DescribeInstancesResponse><reservationSet><item><instancesSet><item>
                    <instanceId>i-1</instanceId><instanceState><code>16</code><name>running</name></instanceState>
                    <instanceType>t3.micro</instanceType>
                </item></instancesSet></item></reservationSet></DescribeInstancesResponse>"#,
            ))
            .mount(&server)
            .await;

        let plugin = AwsPlugin::with_endpoint(&server.uri());
        let account = AccountContext::new("aws", "prod").with_region("eu-west-1");
        let payload = plugin
            .fetch(&account, QueryKind::InstanceList, &secrets())
            .await
            .unwrap();
        assert_eq!(payload.headline().unwrap().label, "Running (eu-west-1)");

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.contains("/eu-west-1/ec2/aws4_request"));
    }

    #[tokio::test]
    async fn test_invalid_key_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Action", "GetCallerIdentity"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<ErrorResponse><Error><Type>Sender</Type><Code>InvalidClientTokenId</Code>\
                 <Message>The security token included in the request is invalid.</Message></Error></ErrorResponse>",
            ))
            .mount(&server)
            .await;

        let plugin = AwsPlugin::with_endpoint(&server.uri());
        let err = plugin
            .validate_credentials(&AccountContext::new("aws", "prod"), &secrets())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(ref m) if m.contains("InvalidClientTokenId")));
    }
}

#[cfg(test)]
mod azure_plugin_tests {
    use cloudmon_core::{AccountContext, CredentialBundle, ProviderError, ProviderPlugin, QueryKind};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::azure::{AzurePlugin, CLIENT_ID, CLIENT_SECRET, SUBSCRIPTION_ID, TENANT_ID};

    fn account() -> AccountContext {
        AccountContext::new("azure", "main")
    }

    fn secrets() -> CredentialBundle {
        CredentialBundle::new()
            .with(TENANT_ID, "tenant-1")
            .with(CLIENT_ID, "app-1")
            .with(CLIENT_SECRET, "s3cret")
            .with(SUBSCRIPTION_ID, "sub-1")
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "arm-token"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_cost_query() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.CostManagement/query"))
            .and(query_param("api-version", "2023-03-01"))
            .and(header("authorization", "Bearer arm-token"))
            .and(body_string_contains("MonthToDate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "columns": [{"name": "Cost", "type": "Number"},
                                {"name": "ResourceGroup", "type": "String"},
                                {"name": "Currency", "type": "String"}],
                    "rows": [[10.0, "rg-a", "USD"], [30.0, "rg-b", "USD"]]
                }
            })))
            .mount(&server)
            .await;

        let plugin = AzurePlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();
        assert_eq!(payload.headline().unwrap().value, "40.00");
        assert_eq!(payload.metrics[1].label, "rg-b");
        assert_eq!(payload.metrics[1].value, "30.00 (75.0%)");
    }

    #[tokio::test]
    async fn test_vm_listing_follows_next_link() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let next = format!(
            "{}/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines?api-version=2024-03-01&statusOnly=true&$skiptoken=2",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines"))
            .and(query_param("$skiptoken", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/b",
                           "name": "b",
                           "properties": {"instanceView": {"statuses": [{"code": "PowerState/deallocated"}]}}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines"))
            .and(query_param("statusOnly", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/a",
                           "name": "a",
                           "properties": {"instanceView": {"statuses": [{"code": "PowerState/running"}]}}}],
                "nextLink": next
            })))
            .mount(&server)
            .await;

        let plugin = AzurePlugin::with_base_url(&server.uri());
        let payload = plugin
            .fetch(&account(), QueryKind::InstanceList, &secrets())
            .await
            .unwrap();
        assert_eq!(payload.attributes["total"], 2);
        assert_eq!(payload.attributes["running"], 1);
    }

    #[tokio::test]
    async fn test_bad_client_secret_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let plugin = AzurePlugin::with_base_url(&server.uri());
        let err = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }
}

#[cfg(test)]
mod gcp_plugin_tests {
    use cloudmon_core::{AccountContext, CredentialBundle, ProviderError, ProviderPlugin, QueryKind};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::gcp::{GcpPlugin, BIGQUERY_TABLE, SERVICE_ACCOUNT_JSON};

    const TEST_KEY: &str = include_str!("gcp/testdata/test_key.pem");

    fn account() -> AccountContext {
        AccountContext::new("gcp", "billing")
    }

    fn secrets() -> CredentialBundle {
        let key = json!({
            "type": "service_account",
            "project_id": "ops-project",
            "client_email": "reader@ops-project.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
            "token_uri": "https://oauth2.googleapis.com/token"
        });
        CredentialBundle::new()
            .with(SERVICE_ACCOUNT_JSON, key.to_string())
            .with(BIGQUERY_TABLE, "billing-prod.exports.gcp_billing_export_v1_X")
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .and(body_string_contains("assertion="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_cost_query_runs_in_key_project() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/ops-project/queries"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(body_string_contains("billing-prod.exports.gcp_billing_export_v1_X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "schema": {"fields": [
                    {"name": "service_name"}, {"name": "gross_cost"}, {"name": "total_credits"},
                    {"name": "net_cost"}, {"name": "currency"}, {"name": "month_net"},
                    {"name": "month_credits"}
                ]},
                "rows": [
                    {"f": [{"v": "Compute Engine"}, {"v": "620"}, {"v": "-20"}, {"v": "600"},
                           {"v": "USD"}, {"v": "600"}, {"v": "-20"}]}
                ]
            })))
            .mount(&server)
            .await;

        let plugin = GcpPlugin::with_base_url(&server.uri());
        let payload = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap();
        let headline = payload.headline().unwrap();
        assert_eq!(headline.value, "600.00");
        assert_eq!(headline.status, cloudmon_core::MetricStatus::Error);
        assert_eq!(payload.metrics[1].label, "Credits");
    }

    #[tokio::test]
    async fn test_incomplete_job_is_transient() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/ops-project/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": false,
                "jobReference": {"projectId": "ops-project", "jobId": "job_1"}
            })))
            .mount(&server)
            .await;

        let plugin = GcpPlugin::with_base_url(&server.uri());
        let err = plugin.fetch(&account(), QueryKind::Cost, &secrets()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_revoked_key_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid JWT Signature."
            })))
            .mount(&server)
            .await;

        let plugin = GcpPlugin::with_base_url(&server.uri());
        let err = plugin.validate_credentials(&account(), &secrets()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
    }
}
