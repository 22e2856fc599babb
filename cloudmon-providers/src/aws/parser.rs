//! AWS response parsing.
//!
//! Cost Explorer answers JSON; the EC2 query API answers XML, which is
//! scanned with regular expressions rather than fully parsed.

use std::collections::HashMap;
use std::sync::LazyLock;

use cloudmon_core::{Metric, MetricStatus, Payload};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::AwsError;
use crate::format::{self, parse_amount, shorten};
use crate::instances::{instance_payload, Instance, PowerStates};

/// Services cheaper than this are left out of the breakdown.
const MIN_SERVICE_COST: f64 = 0.01;

/// Month-to-date total above which the headline warns.
const COST_WARNING: f64 = 100.0;

/// Services kept in the breakdown attribute.
const BREAKDOWN_SERVICES: usize = 10;

/// Services listed as individual metrics.
const LISTED_SERVICES: usize = 5;

const EC2_STATES: PowerStates = PowerStates {
    running: "running",
    stopped: &["stopped"],
};

// ============================================================================
// Cost Explorer
// ============================================================================

/// `GetCostAndUsage` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostAndUsageResponse {
    /// One entry per granularity period.
    #[serde(default)]
    pub results_by_time: Vec<ResultByTime>,
}

/// One period.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultByTime {
    /// Period bounds.
    #[serde(default)]
    pub time_period: Option<DateInterval>,
    /// One group per service.
    #[serde(default)]
    pub groups: Vec<CostGroup>,
    /// Whether the figures are still estimates.
    #[serde(default)]
    pub estimated: bool,
}

/// Period bounds (`YYYY-MM-DD`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateInterval {
    /// Inclusive start.
    pub start: String,
    /// Exclusive end.
    pub end: String,
}

/// One group of a grouped query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostGroup {
    /// Dimension values (the service name).
    #[serde(default)]
    pub keys: Vec<String>,
    /// Metric name to value.
    #[serde(default)]
    pub metrics: HashMap<String, MetricValue>,
}

/// A decimal amount with its unit.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    /// Decimal string.
    #[serde(default)]
    pub amount: Option<String>,
    /// Currency.
    #[serde(default)]
    pub unit: Option<String>,
}

/// One service's share of the month-to-date spend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCost {
    /// Service name as AWS reports it.
    pub service: String,
    /// Blended cost.
    pub cost: f64,
    /// Share of the total, in percent.
    pub percentage: f64,
}

/// Shortens the long AWS service names.
pub fn short_service_name(name: &str) -> String {
    const REPLACEMENTS: &[(&str, &str)] = &[
        ("Amazon ", ""),
        ("AWS ", ""),
        ("Elastic Compute Cloud - Compute", "EC2"),
        ("Simple Storage Service", "S3"),
        ("Relational Database Service", "RDS"),
    ];
    let short = REPLACEMENTS
        .iter()
        .fold(name.to_string(), |acc, (from, to)| acc.replace(from, to));
    shorten(&short, 25)
}

/// Builds the cost payload from a month-to-date `GetCostAndUsage` answer.
pub fn cost_payload(response: &CostAndUsageResponse) -> Payload {
    let Some(period) = response.results_by_time.first() else {
        let mut payload = Payload::new();
        payload.push(Metric::amount("Month to date", 0.0, Some("USD")));
        return payload;
    };

    let mut unit: Option<String> = None;
    let mut services: Vec<(String, f64)> = Vec::new();
    for group in &period.groups {
        let Some(value) = group.metrics.get("BlendedCost") else {
            continue;
        };
        let cost = value.amount.as_deref().map_or(0.0, parse_amount);
        if cost > MIN_SERVICE_COST {
            if unit.is_none() {
                unit.clone_from(&value.unit);
            }
            let name = group.keys.first().cloned().unwrap_or_else(|| "Unknown".to_string());
            services.push((name, cost));
        }
    }
    services.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total = format::total(services.iter().map(|(_, cost)| *cost));
    let unit = unit.unwrap_or_else(|| "USD".to_string());
    debug!(total, services = services.len(), "Parsed Cost Explorer response");

    let breakdown: Vec<ServiceCost> = services
        .iter()
        .take(BREAKDOWN_SERVICES)
        .map(|(service, cost)| ServiceCost {
            service: service.clone(),
            cost: *cost,
            percentage: if total > 0.0 { cost / total * 100.0 } else { 0.0 },
        })
        .collect();

    let status = if total > COST_WARNING {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };

    let mut payload = Payload::new()
        .with_attribute("services", serde_json::to_value(&breakdown).unwrap_or_default())
        .with_attribute("estimated", period.estimated);
    if let Some(interval) = &period.time_period {
        payload = payload
            .with_attribute("period_start", interval.start.as_str())
            .with_attribute("period_end", interval.end.as_str());
    }

    payload.push(Metric::amount("Month to date", total, Some(&unit)).with_status(status));
    for item in breakdown.iter().take(LISTED_SERVICES) {
        payload.push(Metric::amount(
            short_service_name(&item.service),
            item.cost,
            Some(&unit),
        ));
    }
    payload
}

// ============================================================================
// EC2
// ============================================================================

static INSTANCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<instanceId>([^<]+)</instanceId>").expect("Invalid regex"));

static STATE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<instanceState>.*?<name>([^<]+)</name>").expect("Invalid regex")
});

static INSTANCE_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<instanceType>([^<]+)</instanceType>").expect("Invalid regex"));

static PUBLIC_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<ipAddress>([^<]+)</ipAddress>").expect("Invalid regex"));

static PRIVATE_IP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<privateIpAddress>([^<]+)</privateIpAddress>").expect("Invalid regex")
});

static AZ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<availabilityZone>([^<]+)</availabilityZone>").expect("Invalid regex")
});

static NAME_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<key>Name</key>\s*<value>([^<]*)</value>").expect("Invalid regex")
});

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Extracts instances from a `DescribeInstances` XML body.
///
/// The document is cut at every `<instanceId>`; each slice holds that
/// instance's fields.
///
/// # Errors
///
/// Fails if the body is not a `DescribeInstances` response.
pub fn parse_instances(xml: &str) -> Result<Vec<Instance>, AwsError> {
    if !xml.contains("DescribeInstancesResponse") {
        return Err(AwsError::InvalidResponse(
            "Not a DescribeInstances response".to_string(),
        ));
    }

    let starts: Vec<(usize, String)> = INSTANCE_ID_RE
        .captures_iter(xml)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().to_string())))
        .collect();

    let mut instances: Vec<Instance> = Vec::with_capacity(starts.len());
    for (i, (start, id)) in starts.iter().enumerate() {
        if instances.iter().any(|existing| &existing.id == id) {
            continue;
        }
        let end = starts.get(i + 1).map_or(xml.len(), |(next, _)| *next);
        let section = &xml[*start..end];

        instances.push(Instance {
            id: id.clone(),
            name: capture(&NAME_TAG_RE, section)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.clone()),
            state: capture(&STATE_NAME_RE, section).unwrap_or_else(|| "unknown".to_string()),
            size: capture(&INSTANCE_TYPE_RE, section).unwrap_or_default(),
            location: capture(&AZ_RE, section),
            ip: capture(&PUBLIC_IP_RE, section).or_else(|| capture(&PRIVATE_IP_RE, section)),
        });
    }

    debug!(count = instances.len(), "Parsed EC2 instances");
    Ok(instances)
}

/// Builds the instance-list payload for one region.
pub fn instances_payload(instances: &[Instance], region: &str) -> Payload {
    instance_payload(instances, EC2_STATES, region)
}

// ============================================================================
// STS
// ============================================================================

static ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Account>([^<]+)</Account>").expect("Invalid regex"));

static ARN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Arn>([^<]+)</Arn>").expect("Invalid regex"));

/// Who the access key belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// 12-digit account id.
    pub account: String,
    /// Principal ARN.
    pub arn: Option<String>,
}

/// Parses a `GetCallerIdentity` XML body.
///
/// # Errors
///
/// Fails if the body carries no account id.
pub fn parse_caller_identity(xml: &str) -> Result<CallerIdentity, AwsError> {
    let account = capture(&ACCOUNT_RE, xml)
        .ok_or_else(|| AwsError::InvalidResponse("No account in caller identity".to_string()))?;
    Ok(CallerIdentity {
        account,
        arn: capture(&ARN_RE, xml),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const COST: &str = r#"{
        "GroupDefinitions": [{"Type": "DIMENSION", "Key": "SERVICE"}],
        "ResultsByTime": [{
            "TimePeriod": {"Start": "2024-01-01", "End": "2024-01-16"},
            "Total": {},
            "Groups": [
                {"Keys": ["Amazon Simple Storage Service"],
                 "Metrics": {"BlendedCost": {"Amount": "4.5", "Unit": "USD"},
                             "UnblendedCost": {"Amount": "4.5", "Unit": "USD"}}},
                {"Keys": ["Amazon Elastic Compute Cloud - Compute"],
                 "Metrics": {"BlendedCost": {"Amount": "95.5", "Unit": "USD"}}},
                {"Keys": ["AWS Key Management Service"],
                 "Metrics": {"BlendedCost": {"Amount": "0.0000001", "Unit": "USD"}}}
            ],
            "Estimated": true
        }]
    }"#;

    #[test]
    fn test_cost_payload_sums_and_sorts_services() {
        let response: CostAndUsageResponse = serde_json::from_str(COST).unwrap();
        let payload = cost_payload(&response);

        let headline = payload.headline().unwrap();
        assert_eq!(headline.value, "100.00");
        assert_eq!(headline.status, MetricStatus::Normal);
        assert_eq!(payload.metrics[1].label, "EC2");
        assert_eq!(payload.metrics[2].label, "S3");
        assert_eq!(payload.metrics.len(), 3);

        let services = payload.attributes["services"].as_array().unwrap();
        assert_eq!(services.len(), 2);
        let share = services[0]["percentage"].as_f64().unwrap();
        assert!((share - 95.5).abs() < 1e-9);
        assert_eq!(payload.attributes["estimated"], true);
        assert_eq!(payload.attributes["period_start"], "2024-01-01");
    }

    #[test]
    fn test_empty_cost_response_is_zero() {
        let payload = cost_payload(&CostAndUsageResponse::default());
        assert_eq!(payload.headline().unwrap().value, "0.00");
        assert_eq!(payload.metrics.len(), 1);
    }

    const INSTANCES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
    <requestId>8f7724cf-496f-496e-8fe3-example</requestId>
    <reservationSet>
        <item>
            <reservationId>r-1234567890abcdef0</reservationId>
            <instancesSet>
                <item>
                    <instanceId>i-1234567890abcdef0</instanceId>
                    <imageId>ami-bff32ccc</imageId>
                    <instanceState><code>16</code><name>running</name></instanceState>
                    <instanceType>t2.micro</instanceType>
                    <placement><availabilityZone>eu-west-1c</availabilityZone></placement>
                    <privateIpAddress>10.0.0.12</privateIpAddress>
                    <ipAddress>46.51.219.63</ipAddress>
                    <tagSet>
                        <item><key>env</key><value>prod</value></item>
                        <item><key>Name</key><value>web-1</value></item>
                    </tagSet>
                </item>
                <item>
                    <instanceId>i-0598c7d356eba48d7</instanceId>
                    <instanceState><code>80</code><name>stopped</name></instanceState>
                    <instanceType>t3.large</instanceType>
                    <privateIpAddress>10.0.0.13</privateIpAddress>
                </item>
            </instancesSet>
        </item>
    </reservationSet>
</DescribeInstancesResponse>"#;

    #[test]
    fn test_parse_instances() {
        let instances = parse_instances(INSTANCES).unwrap();
        assert_eq!(instances.len(), 2);

        assert_eq!(instances[0].name, "web-1");
        assert_eq!(instances[0].state, "running");
        assert_eq!(instances[0].size, "t2.micro");
        assert_eq!(instances[0].location.as_deref(), Some("eu-west-1c"));
        assert_eq!(instances[0].ip.as_deref(), Some("46.51.219.63"));

        assert_eq!(instances[1].name, "i-0598c7d356eba48d7");
        assert_eq!(instances[1].state, "stopped");
        assert_eq!(instances[1].ip.as_deref(), Some("10.0.0.13"));

        let payload = instances_payload(&instances, "eu-west-1");
        assert_eq!(payload.headline().unwrap().value, "1");
    }

    #[test]
    fn test_parse_caller_identity() {
        let xml = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>arn:aws:iam::123456789012:user/monitor</Arn>
    <UserId>AIDACKCEVSQ6C2EXAMPLE</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
</GetCallerIdentityResponse>"#;
        let identity = parse_caller_identity(xml).unwrap();
        assert_eq!(identity.account, "123456789012");
        assert_eq!(identity.arn.as_deref(), Some("arn:aws:iam::123456789012:user/monitor"));
        assert!(parse_caller_identity("<Empty/>").is_err());
    }

    #[test]
    fn test_parse_instances_rejects_other_documents() {
        assert!(parse_instances("<html>login</html>").is_err());
        assert!(parse_instances("<DescribeInstancesResponse></DescribeInstancesResponse>")
            .unwrap()
            .is_empty());
    }
}
