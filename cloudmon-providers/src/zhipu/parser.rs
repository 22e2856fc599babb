//! Zhipu response types and payload conversion.

use chrono::{DateTime, Utc};
use cloudmon_core::{Metric, MetricStatus, Payload};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::format::{group_thousands, shorten};

/// Packages shown under the balance headline.
const LISTED_PACKAGES: usize = 3;

/// Balance below which the account is flagged.
const LOW_BALANCE: f64 = 10.0;

/// Share of a package used before it is flagged, in percent.
const PACKAGE_USAGE_WARNING: f64 = 80.0;

/// Days before expiry at which a package is flagged.
const EXPIRY_WARNING_DAYS: i64 = 7;

const DEFAULT_CURRENCY: &str = "CNY";

// ============================================================================
// Response Types
// ============================================================================

/// `GET /users/me/balance`.
#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    /// Prepaid balance.
    #[serde(default)]
    pub balance: f64,
    /// ISO currency code; `CNY` when absent.
    #[serde(default)]
    pub currency: Option<String>,
    /// Token resource packages.
    #[serde(default)]
    pub packages: Vec<ResourcePackage>,
    /// Present instead of the figures when the call failed.
    #[serde(default)]
    pub error: Option<ApiError>,
}

impl BalanceResponse {
    /// Returns the reported currency.
    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
    }
}

/// One resource package.
#[derive(Debug, Deserialize)]
pub struct ResourcePackage {
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Tokens left.
    #[serde(default)]
    pub remaining: u64,
    /// Tokens bought.
    #[serde(default)]
    pub total: u64,
    /// RFC 3339 expiry.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Error object embedded in a response body.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    /// Numeric or string error code.
    #[serde(default)]
    code: Value,
    /// Error text.
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Returns the code as text.
    pub fn code(&self) -> String {
        match &self.code {
            Value::String(code) => code.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Conversion
// ============================================================================

#[derive(Debug, PartialEq)]
enum Expiry {
    Never,
    Expired,
    Soon(i64),
    Later(i64),
    Unreadable(String),
}

impl Expiry {
    fn of(raw: Option<&str>, now: DateTime<Utc>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::Never;
        };
        let Ok(expires) = DateTime::parse_from_rfc3339(raw.trim()) else {
            return Self::Unreadable(raw.to_string());
        };
        let left = expires.with_timezone(&Utc) - now;
        if left < chrono::Duration::zero() {
            Self::Expired
        } else if left.num_days() < EXPIRY_WARNING_DAYS {
            Self::Soon(left.num_days())
        } else {
            Self::Later(left.num_days())
        }
    }

    fn label(&self) -> Option<String> {
        match self {
            Self::Never => None,
            Self::Expired => Some("expired".to_string()),
            Self::Soon(days) => Some(format!("expires in {days}d")),
            Self::Later(days) => Some(format!("{days}d left")),
            Self::Unreadable(raw) => Some(raw.clone()),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn package_metric(package: &ResourcePackage, now: DateTime<Utc>) -> Metric {
    let expiry = Expiry::of(package.expires_at.as_deref(), now);
    let used = package.total.saturating_sub(package.remaining);
    let used_percent = if package.total > 0 {
        used as f64 / package.total as f64 * 100.0
    } else {
        0.0
    };

    let status = match expiry {
        Expiry::Expired => MetricStatus::Error,
        Expiry::Soon(_) => MetricStatus::Warning,
        _ if used_percent > PACKAGE_USAGE_WARNING => MetricStatus::Warning,
        _ => MetricStatus::Normal,
    };

    let name = package.name.as_deref().unwrap_or("Resource package");
    let mut metric = Metric::text(
        shorten(name, 30),
        format!(
            "{}/{}",
            group_thousands(package.remaining),
            group_thousands(package.total)
        ),
    )
    .with_status(status);
    metric.amount = Some(package.remaining as f64);
    metric.unit = expiry.label();
    metric
}

/// Builds the cost payload: the balance, then the first few packages.
pub fn balance_payload(response: &BalanceResponse, now: DateTime<Utc>) -> Payload {
    let status = if response.balance <= 0.0 {
        MetricStatus::Error
    } else if response.balance < LOW_BALANCE {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };
    debug!(balance = response.balance, packages = response.packages.len(), "Parsed Zhipu balance");

    let mut payload = Payload::new().with_attribute("currency", response.currency());
    payload.push(Metric::amount("Balance", response.balance, Some(response.currency())).with_status(status));
    for package in response.packages.iter().take(LISTED_PACKAGES) {
        payload.push(package_metric(package, now));
    }
    payload
}

/// Builds the quota payload: a package count, then every package.
pub fn packages_payload(response: &BalanceResponse, now: DateTime<Utc>) -> Payload {
    let mut payload = Payload::new();
    payload.push(Metric::count("Resource packages", response.packages.len() as u64));
    for package in &response.packages {
        payload.push(package_metric(package, now));
    }
    payload
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn response(json: &str) -> BalanceResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_balance_payload() {
        let response = response(
            r#"{
                "balance": 100.50,
                "currency": "CNY",
                "packages": [
                    {"name": "Free tier", "remaining": 1000, "total": 5000,
                     "expires_at": "2025-12-31T23:59:59Z"}
                ]
            }"#,
        );

        let payload = balance_payload(&response, now());
        let headline = payload.headline().unwrap();
        assert_eq!(headline.label, "Balance");
        assert_eq!(headline.value, "100.50");
        assert_eq!(headline.unit.as_deref(), Some("CNY"));
        assert_eq!(headline.status, MetricStatus::Normal);

        let package = &payload.metrics[1];
        assert_eq!(package.label, "Free tier");
        assert_eq!(package.value, "1,000/5,000");
        assert_eq!(package.unit.as_deref(), Some("213d left"));
        assert_eq!(package.status, MetricStatus::Normal);
        assert_eq!(payload.attributes["currency"], "CNY");
    }

    #[test]
    fn test_low_and_empty_balance() {
        let low = balance_payload(&response(r#"{"balance": 5.0, "packages": []}"#), now());
        assert_eq!(low.headline().unwrap().status, MetricStatus::Warning);
        assert_eq!(low.headline().unwrap().unit.as_deref(), Some("CNY"));
        assert_eq!(low.metrics.len(), 1);

        let empty = balance_payload(&response("{}"), now());
        assert_eq!(empty.headline().unwrap().status, MetricStatus::Error);
        assert_eq!(empty.headline().unwrap().value, "0.00");
    }

    #[test]
    fn test_package_status_from_usage_and_expiry() {
        let response = response(
            r#"{"balance": 50, "packages": [
                {"name": "Mostly used", "remaining": 100, "total": 1000},
                {"name": "Expiring", "remaining": 900, "total": 1000, "expires_at": "2025-06-04T00:00:00Z"},
                {"name": "Expired", "remaining": 900, "total": 1000, "expires_at": "2025-05-01T00:00:00+08:00"},
                {"name": "Odd date", "remaining": 0, "total": 0, "expires_at": "next year"}
            ]}"#,
        );

        let payload = packages_payload(&response, now());
        assert_eq!(payload.headline().unwrap().value, "4");

        let statuses: Vec<MetricStatus> = payload.metrics[1..].iter().map(|m| m.status).collect();
        assert_eq!(
            statuses,
            [
                MetricStatus::Warning,
                MetricStatus::Warning,
                MetricStatus::Error,
                MetricStatus::Normal
            ]
        );
        assert_eq!(payload.metrics[2].unit.as_deref(), Some("expires in 2d"));
        assert_eq!(payload.metrics[3].unit.as_deref(), Some("expired"));
        assert_eq!(payload.metrics[4].unit.as_deref(), Some("next year"));
        assert!(payload.metrics[1].unit.is_none());
    }

    #[test]
    fn test_cost_lists_at_most_three_packages() {
        let response = response(
            r#"{"balance": 20, "packages": [
                {"name": "a", "remaining": 1, "total": 1},
                {"name": "b", "remaining": 1, "total": 1},
                {"name": "c", "remaining": 1, "total": 1},
                {"name": "d", "remaining": 1, "total": 1}
            ]}"#,
        );
        assert_eq!(balance_payload(&response, now()).metrics.len(), 4);
        assert_eq!(packages_payload(&response, now()).metrics.len(), 5);
    }

    #[test]
    fn test_error_code_as_number_or_string() {
        let numeric = response(r#"{"error": {"code": 1002, "message": "bad token"}}"#);
        assert_eq!(numeric.error.unwrap().code(), "1002");
        let text = response(r#"{"error": {"code": "1113", "message": "arrears"}}"#);
        assert_eq!(text.error.unwrap().code(), "1113");
    }
}
