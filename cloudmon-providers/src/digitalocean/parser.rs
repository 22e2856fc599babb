//! DigitalOcean response types and payload conversion.

use cloudmon_core::{Metric, MetricStatus, Payload};
use serde::Deserialize;
use tracing::debug;

use super::error::DigitalOceanError;
use crate::format::shorten;
use crate::instances::{instance_payload, Instance, PowerStates};

/// Billing records shown under the headline.
const LISTED_RECORDS: usize = 3;

/// Balance above which the account is flagged.
const BALANCE_WARNING: f64 = 50.0;

/// Balance above which the account is flagged as an error.
const BALANCE_ERROR: f64 = 100.0;

const DROPLET_STATES: PowerStates = PowerStates {
    running: "active",
    stopped: &["off"],
};

// ============================================================================
// Response Types
// ============================================================================

/// `GET /v2/customers/my/balance`.
///
/// Amounts are decimal strings.
#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    /// Amount owed this month so far, after credits.
    #[serde(default)]
    pub month_to_date_balance: Option<String>,
    /// Outstanding balance; negative means credit.
    #[serde(default)]
    pub account_balance: Option<String>,
    /// Usage this month so far.
    #[serde(default)]
    pub month_to_date_usage: Option<String>,
    /// When DigitalOcean computed the figures.
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// `GET /v2/customers/my/billing_history`.
#[derive(Debug, Default, Deserialize)]
pub struct BillingHistoryResponse {
    /// Most recent first.
    #[serde(default)]
    pub billing_history: Vec<BillingRecord>,
}

/// One invoice or payment.
#[derive(Debug, Deserialize)]
pub struct BillingRecord {
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Decimal string.
    #[serde(default)]
    pub amount: Option<String>,
    /// `Invoice`, `Payment`, `Credit`, ...
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub date: Option<String>,
}

/// `GET /v2/droplets`.
#[derive(Debug, Deserialize)]
pub struct DropletsResponse {
    /// Droplets on this page.
    #[serde(default)]
    pub droplets: Vec<Droplet>,
}

/// One droplet.
#[derive(Debug, Deserialize)]
pub struct Droplet {
    /// Numeric id.
    pub id: u64,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// `new`, `active`, `off`, or `archive`.
    #[serde(default)]
    pub status: String,
    /// Size slug (e.g. `s-1vcpu-1gb`).
    #[serde(default)]
    pub size_slug: String,
    /// Region.
    #[serde(default)]
    pub region: Option<DropletRegion>,
    /// Network interfaces.
    #[serde(default)]
    pub networks: Option<DropletNetworks>,
}

/// Droplet region.
#[derive(Debug, Deserialize)]
pub struct DropletRegion {
    /// Region slug (e.g. `nyc3`).
    pub slug: String,
}

/// Droplet networks.
#[derive(Debug, Default, Deserialize)]
pub struct DropletNetworks {
    /// IPv4 addresses.
    #[serde(default)]
    pub v4: Vec<DropletAddress>,
}

/// One address.
#[derive(Debug, Deserialize)]
pub struct DropletAddress {
    /// Address.
    pub ip_address: String,
    /// `public` or `private`.
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// `GET /v2/account`.
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    /// Account details.
    pub account: AccountInfo,
}

/// Account details.
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// `active`, `warning`, or `locked`.
    #[serde(default)]
    pub status: Option<String>,
}

// ============================================================================
// Conversion
// ============================================================================

fn decimal(field: &str, raw: Option<&str>) -> Result<f64, DigitalOceanError> {
    let Some(raw) = raw else {
        return Ok(0.0);
    };
    raw.trim()
        .parse()
        .map_err(|_| DigitalOceanError::InvalidResponse(format!("{field} is not a number: {raw:?}")))
}

/// Builds the cost payload from the balance and recent billing history.
///
/// # Errors
///
/// Fails if a balance figure is not a decimal number.
pub fn cost_payload(
    balance: &BalanceResponse,
    history: &[BillingRecord],
) -> Result<Payload, DigitalOceanError> {
    let month_to_date = decimal("month_to_date_balance", balance.month_to_date_balance.as_deref())?;
    let account_balance = decimal("account_balance", balance.account_balance.as_deref())?;
    let usage = decimal("month_to_date_usage", balance.month_to_date_usage.as_deref())?;
    debug!(usage, account_balance, records = history.len(), "Parsed DigitalOcean balance");

    let status = if account_balance > BALANCE_ERROR {
        MetricStatus::Error
    } else if account_balance > BALANCE_WARNING {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };

    let mut payload = Payload::new();
    if let Some(generated_at) = &balance.generated_at {
        payload = payload.with_attribute("generated_at", generated_at.as_str());
    }

    payload.push(Metric::amount("Month to date", usage, Some("USD")).with_status(status));
    // Positive means credit available, negative means money owed.
    let balance_status = if account_balance > 0.0 {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };
    payload.push(Metric::amount("Balance", -account_balance, Some("USD")).with_status(balance_status));
    payload.push(Metric::amount("Amount due", month_to_date, Some("USD")));

    for record in history.iter().take(LISTED_RECORDS) {
        let amount = decimal("amount", record.amount.as_deref())?.abs();
        let signed = if record.record_type.as_deref() == Some("Payment") {
            amount
        } else {
            -amount
        };
        let label = shorten(record.description.as_deref().unwrap_or("Unknown"), 25);
        payload.push(Metric::amount(label, signed, Some("USD")));
    }

    Ok(payload)
}

fn droplet_ip(droplet: &Droplet) -> Option<String> {
    let addresses = &droplet.networks.as_ref()?.v4;
    addresses
        .iter()
        .find(|a| a.kind == "public")
        .or_else(|| addresses.first())
        .map(|a| a.ip_address.clone())
}

/// Builds the instance-list payload from a droplet listing.
pub fn droplets_payload(response: &DropletsResponse) -> Payload {
    let instances: Vec<Instance> = response
        .droplets
        .iter()
        .map(|d| Instance {
            id: d.id.to_string(),
            name: if d.name.is_empty() {
                d.id.to_string()
            } else {
                d.name.clone()
            },
            state: d.status.clone(),
            size: d.size_slug.clone(),
            location: d.region.as_ref().map(|r| r.slug.clone()),
            ip: droplet_ip(d),
        })
        .collect();

    instance_payload(&instances, DROPLET_STATES, "all regions")
}

// ============================================================================
// Tests
// ============================================================================
