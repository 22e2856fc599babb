//! BigQuery billing export query and response conversion.

use std::sync::LazyLock;

use cloudmon_core::{Metric, MetricStatus, Payload};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::error::GcpError;
use crate::format::{self, parse_amount, shorten};

/// `project.dataset.table`, optionally with a domain-scoped project
/// (`example.com:project.dataset.table`).
static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[a-z0-9.-]+:)?[a-z][a-z0-9-]{4,28}[a-z0-9])\.([A-Za-z0-9_]+)\.([A-Za-z0-9_$-]+)$")
        .expect("Invalid regex")
});

/// Net total below which the headline is normal.
const NET_WARNING: f64 = 100.0;

/// Net total at or above which the headline is an error.
const NET_ERROR: f64 = 500.0;

/// Services listed as individual metrics.
const LISTED_SERVICES: usize = 4;

// ============================================================================
// Query
// ============================================================================

/// Returns the project of a validated billing export table.
///
/// # Errors
///
/// Fails if the table is not `project.dataset.table`.
pub fn table_project(table: &str) -> Result<&str, GcpError> {
    let captures = TABLE_RE
        .captures(table.trim())
        .ok_or_else(|| GcpError::Table(table.to_string()))?;
    captures
        .get(1)
        .map(|m| m.as_str())
        .ok_or_else(|| GcpError::Table(table.to_string()))
}

/// Builds the `jobs.query` request body for one invoice month.
///
/// The table must already have passed [`table_project`]; the month is bound
/// as a query parameter. Per-service rows are limited to ten, while the month
/// totals are window aggregates over every service.
pub fn billing_query(table: &str, invoice_month: &str, timeout_ms: u64) -> Value {
    let sql = format!(
        "WITH service_costs AS (
  SELECT
    service.description AS service_name,
    SUM(cost) AS gross_cost,
    SUM(IFNULL((SELECT SUM(c.amount) FROM UNNEST(credits) AS c), 0)) AS total_credits,
    currency
  FROM `{table}`
  WHERE invoice.month = @invoice_month
  GROUP BY service_name, currency
)
SELECT
  service_name,
  gross_cost,
  total_credits,
  gross_cost + total_credits AS net_cost,
  currency,
  SUM(gross_cost + total_credits) OVER () AS month_net,
  SUM(total_credits) OVER () AS month_credits
FROM service_costs
ORDER BY
  CASE
    WHEN total_credits = 0 AND gross_cost >= 0.005 THEN 0
    WHEN total_credits != 0 AND gross_cost + total_credits >= 0.005 THEN 1
    ELSE 2
  END,
  net_cost DESC,
  gross_cost DESC
LIMIT 10",
        table = table.trim()
    );

    json!({
        "query": sql,
        "useLegacySql": false,
        "timeoutMs": timeout_ms,
        "parameterMode": "NAMED",
        "queryParameters": [{
            "name": "invoice_month",
            "parameterType": {"type": "STRING"},
            "parameterValue": {"value": invoice_month}
        }]
    })
}

// ============================================================================
// Response Types
// ============================================================================

/// `jobs.query` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// False when the query outlived `timeoutMs`.
    #[serde(default)]
    pub job_complete: bool,
    /// Result schema.
    #[serde(default)]
    pub schema: Option<TableSchema>,
    /// Result rows (absent when empty).
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// Result schema.
#[derive(Debug, Default, Deserialize)]
pub struct TableSchema {
    /// Columns in row order.
    #[serde(default)]
    pub fields: Vec<TableField>,
}

/// One column.
#[derive(Debug, Deserialize)]
pub struct TableField {
    /// Column name.
    pub name: String,
}

/// One row: `{"f": [{"v": ...}, ...]}`.
#[derive(Debug, Deserialize)]
pub struct TableRow {
    /// Cells in schema order.
    #[serde(default)]
    pub f: Vec<TableCell>,
}

/// One cell. BigQuery encodes numbers as strings.
#[derive(Debug, Deserialize)]
pub struct TableCell {
    /// Value, or null.
    #[serde(default)]
    pub v: Value,
}

/// Cost of one service this month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCost {
    /// Service description (`Compute Engine`, ...).
    pub service: String,
    /// List-price cost.
    pub gross: f64,
    /// Credits, zero or negative.
    pub credits: f64,
    /// Gross plus credits.
    pub net: f64,
}

/// Parsed month summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingSummary {
    /// Top services in display order.
    pub services: Vec<ServiceCost>,
    /// Billing currency.
    pub currency: String,
    /// Net cost over all services.
    pub net_total: f64,
    /// Credits over all services.
    pub credits_total: f64,
}

// ============================================================================
// Conversion
// ============================================================================

struct Columns {
    service: usize,
    gross: usize,
    credits: usize,
    net: usize,
    currency: Option<usize>,
    month_net: Option<usize>,
    month_credits: Option<usize>,
}

impl Columns {
    fn locate(schema: &TableSchema) -> Result<Self, GcpError> {
        let find = |name: &str| schema.fields.iter().position(|f| f.name == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| GcpError::InvalidResponse(format!("missing column {name}")))
        };
        Ok(Self {
            service: require("service_name")?,
            gross: require("gross_cost")?,
            credits: require("total_credits")?,
            net: require("net_cost")?,
            currency: find("currency"),
            month_net: find("month_net"),
            month_credits: find("month_credits"),
        })
    }
}

fn cell<'a>(row: &'a TableRow, index: usize) -> Option<&'a Value> {
    row.f.get(index).map(|c| &c.v)
}

fn number(row: &TableRow, index: usize) -> f64 {
    match cell(row, index) {
        Some(Value::String(s)) => parse_amount(s),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text(row: &TableRow, index: usize) -> Option<&str> {
    cell(row, index)?.as_str()
}

/// Extracts the month summary from a completed query.
///
/// # Errors
///
/// Fails with [`GcpError::JobIncomplete`] if BigQuery is still running the
/// job, or if rows arrive without the expected schema.
pub fn billing_summary(response: &QueryResponse) -> Result<BillingSummary, GcpError> {
    if !response.job_complete {
        return Err(GcpError::JobIncomplete);
    }
    if response.rows.is_empty() {
        return Ok(BillingSummary {
            services: Vec::new(),
            currency: "USD".to_string(),
            net_total: 0.0,
            credits_total: 0.0,
        });
    }

    let schema = response
        .schema
        .as_ref()
        .ok_or_else(|| GcpError::InvalidResponse("rows without schema".to_string()))?;
    let columns = Columns::locate(schema)?;

    let services: Vec<ServiceCost> = response
        .rows
        .iter()
        .map(|row| ServiceCost {
            service: text(row, columns.service).unwrap_or("Unknown").to_string(),
            gross: number(row, columns.gross),
            credits: number(row, columns.credits),
            net: number(row, columns.net),
        })
        .collect();

    let first = &response.rows[0];
    let currency = columns
        .currency
        .and_then(|i| text(first, i))
        .unwrap_or("USD")
        .to_string();
    let net_total = columns
        .month_net
        .map_or_else(|| format::total(services.iter().map(|s| s.net)), |i| number(first, i));
    let credits_total = columns
        .month_credits
        .map_or_else(|| format::total(services.iter().map(|s| s.credits)), |i| number(first, i));

    debug!(net_total, credits_total, services = services.len(), "Parsed BigQuery billing export");
    Ok(BillingSummary {
        services,
        currency,
        net_total,
        credits_total,
    })
}

/// Builds the cost payload for one invoice month.
pub fn cost_payload(summary: &BillingSummary, invoice_month: &str) -> Payload {
    let currency = summary.currency.as_str();
    let mut payload = Payload::new()
        .with_attribute("invoice_month", invoice_month)
        .with_attribute("currency", currency)
        .with_attribute(
            "services",
            serde_json::to_value(&summary.services).unwrap_or_default(),
        );

    if summary.services.is_empty() {
        payload.push(Metric::amount("Month to date", 0.0, Some(currency)));
        payload.push(Metric::text("Note", "No billing data this month"));
        return payload;
    }

    let status = if summary.net_total < NET_WARNING {
        MetricStatus::Normal
    } else if summary.net_total < NET_ERROR {
        MetricStatus::Warning
    } else {
        MetricStatus::Error
    };
    payload.push(Metric::amount("Month to date", summary.net_total, Some(currency)).with_status(status));

    if summary.credits_total < 0.0 {
        payload.push(Metric::amount("Credits", summary.credits_total, Some(currency)));
    }
    for service in summary.services.iter().take(LISTED_SERVICES) {
        payload.push(Metric::amount(
            shorten(&service.service, 20),
            service.gross,
            Some(currency),
        ));
    }
    payload
}

// ============================================================================
// Tests
// ============================================================================
