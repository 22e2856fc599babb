//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use cloudmon_core::{AccountContext, FetchFailure, Metric, ProviderDescriptor};
use cloudmon_manager::Health;
use serde::Serialize;

use crate::app::DashboardRow;

// ============================================================================
// Output Types
// ============================================================================

/// Provider info output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfoOutput {
    pub id: String,
    pub display_name: String,
    pub queries: Vec<String>,
    pub poll_interval_secs: u64,
    pub credential_fields: Vec<CredentialFieldOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
}

/// A credential field a provider needs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialFieldOutput {
    pub name: String,
    pub label: String,
    pub required: bool,
}

/// One account's value for one query kind.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultOutput {
    pub provider: String,
    pub account: String,
    pub query: String,
    pub health: Health,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub metrics: Vec<Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchFailure>,
}

impl From<&DashboardRow> for ResultOutput {
    fn from(row: &DashboardRow) -> Self {
        let result = row.view.result();
        Self {
            provider: row.key.provider_id.to_string(),
            account: row.key.account_id.clone(),
            query: row.key.query_kind.to_string(),
            health: row.view.status.as_ref().map(|s| s.health).unwrap_or_default(),
            stale: row.view.is_stale(),
            fetched_at: result.map(|r| r.fetched_at),
            attempts: result.map(|r| r.attempts),
            metrics: result.map(|r| r.payload.metrics.clone()).unwrap_or_default(),
            error: row.view.error().cloned(),
        }
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }

    /// Formats the provider list.
    pub fn format_providers(&self, providers: &[ProviderDescriptor]) -> Result<String> {
        let output: Vec<ProviderInfoOutput> = providers
            .iter()
            .map(|d| ProviderInfoOutput {
                id: d.id.to_string(),
                display_name: d.display_name.clone(),
                queries: d.capabilities.iter().map(ToString::to_string).collect(),
                poll_interval_secs: d.poll_interval.as_secs(),
                credential_fields: d
                    .credential_fields
                    .iter()
                    .map(|f| CredentialFieldOutput {
                        name: f.name.clone(),
                        label: f.label.clone(),
                        required: f.required,
                    })
                    .collect(),
                dashboard_url: d.dashboard_url.clone(),
            })
            .collect();
        self.render(&output)
    }

    /// Formats configured accounts.
    pub fn format_accounts(&self, accounts: &[AccountContext]) -> Result<String> {
        self.render(accounts)
    }

    /// Formats dashboard rows.
    pub fn format_rows(&self, rows: &[DashboardRow]) -> Result<String> {
        let output: Vec<ResultOutput> = rows.iter().map(ResultOutput::from).collect();
        self.render(&output)
    }

    /// Formats a single row as one line, for streaming.
    pub fn format_row_line(&self, row: &DashboardRow) -> Result<String> {
        Ok(serde_json::to_string(&ResultOutput::from(row))?)
    }
}
