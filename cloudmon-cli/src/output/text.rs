//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use cloudmon_core::{AccountContext, Metric, MetricStatus, ProviderDescriptor};
use cloudmon_manager::{AccountStatus, Health};

use crate::app::DashboardRow;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    // ========================================================================
    // Providers
    // ========================================================================

    /// Formats provider list header.
    pub fn format_providers_header(&self) -> String {
        self.bold(&format!(
            "{:<14} {:<22} {:<24} {:<8} {}",
            "Id", "Provider", "Queries", "Every", "Dashboard"
        ))
    }

    /// Formats a single provider line.
    pub fn format_provider_line(&self, desc: &ProviderDescriptor) -> String {
        let queries: Vec<&str> = desc.capabilities.iter().map(|q| q.as_str()).collect();
        let dashboard = desc.dashboard_url.as_deref().unwrap_or("−");
        format!(
            "{:<14} {:<22} {:<24} {:<8} {}",
            desc.id.as_str(),
            desc.display_name,
            queries.join(","),
            format_interval(desc.poll_interval.as_secs()),
            self.dim(dashboard)
        )
    }

    /// Formats the credential fields a provider needs.
    pub fn format_credential_fields(&self, desc: &ProviderDescriptor) -> String {
        desc.credential_fields
            .iter()
            .map(|f| {
                let marker = if f.required { "" } else { " (optional)" };
                format!("  --secret {}=…  {}{}", f.name, self.dim(&f.label), marker)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Formats account list header.
    pub fn format_accounts_header(&self) -> String {
        self.bold(&format!(
            "{:<14} {:<20} {:<20} {:<12} {:<8} {}",
            "Provider", "Account", "Label", "Region", "Every", "Enabled"
        ))
    }

    /// Formats a single account line.
    pub fn format_account_line(&self, account: &AccountContext) -> String {
        let enabled = if account.enabled {
            self.green("✓")
        } else {
            self.dim("−")
        };
        format!(
            "{:<14} {:<20} {:<20} {:<12} {:<8} {}",
            account.provider_id.as_str(),
            account.account_id,
            account.label.as_deref().unwrap_or("−"),
            account.region.as_deref().unwrap_or("−"),
            account
                .poll_interval_secs
                .map_or_else(|| "default".to_string(), format_interval),
            enabled
        )
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Formats one dashboard line: headline value plus annotations.
    pub fn format_row(&self, row: &DashboardRow, now: DateTime<Utc>) -> String {
        let name = format!("{} / {}", row.descriptor.display_name, row.account.display_name());
        let query = row.key.query_kind.display_name();

        let value = match row.view.result().and_then(|r| r.payload.headline()) {
            Some(metric) => self.color_for_status(metric.status, &metric_value(metric)),
            None if row.view.has_error() => self.red("unavailable"),
            None => self.dim("waiting…"),
        };

        let mut line = format!("{name:<36} {query:<10} {value}");
        if let Some(result) = row.view.result() {
            let age = format_age(result.fetched_at, now);
            if row.view.is_stale() {
                line.push_str(&format!("  {}", self.yellow(&format!("stale, {age}"))));
            } else {
                line.push_str(&format!("  {}", self.dim(&age)));
            }
        }
        if let Some(status) = &row.view.status {
            if let Some(note) = self.format_health(status) {
                line.push_str(&format!("  {note}"));
            }
        }
        line
    }

    /// Formats every metric of a row.
    pub fn format_detail(&self, row: &DashboardRow, now: DateTime<Utc>) -> String {
        let mut lines = vec![self.format_row(row, now)];
        if let Some(result) = row.view.result() {
            for metric in result.payload.metrics.iter().skip(1) {
                lines.push(format!(
                    "    {:<32} {}",
                    metric.label,
                    self.color_for_status(metric.status, &metric_value(metric))
                ));
            }
        }
        if let Some(error) = row.view.error() {
            lines.push(format!("    {}", self.red(&error.message)));
        }
        lines.join("\n")
    }

    /// Formats the watch-mode screen.
    pub fn format_dashboard(&self, rows: &[DashboardRow], now: DateTime<Utc>) -> String {
        let mut lines = Vec::new();
        lines.push(self.bold(&format!(
            "CloudMon - {}",
            now.with_timezone(&Local).format("%H:%M:%S")
        )));
        lines.push("─".repeat(70));

        if rows.is_empty() {
            lines.push(self.dim("No accounts configured. Add one with `cloudmon accounts add`."));
        }
        for row in rows {
            lines.push(self.format_row(row, now));
        }
        lines.join("\n")
    }

    fn format_health(&self, status: &AccountStatus) -> Option<String> {
        match status.health {
            Health::Healthy | Health::Pending => None,
            Health::Failing => Some(self.red(&format!(
                "! {}",
                status
                    .last_error
                    .as_ref()
                    .map_or("fetch failed", |e| e.message.as_str())
            ))),
            Health::NeedsReauth => Some(self.red("! re-authentication required")),
        }
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_status(&self, status: MetricStatus, text: &str) -> String {
        match status {
            MetricStatus::Normal => self.green(text),
            MetricStatus::Warning => self.yellow(text),
            MetricStatus::Error => self.red(text),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    /// Highlights a value for success messages.
    pub fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// Value with its provider-supplied unit.
pub fn metric_value(metric: &Metric) -> String {
    match &metric.unit {
        Some(unit) => format!("{} {unit}", metric.value),
        None => metric.value.clone(),
    }
}

/// Relative age of a timestamp.
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..60 => "just now".to_string(),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn format_interval(secs: u64) -> String {
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
