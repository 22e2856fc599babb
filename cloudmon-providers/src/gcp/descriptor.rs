//! GCP provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the service account key (inline JSON or a path).
pub const SERVICE_ACCOUNT_JSON: &str = "service_account_json";

/// Credential field naming the billing export table (`project.dataset.table`).
pub const BIGQUERY_TABLE: &str = "bigquery_table";

/// Builds the GCP descriptor.
pub fn gcp_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("gcp")
        .display_name("Google Cloud")
        .capability(QueryKind::Cost)
        .poll_interval(Duration::from_secs(60 * 60))
        .credential(SERVICE_ACCOUNT_JSON, "Service account key (JSON or file path)")
        .credential(BIGQUERY_TABLE, "Billing export table (project.dataset.table)")
        .dashboard_url("https://console.cloud.google.com/billing")
        .build()
}
