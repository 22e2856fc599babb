//! Azure provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the Entra ID tenant.
pub const TENANT_ID: &str = "tenant_id";

/// Credential field holding the service principal's application id.
pub const CLIENT_ID: &str = "client_id";

/// Credential field holding the service principal's secret.
pub const CLIENT_SECRET: &str = "client_secret";

/// Credential field holding the subscription to monitor.
pub const SUBSCRIPTION_ID: &str = "subscription_id";

/// Builds the Azure descriptor.
pub fn azure_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("azure")
        .display_name("Microsoft Azure")
        .capability(QueryKind::Cost)
        .capability(QueryKind::InstanceList)
        .poll_interval(Duration::from_secs(30 * 60))
        .credential(TENANT_ID, "Tenant ID")
        .credential(CLIENT_ID, "Client ID")
        .credential(CLIENT_SECRET, "Client secret")
        .credential(SUBSCRIPTION_ID, "Subscription ID")
        .dashboard_url("https://portal.azure.com/#view/Microsoft_Azure_CostManagement")
        .build()
}
