//! DigitalOcean provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the personal access token.
pub const API_TOKEN: &str = "api_token";

/// Builds the DigitalOcean descriptor.
pub fn digitalocean_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("digitalocean")
        .display_name("DigitalOcean")
        .capability(QueryKind::Cost)
        .capability(QueryKind::InstanceList)
        .poll_interval(Duration::from_secs(15 * 60))
        .credential(API_TOKEN, "Personal access token")
        .dashboard_url("https://cloud.digitalocean.com/account/billing")
        .build()
}
