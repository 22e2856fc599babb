//! Zhipu provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the API key.
pub const API_KEY: &str = "api_key";

/// Builds the Zhipu descriptor.
pub fn zhipu_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("zhipu")
        .display_name("Zhipu AI")
        .capability(QueryKind::Cost)
        .capability(QueryKind::Quota)
        .poll_interval(Duration::from_secs(15 * 60))
        .credential(API_KEY, "API key")
        .dashboard_url("https://open.bigmodel.cn/usercenter/apikeys")
        .build()
}
