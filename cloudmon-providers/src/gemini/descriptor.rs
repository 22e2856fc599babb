//! Gemini provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the API key.
pub const API_KEY: &str = "api_key";

/// Builds the Gemini descriptor.
pub fn gemini_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("gemini")
        .display_name("Gemini API")
        .capability(QueryKind::Quota)
        .poll_interval(Duration::from_secs(5 * 60))
        .credential(API_KEY, "API key")
        .dashboard_url("https://aistudio.google.com/app/apikey")
        .build()
}
