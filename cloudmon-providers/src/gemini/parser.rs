//! Gemini model listing types and payload conversion.

use cloudmon_core::{Metric, MetricStatus, Payload};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::format::{format_tokens, shorten};

/// Generation method a model must support to count as available.
const GENERATE_CONTENT: &str = "generateContent";

/// Models listed as individual metrics.
const LISTED_MODELS: usize = 5;

/// `GET /v1beta/models`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    /// Models on this page.
    #[serde(default)]
    pub models: Vec<GeminiModel>,
    /// Continuation token.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One model entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModel {
    /// Resource name (`models/gemini-1.5-pro`).
    #[serde(default)]
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Input token limit.
    #[serde(default)]
    pub input_token_limit: u64,
    /// Output token limit.
    #[serde(default)]
    pub output_token_limit: u64,
    /// Supported generation methods.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

/// A model the key can generate content with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableModel {
    /// Model id without the `models/` prefix.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Input token limit.
    pub input_token_limit: u64,
    /// Output token limit.
    pub output_token_limit: u64,
}

/// Keeps models supporting content generation.
pub fn available_models(models: &[GeminiModel]) -> Vec<AvailableModel> {
    models
        .iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|method| method == GENERATE_CONTENT)
        })
        .map(|m| {
            let name = m.name.strip_prefix("models/").unwrap_or(&m.name).to_string();
            AvailableModel {
                display_name: m.display_name.clone().unwrap_or_else(|| name.clone()),
                name,
                input_token_limit: m.input_token_limit,
                output_token_limit: m.output_token_limit,
            }
        })
        .collect()
}

fn short_model_name(name: &str) -> String {
    shorten(name.strip_prefix("gemini-").unwrap_or(name), 20)
}

/// Builds the quota payload.
///
/// An empty model list is a warning: the key is valid but cannot generate.
pub fn quota_payload(models: &[GeminiModel]) -> Payload {
    let available = available_models(models);
    debug!(total = models.len(), available = available.len(), "Parsed Gemini models");

    let status = if available.is_empty() {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };

    let mut payload = Payload::new().with_attribute(
        "models",
        serde_json::to_value(&available).unwrap_or_default(),
    );
    payload.push(Metric::count("Available models", available.len() as u64).with_status(status));

    for model in available.iter().take(LISTED_MODELS) {
        payload.push(Metric::text(
            short_model_name(&model.name),
            format!(
                "{}/{}",
                format_tokens(model.input_token_limit),
                format_tokens(model.output_token_limit)
            ),
        ));
    }

    if available.len() > LISTED_MODELS {
        payload.push(Metric::text(
            "More",
            format!("{} more models", available.len() - LISTED_MODELS),
        ));
    }

    payload
}
