//! Gemini API client.

use cloudmon_fetch::HttpClient;
use tracing::{debug, instrument};

use super::error::GeminiError;
use super::parser::{GeminiModel, ModelsResponse};

// ============================================================================
// Constants
// ============================================================================

/// Generative Language API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Model listing endpoint.
const MODELS_ENDPOINT: &str = "/v1beta/models";

/// Header carrying the API key, so it stays out of logged URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Page size requested from the listing.
const PAGE_SIZE: u32 = 1000;

/// Upper bound on followed pages.
const MAX_PAGES: usize = 5;

// ============================================================================
// API Client
// ============================================================================

/// Gemini API client.
#[derive(Debug, Clone)]
pub struct GeminiApiClient {
    http: HttpClient,
    base_url: String,
}

impl GeminiApiClient {
    /// Creates a client for the public API.
    pub fn new() -> Self {
        Self::with_base_url(GEMINI_API_BASE)
    }

    /// Creates a client against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[base_url.as_str()]),
            base_url,
        }
    }

    /// Fetches one page of the model listing.
    #[instrument(skip(self, api_key))]
    pub async fn fetch_models_page(
        &self,
        api_key: &str,
        page_token: Option<&str>,
    ) -> Result<ModelsResponse, GeminiError> {
        let url = format!("{}{}", self.base_url, MODELS_ENDPOINT);
        let mut request = self
            .http
            .get(&url)?
            .header(API_KEY_HEADER, api_key)
            .query(&[("pageSize", PAGE_SIZE)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        Ok(self.http.send_json(request).await?)
    }

    /// Fetches the full model listing, following continuation tokens.
    #[instrument(skip(self, api_key))]
    pub async fn fetch_models(&self, api_key: &str) -> Result<Vec<GeminiModel>, GeminiError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let response = self.fetch_models_page(api_key, page_token.as_deref()).await?;
            debug!(page, count = response.models.len(), "Fetched Gemini model page");
            models.extend(response.models);

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(models)
    }
}

impl Default for GeminiApiClient {
    fn default() -> Self {
        Self::new()
    }
}
