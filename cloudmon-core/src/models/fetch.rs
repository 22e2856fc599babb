//! Fetch result types.
//!
//! A [`FetchResult`] is the immutable outcome of one plugin invocation. Later
//! results for the same [`CacheKey`] supersede earlier ones; nothing mutates
//! a result after it is created.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::account::AccountKey;
use crate::models::provider::{ProviderId, QueryKind};

// ============================================================================
// Cache Key
// ============================================================================

/// Identifies one cacheable query: (provider, account, query kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Provider id.
    pub provider_id: ProviderId,
    /// Account id.
    pub account_id: String,
    /// Query kind.
    pub query_kind: QueryKind,
}

impl CacheKey {
    /// Creates a cache key.
    pub fn new(
        provider_id: impl Into<ProviderId>,
        account_id: impl Into<String>,
        query_kind: QueryKind,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            account_id: account_id.into(),
            query_kind,
        }
    }

    /// Creates a cache key for an account.
    pub fn for_account(account: &AccountKey, query_kind: QueryKind) -> Self {
        Self::new(account.provider_id.clone(), account.account_id.clone(), query_kind)
    }

    /// Returns the account part of the key.
    pub fn account(&self) -> AccountKey {
        AccountKey::new(self.provider_id.clone(), self.account_id.clone())
    }

    /// Returns true if this key belongs to the given account.
    pub fn belongs_to(&self, provider_id: &ProviderId, account_id: &str) -> bool {
        &self.provider_id == provider_id && self.account_id == account_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider_id, self.account_id, self.query_kind)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Severity of a single metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    /// Nothing notable.
    #[default]
    Normal,
    /// Worth attention.
    Warning,
    /// Needs action.
    Error,
}

/// One labelled value reported by a provider.
///
/// Units are provider-supplied and never converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Label, e.g. "Month to date".
    pub label: String,
    /// Display value, e.g. "12.50".
    pub value: String,
    /// Numeric value when the metric is a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Unit as reported by the provider, e.g. "USD".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Severity.
    #[serde(default)]
    pub status: MetricStatus,
}

impl Metric {
    /// Creates a textual metric.
    pub fn text(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            amount: None,
            unit: None,
            status: MetricStatus::Normal,
        }
    }

    /// Creates a numeric metric formatted with two decimals.
    ///
    /// Amounts that round to zero print as `0.00`, never `-0.00`.
    pub fn amount(label: impl Into<String>, amount: f64, unit: Option<&str>) -> Self {
        let mut value = format!("{amount:.2}");
        if value == "-0.00" {
            value.remove(0);
        }
        Self {
            label: label.into(),
            value,
            amount: Some(amount),
            unit: unit.map(str::to_string),
            status: MetricStatus::Normal,
        }
    }

    /// Creates a count metric.
    #[allow(clippy::cast_precision_loss)]
    pub fn count(label: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            value: count.to_string(),
            amount: Some(count as f64),
            unit: None,
            status: MetricStatus::Normal,
        }
    }

    /// Sets the severity.
    pub fn with_status(mut self, status: MetricStatus) -> Self {
        self.status = status;
        self
    }
}

/// Provider-defined structured data.
///
/// The first metric is the headline figure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Metrics in display order.
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// Free-form extra data (breakdowns, raw identifiers).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a metric.
    pub fn push(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    /// Adds an attribute.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the headline metric.
    pub fn headline(&self) -> Option<&Metric> {
        self.metrics.first()
    }

    /// Returns the most severe metric status.
    pub fn overall_status(&self) -> MetricStatus {
        self.metrics
            .iter()
            .map(|m| m.status)
            .max_by_key(|s| match s {
                MetricStatus::Normal => 0,
                MetricStatus::Warning => 1,
                MetricStatus::Error => 2,
            })
            .unwrap_or_default()
    }
}

impl FromIterator<Metric> for Payload {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self {
            metrics: iter.into_iter().collect(),
            attributes: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Failure
// ============================================================================

/// Normalized failure category stored in results and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, rate limit, or server error; retries were exhausted.
    Transient,
    /// Credentials rejected; the account needs re-authentication.
    Authentication,
    /// Credentials could not be read from the vault.
    CredentialsUnavailable,
    /// Unparseable or unexpected provider response.
    InvalidResponse,
    /// Query kind not supported by the plugin.
    Unsupported,
}

impl FailureKind {
    /// Returns true if the user must re-enter credentials.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::Authentication | Self::CredentialsUnavailable)
    }
}

/// Failure detail attached to a failed [`FetchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Category.
    pub kind: FailureKind,
    /// Human-readable detail. Never contains secrets.
    pub message: String,
}

impl FetchFailure {
    /// Creates a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ProviderError> for FetchFailure {
    fn from(err: &ProviderError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ============================================================================
// Fetch Result
// ============================================================================

/// Immutable outcome of one plugin invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Which query this answers.
    pub key: CacheKey,
    /// Provider data; empty on failure.
    #[serde(default)]
    pub payload: Payload,
    /// When the fetch finished.
    pub fetched_at: DateTime<Utc>,
    /// Whether the fetch succeeded.
    pub success: bool,
    /// Failure detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchFailure>,
    /// Number of plugin calls made, including retries.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl FetchResult {
    /// Creates a successful result stamped now.
    pub fn success(key: CacheKey, payload: Payload) -> Self {
        Self {
            key,
            payload,
            fetched_at: Utc::now(),
            success: true,
            error: None,
            attempts: 1,
        }
    }

    /// Creates a failed result stamped now.
    pub fn failure(key: CacheKey, error: FetchFailure) -> Self {
        Self {
            key,
            payload: Payload::default(),
            fetched_at: Utc::now(),
            success: false,
            error: Some(error),
            attempts: 1,
        }
    }

    /// Records the number of attempts used.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Returns the failure kind, if failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
