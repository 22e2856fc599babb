//! Provider-related types.
//!
//! This module contains types describing cloud provider plugins:
//! - [`ProviderId`] - Unique provider identifier
//! - [`QueryKind`] - Category of data a plugin can fetch
//! - [`CredentialField`] - A credential a plugin needs
//! - [`ProviderDescriptor`] - Static plugin metadata

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default polling interval when a plugin does not specify one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Provider Id
// ============================================================================

/// Unique provider identifier, e.g. `aws` or `digitalocean`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Creates a provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Query Kind
// ============================================================================

/// The category of data requested from a provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Month-to-date spend.
    Cost,
    /// API or resource quota.
    Quota,
    /// Running compute instances.
    InstanceList,
}

impl QueryKind {
    /// Returns all query kinds.
    pub fn all() -> &'static [QueryKind] {
        &[Self::Cost, Self::Quota, Self::InstanceList]
    }

    /// Returns the stable string form used in keys and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Quota => "quota",
            Self::InstanceList => "instance_list",
        }
    }

    /// Returns a human-readable label.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cost => "Cost",
            Self::Quota => "Quota",
            Self::InstanceList => "Instances",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost" => Ok(Self::Cost),
            "quota" => Ok(Self::Quota),
            "instance_list" | "instance-list" | "instances" => Ok(Self::InstanceList),
            other => Err(CoreError::UnknownQueryKind(other.to_string())),
        }
    }
}

// ============================================================================
// Credential Field
// ============================================================================

/// A credential field a plugin reads from the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialField {
    /// Field name used as the vault key suffix (e.g. `api_token`).
    pub name: String,
    /// Human-readable label for settings forms.
    pub label: String,
    /// Whether the field must be present for the plugin to work.
    pub required: bool,
}

impl CredentialField {
    /// Creates a required field.
    pub fn required(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: true,
        }
    }

    /// Creates an optional field.
    pub fn optional(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: false,
        }
    }
}

// ============================================================================
// Provider Descriptor
// ============================================================================

/// Static metadata identifying a provider plugin.
///
/// Immutable once registered with the plugin manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Unique provider id.
    pub id: ProviderId,
    /// Display name.
    pub display_name: String,
    /// Query kinds this plugin can answer.
    pub capabilities: BTreeSet<QueryKind>,
    /// Default polling interval for accounts of this provider.
    pub poll_interval: Duration,
    /// Credential fields the plugin needs.
    pub credential_fields: Vec<CredentialField>,
    /// Link to the provider's billing console.
    pub dashboard_url: Option<String>,
}

impl ProviderDescriptor {
    /// Creates a new descriptor builder.
    pub fn builder(id: impl Into<ProviderId>) -> ProviderDescriptorBuilder {
        ProviderDescriptorBuilder::new(id.into())
    }

    /// Returns true if the plugin can answer the given query kind.
    pub fn supports(&self, query: QueryKind) -> bool {
        self.capabilities.contains(&query)
    }

    /// Returns the names of all required credential fields.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.credential_fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

/// Builder for [`ProviderDescriptor`].
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
    id: ProviderId,
    display_name: Option<String>,
    capabilities: BTreeSet<QueryKind>,
    poll_interval: Duration,
    credential_fields: Vec<CredentialField>,
    dashboard_url: Option<String>,
}

impl ProviderDescriptorBuilder {
    /// Creates a new builder for the given provider.
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            display_name: None,
            capabilities: BTreeSet::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            credential_fields: Vec::new(),
            dashboard_url: None,
        }
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Adds a capability.
    pub fn capability(mut self, query: QueryKind) -> Self {
        self.capabilities.insert(query);
        self
    }

    /// Sets the default polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Adds a required credential field.
    pub fn credential(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.credential_fields
            .push(CredentialField::required(name, label));
        self
    }

    /// Adds an optional credential field.
    pub fn optional_credential(
        mut self,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.credential_fields
            .push(CredentialField::optional(name, label));
        self
    }

    /// Sets the billing console URL.
    pub fn dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_url = Some(url.into());
        self
    }

    /// Builds the descriptor.
    pub fn build(self) -> ProviderDescriptor {
        ProviderDescriptor {
            display_name: self
                .display_name
                .unwrap_or_else(|| self.id.as_str().to_string()),
            id: self.id,
            capabilities: self.capabilities,
            poll_interval: self.poll_interval,
            credential_fields: self.credential_fields,
            dashboard_url: self.dashboard_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_kind_parse() {
        assert_eq!("cost".parse::<QueryKind>().unwrap(), QueryKind::Cost);
        assert_eq!(" Quota ".parse::<QueryKind>().unwrap(), QueryKind::Quota);
        assert_eq!(
            "instance-list".parse::<QueryKind>().unwrap(),
            QueryKind::InstanceList
        );
        assert_eq!(
            "instances".parse::<QueryKind>().unwrap(),
            QueryKind::InstanceList
        );
        assert!("billing".parse::<QueryKind>().is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let desc = ProviderDescriptor::builder("mock").build();
        assert_eq!(desc.display_name, "mock");
        assert_eq!(desc.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(desc.capabilities.is_empty());
    }

    #[test]
    fn test_builder_capabilities_and_fields() {
        let desc = ProviderDescriptor::builder("aws")
            .display_name("AWS")
            .capability(QueryKind::Cost)
            .capability(QueryKind::InstanceList)
            .credential("access_key_id", "Access key ID")
            .optional_credential("region", "Region")
            .build();

        assert!(desc.supports(QueryKind::Cost));
        assert!(!desc.supports(QueryKind::Quota));
        let required: Vec<_> = desc.required_fields().collect();
        assert_eq!(required, vec!["access_key_id"]);
        assert_eq!(desc.credential_fields.len(), 2);
    }
}
