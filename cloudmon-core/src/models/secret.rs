//! Secret wrappers.
//!
//! Secret values are deliberately not `Serialize` and print as `***` under
//! `Debug`, so they cannot leak into logs, events, or cache dumps.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProviderError;

/// A credential value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps a secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the secret is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Resolved credentials for a single fetch or validation call.
///
/// Built fresh from the vault for every fetch cycle and dropped afterwards.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    fields: BTreeMap<String, SecretValue>,
}

impl CredentialBundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<SecretValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<SecretValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Returns a field's value, if present and non-blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .filter(|v| !v.is_blank())
            .map(SecretValue::expose)
    }

    /// Returns a field's value or a [`ProviderError::MissingCredential`].
    ///
    /// # Errors
    ///
    /// Fails when the field is absent or blank.
    pub fn require(&self, field: &str) -> Result<&str, ProviderError> {
        self.get(field)
            .ok_or_else(|| ProviderError::MissingCredential(field.to_string()))
    }

    /// Returns true if the field is present and non-blank.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterates over field names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the bundle has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fields.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<SecretValue>> FromIterator<(K, V)> for CredentialBundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bundle = Self::new();
        for (k, v) in iter {
            bundle.insert(k, v);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_values() {
        let bundle = CredentialBundle::new().with("api_token", "dop_v1_supersecret");
        let debug = format!("{bundle:?}");
        assert!(debug.contains("api_token"));
        assert!(!debug.contains("supersecret"));
        assert_eq!(format!("{:?}", SecretValue::new("x")), "***");
    }

    #[test]
    fn test_require_rejects_blank() {
        let bundle: CredentialBundle = [("api_key", "  "), ("region", "us-east-1")]
            .into_iter()
            .collect();
        assert!(matches!(
            bundle.require("api_key"),
            Err(ProviderError::MissingCredential(f)) if f == "api_key"
        ));
        assert_eq!(bundle.require("region").unwrap(), "us-east-1");
        assert!(!bundle.contains("missing"));
    }
}
