//! Registration table of the built-in provider plugins.
//!
//! The plugin manager has no discovery mechanism: the binary calls
//! [`ProviderRegistry::builtin`] at startup and registers each entry.

use std::sync::Arc;

use cloudmon_core::{ProviderDescriptor, ProviderId, ProviderPlugin};

use crate::aws::{aws_descriptor, AwsPlugin};
use crate::azure::{azure_descriptor, AzurePlugin};
use crate::digitalocean::{digitalocean_descriptor, DigitalOceanPlugin};
use crate::gcp::{gcp_descriptor, GcpPlugin};
use crate::gemini::{gemini_descriptor, GeminiPlugin};
use crate::zhipu::{zhipu_descriptor, ZhipuPlugin};

// ============================================================================
// Provider Registry
// ============================================================================

/// Static access to the built-in providers.
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Returns one instance of every built-in plugin.
    ///
    /// Order: the three hyperscalers, then the others.
    pub fn builtin() -> Vec<Arc<dyn ProviderPlugin>> {
        vec![
            Arc::new(AwsPlugin::new()),
            Arc::new(AzurePlugin::new()),
            Arc::new(GcpPlugin::new()),
            Arc::new(DigitalOceanPlugin::new()),
            Arc::new(GeminiPlugin::new()),
            Arc::new(ZhipuPlugin::new()),
        ]
    }

    /// Returns all built-in descriptors.
    pub fn descriptors() -> Vec<ProviderDescriptor> {
        vec![
            aws_descriptor(),
            azure_descriptor(),
            gcp_descriptor(),
            digitalocean_descriptor(),
            gemini_descriptor(),
            zhipu_descriptor(),
        ]
    }

    /// Looks up a descriptor by provider id.
    pub fn get(id: &str) -> Option<ProviderDescriptor> {
        Self::descriptors().into_iter().find(|d| d.id.as_str() == id)
    }

    /// Returns all built-in provider ids.
    pub fn ids() -> Vec<ProviderId> {
        Self::descriptors().into_iter().map(|d| d.id).collect()
    }

    /// Returns the number of built-in providers.
    pub fn count() -> usize {
        Self::descriptors().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
