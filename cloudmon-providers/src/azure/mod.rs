//! Azure provider implementation.
//!
//! Azure authenticates with a service principal (client credentials flow
//! against Entra ID) and reads the Cost Management and Compute REST APIs of
//! one subscription.

mod api;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;

pub use api::{AzureApiClient, ServicePrincipal, LOGIN_BASE, MANAGEMENT_BASE};
pub use descriptor::{azure_descriptor, CLIENT_ID, CLIENT_SECRET, SUBSCRIPTION_ID, TENANT_ID};
pub use error::AzureError;
pub use plugin::AzurePlugin;
