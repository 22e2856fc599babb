//! Google Cloud provider implementation.
//!
//! GCP has no synchronous billing API. Cost is read from the Cloud Billing
//! export in BigQuery, authenticated with a service account key (RS256 JWT
//! exchanged for an OAuth2 access token).

mod api;
pub mod auth;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;

pub use api::{GcpApiClient, BIGQUERY_BASE};
pub use auth::ServiceAccountKey;
pub use descriptor::{gcp_descriptor, BIGQUERY_TABLE, SERVICE_ACCOUNT_JSON};
pub use error::GcpError;
pub use plugin::GcpPlugin;
