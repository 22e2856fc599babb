//! DigitalOcean provider implementation.
//!
//! DigitalOcean uses a personal access token (read scope, plus billing for
//! the cost query) against the v2 REST API.

mod api;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;

pub use api::{DigitalOceanApiClient, DO_API_BASE};
pub use descriptor::{digitalocean_descriptor, API_TOKEN};
pub use error::DigitalOceanError;
pub use plugin::DigitalOceanPlugin;
