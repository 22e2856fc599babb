//! Zhipu AI provider implementation.
//!
//! Zhipu reports a prepaid account balance and the token resource packages
//! bought on top of it, both from one endpoint authenticated with an API key.

mod api;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;

pub use api::{ZhipuApiClient, ZHIPU_API_BASE};
pub use descriptor::{zhipu_descriptor, API_KEY};
pub use error::ZhipuError;
pub use plugin::ZhipuPlugin;
