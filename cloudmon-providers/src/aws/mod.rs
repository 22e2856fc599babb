//! AWS provider implementation.
//!
//! AWS uses an IAM access key pair. Requests are signed with SigV4; no SDK
//! is involved.

mod api;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;
pub mod sigv4;

pub use api::{AwsApiClient, DEFAULT_REGION};
pub use descriptor::{aws_descriptor, ACCESS_KEY_ID, REGION, SECRET_ACCESS_KEY, SESSION_TOKEN};
pub use error::AwsError;
pub use plugin::AwsPlugin;
