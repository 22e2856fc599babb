//! Google Gemini provider implementation.
//!
//! Gemini reports quota as the set of models the API key may call, with
//! their input/output token limits.

mod api;
mod descriptor;
mod error;
pub(crate) mod parser;
mod plugin;

pub use api::{GeminiApiClient, GEMINI_API_BASE};
pub use descriptor::{gemini_descriptor, API_KEY};
pub use error::GeminiError;
pub use plugin::GeminiPlugin;
