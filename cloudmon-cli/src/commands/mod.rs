//! CLI command implementations.

pub mod accounts;
pub mod poll;
pub mod providers;
pub mod watch;
