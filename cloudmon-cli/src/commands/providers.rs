//! Providers command - list supported providers.

use anyhow::Result;
use cloudmon_providers::ProviderRegistry;
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the providers command.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    info!("Listing providers");

    let providers = ProviderRegistry::descriptors();

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);

            println!("{}", formatter.format_providers_header());
            println!("{}", "─".repeat(90));
            for desc in &providers {
                println!("{}", formatter.format_provider_line(desc));
                if cli.verbose {
                    println!("{}", formatter.format_credential_fields(desc));
                }
            }

            println!();
            println!("Total: {} providers", providers.len());
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_providers(&providers)?);
        }
    }

    Ok(ExitCode::Success)
}
