//! Accounts command - add, update, remove, and list configured accounts.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use cloudmon_core::{AccountContext, AccountKey, CredentialBundle, ProviderDescriptor, ProviderId};
use tracing::{info, warn};

use crate::app::App;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the accounts command.
#[derive(Args)]
pub struct AccountsArgs {
    #[command(subcommand)]
    pub action: AccountsAction,
}

/// Accounts subcommands.
#[derive(Subcommand)]
pub enum AccountsAction {
    /// Store an account's secrets, validate them, and save the account.
    Add(AddArgs),

    /// Change an account's settings or rotate its secrets.
    Update(UpdateArgs),

    /// Delete an account and its secrets.
    Remove {
        /// Provider id.
        provider: String,
        /// Account id.
        account: String,
    },

    /// List configured accounts.
    List,
}

/// Arguments for `accounts add`.
#[derive(Args)]
pub struct AddArgs {
    /// Provider id (see `cloudmon providers`).
    pub provider: String,

    /// Account id, unique per provider.
    pub account: String,

    /// Display name.
    #[arg(long)]
    pub label: Option<String>,

    /// Region override.
    #[arg(long)]
    pub region: Option<String>,

    /// Polling interval in seconds.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Credential field as name=value. Repeatable. Missing fields are read
    /// from CLOUDMON_<PROVIDER>_<FIELD>.
    #[arg(long = "secret", value_name = "NAME=VALUE", value_parser = parse_secret)]
    pub secrets: Vec<(String, String)>,

    /// Save the account without polling it.
    #[arg(long)]
    pub disabled: bool,
}

/// Arguments for `accounts update`.
#[derive(Args)]
pub struct UpdateArgs {
    /// Provider id.
    pub provider: String,

    /// Account id.
    pub account: String,

    /// New display name.
    #[arg(long)]
    pub label: Option<String>,

    /// New region override.
    #[arg(long)]
    pub region: Option<String>,

    /// New polling interval in seconds.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Replacement credential field as name=value. Repeatable. Fields not
    /// given keep their stored values.
    #[arg(long = "secret", value_name = "NAME=VALUE", value_parser = parse_secret)]
    pub secrets: Vec<(String, String)>,

    /// Resume polling.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Stop polling without removing the account.
    #[arg(long)]
    pub disable: bool,
}

impl UpdateArgs {
    /// Applies the given flags to the current settings.
    fn apply(&self, mut context: AccountContext) -> AccountContext {
        if let Some(label) = &self.label {
            context.label = Some(label.clone());
        }
        if let Some(region) = &self.region {
            context.region = Some(region.clone());
        }
        if let Some(secs) = self.interval {
            context = context.with_poll_interval(Duration::from_secs(secs));
        }
        if self.enable {
            context.enabled = true;
        } else if self.disable {
            context.enabled = false;
        }
        context
    }

    fn secret_bundle(&self) -> Option<CredentialBundle> {
        (!self.secrets.is_empty()).then(|| self.secrets.iter().cloned().collect())
    }
}

/// Runs the accounts command.
pub async fn run(args: &AccountsArgs, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        AccountsAction::Add(add) => add_account(add, cli).await,
        AccountsAction::Update(update) => update_account(update, cli).await,
        AccountsAction::Remove { provider, account } => {
            remove_account(provider, account, cli).await
        }
        AccountsAction::List => list_accounts(cli).await,
    }
}

async fn add_account(args: &AddArgs, cli: &Cli) -> Result<ExitCode> {
    let mut app = App::load(cli).await?;
    let provider_id = ProviderId::from(args.provider.as_str());
    let Some(descriptor) = app.manager.descriptor(&provider_id) else {
        bail!("Unknown provider: {}", args.provider);
    };

    let mut context = AccountContext::new(provider_id, args.account.clone());
    context.label = args.label.clone();
    context.region = args.region.clone();
    context.enabled = !args.disabled;
    if let Some(secs) = args.interval {
        context = context.with_poll_interval(Duration::from_secs(secs));
    }

    let secrets = collect_secrets(&descriptor, &args.secrets, |name| std::env::var(name).ok())?;
    info!(account = %context.key(), fields = secrets.len(), "Adding account");

    app.manager.add_account(context.clone(), secrets).await?;
    app.config.upsert_account(context.clone());
    app.save_config().await?;

    if !cli.quiet {
        let formatter = TextFormatter::new(!cli.no_color);
        println!(
            "Added {} ({})",
            formatter.cyan(&context.key().to_string()),
            descriptor.display_name
        );
    }
    Ok(ExitCode::Success)
}

async fn update_account(args: &UpdateArgs, cli: &Cli) -> Result<ExitCode> {
    let mut app = App::load(cli).await?;
    let key = AccountKey::new(args.provider.as_str(), args.account.as_str());
    let Some(current) = app.manager.account(&key) else {
        bail!("Account not found: {key}");
    };

    let context = args.apply(current);
    let secrets = args.secret_bundle();
    info!(
        account = %key,
        fields = secrets.as_ref().map_or(0, CredentialBundle::len),
        "Updating account"
    );

    app.manager.update_account(context.clone(), secrets).await?;
    app.config.upsert_account(context);
    app.save_config().await?;

    match app.open_snapshot().await {
        Ok(snapshot) => {
            snapshot.delete_account(&key.provider_id, &key.account_id).await?;
        }
        Err(e) => warn!(error = %e, "Snapshot unavailable, saved results kept"),
    }

    if !cli.quiet {
        println!("Updated {key}");
    }
    Ok(ExitCode::Success)
}

async fn remove_account(provider: &str, account: &str, cli: &Cli) -> Result<ExitCode> {
    let mut app = App::load(cli).await?;
    let provider_id = ProviderId::from(provider);
    let key = AccountKey::new(provider_id.clone(), account);

    if app.manager.account(&key).is_none() {
        bail!("Account not found: {key}");
    }
    app.manager.remove_account(&provider_id, account).await?;
    app.config.remove_account(&key);
    app.save_config().await?;

    match app.open_snapshot().await {
        Ok(snapshot) => {
            snapshot.delete_account(&provider_id, account).await?;
        }
        Err(e) => warn!(error = %e, "Snapshot unavailable, saved results kept"),
    }

    if !cli.quiet {
        println!("Removed {key}");
    }
    Ok(ExitCode::Success)
}

async fn list_accounts(cli: &Cli) -> Result<ExitCode> {
    let app = App::load(cli).await?;
    let accounts = &app.config.accounts;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_accounts_header());
            println!("{}", "─".repeat(90));
            for account in accounts {
                println!("{}", formatter.format_account_line(account));
            }
            println!();
            println!("Total: {} accounts", accounts.len());
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_accounts(accounts)?);
        }
    }
    Ok(ExitCode::Success)
}

// ============================================================================
// Secrets
// ============================================================================

fn parse_secret(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}

/// Environment variable consulted for a credential field.
fn env_var_name(provider: &ProviderId, field: &str) -> String {
    format!("CLOUDMON_{}_{}", provider.as_str(), field)
        .to_ascii_uppercase()
        .replace('-', "_")
}

/// Builds the bundle from explicit values, then the environment.
///
/// Fails listing every required field that is still missing.
fn collect_secrets(
    descriptor: &ProviderDescriptor,
    explicit: &[(String, String)],
    env: impl Fn(&str) -> Option<String>,
) -> Result<CredentialBundle> {
    let mut bundle: CredentialBundle = explicit.iter().cloned().collect();

    for field in &descriptor.credential_fields {
        if bundle.contains(&field.name) {
            continue;
        }
        if let Some(value) = env(&env_var_name(&descriptor.id, &field.name)) {
            bundle.insert(field.name.clone(), value);
        }
    }

    let missing: Vec<String> = descriptor
        .required_fields()
        .filter(|name| !bundle.contains(name))
        .map(|name| format!("{name} (or {})", env_var_name(&descriptor.id, name)))
        .collect();
    if !missing.is_empty() {
        bail!("Missing credentials: {}", missing.join(", "));
    }
    Ok(bundle)
}
