//! Poll command - fetch one account now.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use cloudmon_core::{AccountKey, FetchResult, ProviderId, QueryKind};
use cloudmon_manager::PollOutcome;
use tracing::{info, warn};

use crate::app::App;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the poll command.
#[derive(Args)]
pub struct PollArgs {
    /// Provider id.
    pub provider: String,

    /// Account id.
    pub account: String,

    /// Query kind (cost, quota, instance_list). Defaults to every kind the
    /// provider supports.
    #[arg(long, short = 'k')]
    pub query: Option<QueryKind>,

    /// Do not save results to the snapshot database.
    #[arg(long)]
    pub no_snapshot: bool,
}

/// Runs the poll command.
pub async fn run(args: &PollArgs, cli: &Cli) -> Result<ExitCode> {
    let app = App::load(cli).await?;
    let provider_id = ProviderId::from(args.provider.as_str());
    let key = AccountKey::new(provider_id.clone(), args.account.as_str());
    let Some(account) = app.manager.account(&key) else {
        bail!("Account not found: {key}");
    };

    info!(account = %key, query = ?args.query, "Polling");
    let outcomes = match args.query {
        Some(query) => vec![app.manager.poll_once(&provider_id, &args.account, query).await?],
        None => app.manager.poll_account(&provider_id, &args.account).await?,
    };

    let results: Vec<FetchResult> = outcomes.into_iter().filter_map(PollOutcome::into_result).collect();
    let failed = results.iter().any(|r| !r.success);

    if !args.no_snapshot {
        save_snapshot(&app, results).await;
    }

    let rows: Vec<_> = app
        .rows([&account])
        .into_iter()
        .filter(|row| args.query.is_none_or(|q| q == row.key.query_kind))
        .collect();

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            let now = Utc::now();
            for row in &rows {
                println!("{}", formatter.format_detail(row, now));
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_rows(&rows)?);
        }
    }

    Ok(if failed {
        ExitCode::FetchFailed
    } else {
        ExitCode::Success
    })
}

async fn save_snapshot(app: &App, results: Vec<FetchResult>) {
    let saved = match app.open_snapshot().await {
        Ok(snapshot) => snapshot.save(results).await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    if let Err(e) = saved {
        warn!(error = %e, "Failed to save snapshot");
    }
}
