//! Watch command - live dashboard driven by manager events.

use std::io::{Write, stdout};

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use cloudmon_core::{AccountContext, FetchResult, ProviderId};
use cloudmon_store::{Event, EventFilter, SnapshotStore};
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

use crate::app::App;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Only watch this provider.
    #[arg(long, short)]
    pub provider: Option<String>,

    /// Seconds between screen redraws when no events arrive.
    #[arg(long, default_value = "30")]
    pub redraw: u64,

    /// Do not read or write the snapshot database.
    #[arg(long)]
    pub no_snapshot: bool,
}

/// Runs the watch command until Ctrl+C.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<ExitCode> {
    let app = App::load(cli).await?;

    let snapshot = if args.no_snapshot {
        None
    } else {
        match app.open_snapshot().await {
            Ok(snapshot) => {
                app.warm_start(&snapshot).await?;
                Some(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Snapshot unavailable, starting cold");
                None
            }
        }
    };

    let provider = args.provider.as_deref().map(ProviderId::from);
    let filter = match &provider {
        Some(id) if app.manager.descriptor(id).is_none() => bail!("Unknown provider: {id}"),
        Some(id) => EventFilter::Provider(id.clone()),
        None => EventFilter::All,
    };

    let mut events = app.manager.subscribe(filter);
    app.manager.start();
    info!(accounts = app.manager.accounts().len(), "Starting watch mode");

    let text = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(false);
    let mut redraw = interval(Duration::from_secs(args.redraw.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                debug!(event = event.name(), account = %event.account_id(), "Event");
                if let (Event::FetchSucceeded(result), Some(snapshot)) = (&event, &snapshot) {
                    save_result(snapshot, result.clone()).await;
                }
                if cli.format == OutputFormat::Json {
                    if let Some(key) = event.cache_key() {
                        let account = app.manager.account(&key.account());
                        for row in app.rows(account.iter()).iter().filter(|r| &r.key == key) {
                            println!("{}", json.format_row_line(row)?);
                        }
                    }
                    continue;
                }
            }
            _ = redraw.tick() => {}
        }

        if cli.format == OutputFormat::Text {
            let accounts: Vec<AccountContext> = app
                .manager
                .accounts()
                .into_iter()
                .filter(|a| provider.as_ref().is_none_or(|id| *id == a.provider_id))
                .collect();
            draw(&text, &app, &accounts, events.overrun_count())?;
        }
    }

    info!("Stopping");
    app.manager.shutdown().await;
    if let Some(snapshot) = &snapshot {
        if let Err(e) = snapshot.save(app.manager.cache().entries()).await {
            warn!(error = %e, "Failed to save snapshot");
        }
    }
    Ok(ExitCode::Success)
}

fn draw(formatter: &TextFormatter, app: &App, accounts: &[AccountContext], overruns: u64) -> Result<()> {
    print!("\x1b[2J\x1b[H");
    stdout().flush()?;

    let rows = app.rows(accounts);
    println!("{}", formatter.format_dashboard(&rows, Utc::now()));
    println!();
    if overruns > 0 {
        println!("{overruns} updates skipped while the screen was busy");
    }
    println!("Press Ctrl+C to exit");
    Ok(())
}

async fn save_result(snapshot: &SnapshotStore, result: FetchResult) {
    if let Err(e) = snapshot.save(vec![result]).await {
        warn!(error = %e, "Failed to save snapshot");
    }
}
