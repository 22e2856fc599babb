//! Per-account polling tasks.
//!
//! Each enabled account gets one Tokio task that ticks at the account's
//! polling interval and refreshes every query kind its provider supports.
//! Tasks are started by [`PluginManager::start`], by `add_account` while the
//! scheduler runs, restarted by `update_account`, and stopped by
//! `remove_account` or [`PluginManager::shutdown`].

use std::collections::HashMap;
use std::sync::Arc;

use cloudmon_core::{AccountContext, AccountKey, QueryKind};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::cycle::PollOutcome;
use crate::manager::{PluginManager, RegisteredPlugin, lock_scheduler};

#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    running: bool,
    tasks: HashMap<AccountKey, AccountTask>,
}

#[derive(Debug)]
struct AccountTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PluginManager {
    /// Starts polling every enabled account.
    ///
    /// Calling it again while running does nothing. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        let mut state = lock_scheduler(&self.inner);
        if state.running {
            debug!("Scheduler already running");
            return;
        }
        state.running = true;
        for (context, epoch) in self.account_entries() {
            if let Some((key, task)) = self.spawn_task(context, epoch) {
                state.tasks.insert(key, task);
            }
        }
        info!(accounts = state.tasks.len(), "Scheduler started");
    }

    /// Returns true between [`Self::start`] and [`Self::shutdown`].
    pub fn is_running(&self) -> bool {
        lock_scheduler(&self.inner).running
    }

    /// Stops every polling task and waits for in-flight fetches to drain.
    pub async fn shutdown(&self) {
        let tasks: Vec<AccountTask> = {
            let mut state = lock_scheduler(&self.inner);
            state.running = false;
            state.tasks.drain().map(|(_, task)| task).collect()
        };
        for task in &tasks {
            task.stop.send_replace(true);
        }

        let count = tasks.len();
        for joined in join_all(tasks.into_iter().map(|t| t.handle)).await {
            if let Err(e) = joined {
                error!(error = %e, "Polling task failed");
            }
        }
        info!(tasks = count, "Scheduler stopped");
    }

    pub(crate) fn spawn_if_running(&self, context: AccountContext, epoch: u64) {
        let mut state = lock_scheduler(&self.inner);
        if !state.running {
            return;
        }
        if let Some((key, task)) = self.spawn_task(context, epoch) {
            if let Some(previous) = state.tasks.insert(key, task) {
                previous.stop.send_replace(true);
            }
        }
    }

    /// Signals an account's task to stop without waiting for it.
    pub(crate) fn stop_account_task(&self, key: &AccountKey) {
        if let Some(task) = lock_scheduler(&self.inner).tasks.remove(key) {
            task.stop.send_replace(true);
        }
    }

    fn spawn_task(&self, context: AccountContext, epoch: u64) -> Option<(AccountKey, AccountTask)> {
        if !context.enabled {
            debug!(account = %context.key(), "Account disabled, not scheduling");
            return None;
        }
        let registered = self.plugin(&context.provider_id)?;
        let (stop, stop_rx) = watch::channel(false);
        let key = context.key();
        let handle = tokio::spawn(run_account(
            self.clone(),
            registered,
            context,
            epoch,
            stop_rx,
        ));
        Some((key, AccountTask { stop, handle }))
    }

    /// One scheduled pass over every supported query kind.
    pub(crate) async fn tick(
        &self,
        registered: &RegisteredPlugin,
        context: &AccountContext,
        epoch: u64,
    ) -> Vec<PollOutcome> {
        let queries: Vec<QueryKind> = registered.descriptor.capabilities.iter().copied().collect();
        join_all(
            queries
                .into_iter()
                .map(|query| self.refresh_scheduled(registered, context, epoch, query)),
        )
        .await
    }
}

#[instrument(skip_all, fields(account = %context.key()))]
async fn run_account(
    manager: PluginManager,
    registered: Arc<RegisteredPlugin>,
    context: AccountContext,
    epoch: u64,
    mut stop: watch::Receiver<bool>,
) {
    let period = manager.poll_interval(&context, &registered.descriptor);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?period, "Polling task started");

    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !manager.is_current(&context.key(), epoch) {
                    warn!("Account no longer registered, stopping");
                    break;
                }
                let outcomes = manager.tick(&registered, &context, epoch).await;
                let fetched = outcomes.iter().filter(|o| o.is_fetched()).count();
                trace!(fetched, total = outcomes.len(), "Tick complete");
            }
        }
    }
    debug!("Polling task stopped");
}
