//! End-to-end flows through the manager with scripted plugins.

use std::sync::Arc;
use std::time::Duration;

use cloudmon_core::{
    AccountContext, AccountKey, CacheKey, FailureKind, ProviderError, ProviderId, QueryKind,
};
use cloudmon_store::{Event, EventFilter, Freshness, ManagerConfig};
use futures::future::join_all;
use tokio::sync::Notify;
use tracing_test::traced_test;

use crate::cycle::PollOutcome;
use crate::error::ManagerError;
use crate::status::Health;
use crate::test_support::{
    MockPlugin, cost_payload, drain, fixture, fixture_with_config, secrets, test_config,
    wait_for_calls,
};

fn transient(message: &str) -> ProviderError {
    ProviderError::transient(message)
}

// ============================================================================
// Accounts Across Providers
// ============================================================================

#[tokio::test]
async fn test_two_providers_poll_independently() {
    let aws = Arc::new(MockPlugin::new("aws").with_script([Ok(cost_payload(42.75))]));
    let azure = Arc::new(MockPlugin::new("azure").with_script([Ok(cost_payload(40.0))]));
    let (_, manager) = fixture(&[aws.clone(), azure.clone()]);

    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    manager
        .add_account(AccountContext::new("azure", "sub-1"), secrets())
        .await
        .unwrap();
    let mut events = manager.subscribe(EventFilter::All);

    let aws_id = ProviderId::from("aws");
    let azure_id = ProviderId::from("azure");
    let (a, b) = tokio::join!(
        manager.poll_once(&aws_id, "prod", QueryKind::Cost),
        manager.poll_once(&azure_id, "sub-1", QueryKind::Cost),
    );
    assert!(a.unwrap().is_fetched());
    assert!(b.unwrap().is_fetched());

    let succeeded: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, Event::FetchSucceeded(_)))
        .collect();
    assert_eq!(succeeded.len(), 2);
    assert_eq!(manager.cache().len(), 2);

    let aws_view = manager.view(&CacheKey::new("aws", "prod", QueryKind::Cost));
    assert_eq!(aws_view.result().unwrap().payload.headline().unwrap().value, "42.75");
    let azure_view = manager.view(&CacheKey::new("azure", "sub-1", QueryKind::Cost));
    assert_eq!(azure_view.result().unwrap().payload.headline().unwrap().value, "40.00");
    assert_eq!(aws.calls(), 1);
    assert_eq!(azure.calls(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_leave_no_trace() {
    let plugin = Arc::new(
        MockPlugin::new("aws").rejecting(ProviderError::Authentication(
            "InvalidClientTokenId".into(),
        )),
    );
    let (keychain, manager) = fixture(&[plugin.clone()]);
    let mut events = manager.subscribe(EventFilter::All);

    let err = manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::CredentialValidation { .. }));
    assert!(manager.accounts().is_empty());
    assert!(keychain.is_empty());
    assert!(drain(&mut events).is_empty());
    assert_eq!(plugin.calls(), 0);
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
#[traced_test]
async fn test_transient_failures_retry_until_success() {
    let plugin = Arc::new(MockPlugin::new("aws").with_script([
        Err(transient("HTTP 503")),
        Err(transient("HTTP 503")),
        Err(transient("connection reset")),
        Ok(cost_payload(18.0)),
    ]));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    let mut events = manager.subscribe(EventFilter::All);

    let outcome = manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    assert!(result.success);
    assert_eq!(result.attempts, 4);
    assert_eq!(plugin.calls(), 4);

    let lookup = manager.cache().get(&CacheKey::new("aws", "prod", QueryKind::Cost));
    assert_eq!(lookup.freshness, Freshness::Fresh);
    assert_eq!(lookup.result.unwrap().attempts, 4);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::FetchSucceeded(r) if r.attempts == 4));

    assert!(logs_contain("Fetch failed, retrying"));
    assert!(!logs_contain("key-123"));
}

#[tokio::test]
async fn test_exhausted_retries_publish_failure() {
    let plugin = Arc::new(MockPlugin::new("aws").with_script(
        std::iter::repeat_with(|| Err(transient("HTTP 503"))).take(5),
    ));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    let mut events = manager.subscribe(EventFilter::All);

    let outcome = manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    assert!(!result.success);
    assert_eq!(result.attempts, 4);
    assert_eq!(plugin.calls(), 4);
    assert!(manager.cache().is_empty());

    let events = drain(&mut events);
    assert!(matches!(
        events.as_slice(),
        [Event::FetchFailed { error, .. }] if error.kind == FailureKind::Transient
    ));
    let status = manager.status(&AccountKey::new("aws", "prod")).unwrap();
    assert_eq!(status.health, Health::Failing);
    assert_eq!(status.consecutive_failures, 1);
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let plugin = Arc::new(MockPlugin::new("aws").with_script([Err(
        ProviderError::Authentication("ExpiredToken".into()),
    )]));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    let outcome = manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    assert_eq!(outcome.result().unwrap().attempts, 1);
    assert_eq!(plugin.calls(), 1);
    let status = manager.status(&AccountKey::new("aws", "prod")).unwrap();
    assert_eq!(status.health, Health::NeedsReauth);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_fetch_deadline_is_retried_as_transient() {
    let plugin = Arc::new(
        MockPlugin::new("aws")
            .with_delay(Duration::from_secs(5))
            .slow_for(1),
    );
    let config = ManagerConfig {
        fetch_timeout_secs: 1,
        ..test_config()
    };
    let (_, manager) = fixture_with_config(config, &[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(plugin.calls(), 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(5));
    assert!(logs_contain("Fetch timed out after 1s"));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_that_never_answers_fails_transient() {
    let plugin = Arc::new(MockPlugin::new("aws").with_delay(Duration::from_secs(60)));
    let config = ManagerConfig {
        fetch_timeout_secs: 1,
        ..test_config()
    };
    let (_, manager) = fixture_with_config(config, &[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    let outcome = manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    assert!(!result.success);
    assert_eq!(result.attempts, 4);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, FailureKind::Transient);
    assert!(error.message.contains("timed out"));
    let key = CacheKey::new("aws", "prod", QueryKind::Cost);
    assert!(manager.cache().get(&key).result.is_none());
    assert_eq!(
        manager.status(&AccountKey::new("aws", "prod")).unwrap().health,
        Health::Failing
    );
}

// ============================================================================
// Single-flight
// ============================================================================

#[tokio::test]
async fn test_concurrent_polls_share_one_fetch() {
    let plugin = Arc::new(MockPlugin::new("aws").with_delay(Duration::from_millis(50)));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    let id = ProviderId::from("aws");

    let outcomes = join_all((0..8).map(|_| manager.poll_once(&id, "prod", QueryKind::Cost))).await;

    assert_eq!(plugin.calls(), 1);
    let outcomes: Vec<PollOutcome> = outcomes.into_iter().map(Result::unwrap).collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_fetched()).count(), 1);
    assert!(
        outcomes
            .iter()
            .all(|o| o.result().is_some_and(|r| r.success))
    );
}

#[tokio::test]
async fn test_scheduled_refresh_serves_fresh_cache() {
    let plugin = Arc::new(MockPlugin::new("aws"));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    let registered = manager.plugin(&"aws".into()).unwrap();
    let (context, epoch) = manager.account_entry(&AccountKey::new("aws", "prod")).unwrap();
    let outcome = manager.tick(&registered, &context, epoch).await;

    assert!(matches!(outcome.as_slice(), [PollOutcome::Cached(_)]));
    assert_eq!(plugin.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_tick_serves_stale_while_poll_in_flight() {
    let gate = Arc::new(Notify::new());
    let plugin = Arc::new(
        MockPlugin::new("aws")
            .with_script([Ok(cost_payload(10.0)), Ok(cost_payload(20.0))])
            .gated(gate.clone()),
    );
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    gate.notify_one();
    manager
        .poll_once(&"aws".into(), "prod", QueryKind::Cost)
        .await
        .unwrap();

    // Past the 54s TTL of a 60s interval.
    tokio::time::advance(Duration::from_secs(55)).await;
    let key = CacheKey::new("aws", "prod", QueryKind::Cost);
    assert_eq!(manager.cache().get(&key).freshness, Freshness::Stale);

    let poller = manager.clone();
    let poll = tokio::spawn(async move {
        poller
            .poll_once(&"aws".into(), "prod", QueryKind::Cost)
            .await
    });
    wait_for_calls(&plugin, 2).await;

    let registered = manager.plugin(&"aws".into()).unwrap();
    let (context, epoch) = manager.account_entry(&AccountKey::new("aws", "prod")).unwrap();
    let outcomes = manager.tick(&registered, &context, epoch).await;

    match outcomes.as_slice() {
        [PollOutcome::InFlight(Some(stale))] => {
            assert_eq!(stale.payload.headline().unwrap().value, "10.00");
        }
        other => panic!("unexpected outcomes {other:?}"),
    }
    assert_eq!(plugin.calls(), 2);

    gate.notify_one();
    assert!(poll.await.unwrap().unwrap().is_fetched());
    let lookup = manager.cache().get(&key);
    assert!(lookup.is_fresh());
    assert_eq!(lookup.result.unwrap().payload.headline().unwrap().value, "20.00");
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_republishes_only_when_enabled() {
    for (publish, expected) in [(false, 0), (true, 1)] {
        let plugin = Arc::new(MockPlugin::new("aws"));
        let config = ManagerConfig {
            publish_on_cache_hit: publish,
            ..test_config()
        };
        let (_, manager) = fixture_with_config(config, &[plugin.clone()]);
        manager
            .add_account(AccountContext::new("aws", "prod"), secrets())
            .await
            .unwrap();
        manager
            .poll_once(&"aws".into(), "prod", QueryKind::Cost)
            .await
            .unwrap();
        let mut events = manager.subscribe(EventFilter::All);

        tokio::time::advance(Duration::from_secs(30)).await;
        let registered = manager.plugin(&"aws".into()).unwrap();
        let (context, epoch) = manager.account_entry(&AccountKey::new("aws", "prod")).unwrap();
        let outcomes = manager.tick(&registered, &context, epoch).await;

        assert!(matches!(outcomes.as_slice(), [PollOutcome::Cached(_)]));
        assert_eq!(plugin.calls(), 1);
        let events = drain(&mut events);
        assert_eq!(events.len(), expected, "publish_on_cache_hit = {publish}");
        if publish {
            assert!(matches!(&events[0], Event::FetchSucceeded(r) if r.success && r.attempts == 1));
        }
    }
}

// ============================================================================
// Removal During a Fetch
// ============================================================================

#[tokio::test]
async fn test_removal_discards_in_flight_result() {
    let gate = Arc::new(Notify::new());
    let plugin = Arc::new(MockPlugin::new("aws").gated(gate.clone()));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    let poller = manager.clone();
    let poll = tokio::spawn(async move {
        poller
            .poll_once(&"aws".into(), "prod", QueryKind::Cost)
            .await
    });
    wait_for_calls(&plugin, 1).await;

    let mut events = manager.subscribe(EventFilter::All);
    manager.remove_account(&"aws".into(), "prod").await.unwrap();
    gate.notify_one();

    let outcome = poll.await.unwrap().unwrap();
    assert_eq!(outcome, PollOutcome::Discarded);
    assert!(manager.cache().is_empty());

    let events = drain(&mut events);
    assert!(matches!(events.as_slice(), [Event::AccountRemoved(_)]));
}

#[tokio::test]
async fn test_readding_account_does_not_revive_old_fetch() {
    let gate = Arc::new(Notify::new());
    let plugin = Arc::new(MockPlugin::new("aws").gated(gate.clone()));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    let poller = manager.clone();
    let poll = tokio::spawn(async move {
        poller
            .poll_once(&"aws".into(), "prod", QueryKind::Cost)
            .await
    });
    wait_for_calls(&plugin, 1).await;

    manager.remove_account(&"aws".into(), "prod").await.unwrap();
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    gate.notify_one();

    assert_eq!(poll.await.unwrap().unwrap(), PollOutcome::Discarded);
    assert!(manager.cache().is_empty());
    assert_eq!(
        manager.status(&AccountKey::new("aws", "prod")).unwrap().health,
        Health::Pending
    );
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduler_polls_each_interval() {
    let plugin = Arc::new(MockPlugin::new("aws"));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();

    manager.start();
    manager.start();
    assert!(manager.is_running());
    wait_for_calls(&plugin, 1).await;

    // Still fresh halfway through the interval.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(plugin.calls(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    wait_for_calls(&plugin, 2).await;

    manager.shutdown().await;
    assert!(!manager.is_running());
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(plugin.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_accounts_added_while_running_are_scheduled() {
    let plugin = Arc::new(MockPlugin::new("aws"));
    let (_, manager) = fixture(&[plugin.clone()]);
    manager.start();

    manager
        .add_account(AccountContext::new("aws", "prod"), secrets())
        .await
        .unwrap();
    wait_for_calls(&plugin, 1).await;

    manager.remove_account(&"aws".into(), "prod").await.unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(plugin.calls(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_accounts_are_not_scheduled() {
    let plugin = Arc::new(MockPlugin::new("aws"));
    let (_, manager) = fixture(&[plugin.clone()]);
    let mut account = AccountContext::new("aws", "prod");
    account.enabled = false;
    manager.add_account(account, secrets()).await.unwrap();

    manager.start();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(plugin.calls(), 0);

    manager.shutdown().await;
}
