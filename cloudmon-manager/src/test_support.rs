//! Scripted plugin and fixtures shared by the manager tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cloudmon_core::{
    AccountContext, CredentialBundle, CredentialField, Metric, Payload, ProviderDescriptor, ProviderError,
    ProviderPlugin, QueryKind,
};
use cloudmon_fetch::{CredentialVault, MemoryKeychain, RetryPolicy};
use cloudmon_store::{Event, ManagerConfig, Subscription};
use tokio::sync::Notify;

use crate::manager::PluginManager;

/// Plugin that replays scripted results and counts calls.
pub(crate) struct MockPlugin {
    descriptor: ProviderDescriptor,
    script: Mutex<VecDeque<Result<Payload, ProviderError>>>,
    validation: Mutex<Result<(), ProviderError>>,
    delay: Option<Duration>,
    slow_calls: Option<usize>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl MockPlugin {
    pub(crate) fn new(id: &str) -> Self {
        let descriptor = ProviderDescriptor::builder(id)
            .display_name(id.to_uppercase())
            .capability(QueryKind::Cost)
            .poll_interval(Duration::from_secs(60))
            .credential("api_key", "API key")
            .build();
        Self {
            descriptor,
            script: Mutex::new(VecDeque::new()),
            validation: Mutex::new(Ok(())),
            delay: None,
            slow_calls: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_capability(mut self, query: QueryKind) -> Self {
        self.descriptor.capabilities.insert(query);
        self
    }

    pub(crate) fn with_script(
        self,
        results: impl IntoIterator<Item = Result<Payload, ProviderError>>,
    ) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }

    /// Declares an extra required credential field.
    pub(crate) fn with_credential(mut self, name: &str) -> Self {
        self.descriptor
            .credential_fields
            .push(CredentialField::required(name, name));
        self
    }

    pub(crate) fn rejecting(self, error: ProviderError) -> Self {
        self.reject_from_now(error);
        self
    }

    pub(crate) fn reject_from_now(&self, error: ProviderError) {
        *self.validation.lock().unwrap() = Err(error);
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Limits the delay to the first `n` calls.
    pub(crate) fn slow_for(mut self, n: usize) -> Self {
        self.slow_calls = Some(n);
        self
    }

    /// Blocks every fetch until the gate is notified.
    pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn cost_payload(amount: f64) -> Payload {
    [Metric::amount("Month to date", amount, Some("USD"))]
        .into_iter()
        .collect()
}

#[async_trait]
impl ProviderPlugin for MockPlugin {
    fn identify(&self) -> ProviderDescriptor {
        self.descriptor.clone()
    }

    async fn fetch(
        &self,
        _account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        secrets.require("api_key")?;
        if let Some(delay) = self.delay {
            if self.slow_calls.is_none_or(|n| call < n) {
                tokio::time::sleep(delay).await;
            }
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.descriptor.supports(query) {
            return Err(ProviderError::UnsupportedQuery(query));
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(cost_payload(12.5)))
    }

    async fn validate_credentials(
        &self,
        _account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        secrets.require("api_key")?;
        self.validation.lock().unwrap().clone()
    }
}

pub(crate) fn test_config() -> ManagerConfig {
    ManagerConfig {
        min_poll_interval_secs: 1,
        retry: RetryPolicy::new(3).with_base_delay(Duration::from_millis(1)),
        ..ManagerConfig::default()
    }
}

pub(crate) fn fixture(
    plugins: &[Arc<MockPlugin>],
) -> (Arc<MemoryKeychain>, PluginManager) {
    fixture_with_config(test_config(), plugins)
}

pub(crate) fn fixture_with_config(
    config: ManagerConfig,
    plugins: &[Arc<MockPlugin>],
) -> (Arc<MemoryKeychain>, PluginManager) {
    let keychain = Arc::new(MemoryKeychain::new());
    let manager = PluginManager::new(config, CredentialVault::new(keychain.clone()));
    for plugin in plugins {
        manager.register_plugin(plugin.clone()).unwrap();
    }
    (keychain, manager)
}

pub(crate) fn secrets() -> CredentialBundle {
    CredentialBundle::new().with("api_key", "key-123")
}

pub(crate) fn drain(sub: &mut Subscription) -> Vec<Event> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

/// Waits until the plugin has been called `n` times.
pub(crate) async fn wait_for_calls(plugin: &MockPlugin, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while plugin.calls() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("plugin was not called");
}
