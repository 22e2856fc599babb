//! Instance-list payloads shared by the compute providers.

use cloudmon_core::{Metric, MetricStatus, Payload};
use serde::Serialize;

use crate::format::shorten;

/// Number of instances listed as individual metrics.
const LISTED_INSTANCES: usize = 6;

/// One virtual machine, droplet, or EC2 instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// Provider-assigned id.
    pub id: String,
    /// Display name (falls back to the id).
    pub name: String,
    /// Provider power state, lowercase (`running`, `stopped`, `active`, ...).
    pub state: String,
    /// Machine type / size slug.
    pub size: String,
    /// Region, zone, or location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Public address, else private.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Names of the "up" and "down" power states for one provider.
#[derive(Debug, Clone, Copy)]
pub struct PowerStates {
    /// State counted as running.
    pub running: &'static str,
    /// States counted as cleanly stopped.
    pub stopped: &'static [&'static str],
}

impl PowerStates {
    fn is_settled(&self, state: &str) -> bool {
        state == self.running || self.stopped.contains(&state)
    }
}

/// Builds the instance-list payload.
///
/// The headline counts running instances. It warns when every instance is
/// down or when any instance is in a transitional state.
pub fn instance_payload(instances: &[Instance], states: PowerStates, scope: &str) -> Payload {
    let total = instances.len();
    let running = instances.iter().filter(|i| i.state == states.running).count();
    let transitional = instances.iter().any(|i| !states.is_settled(&i.state));

    let status = if (total > 0 && running == 0) || transitional {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };

    let mut payload = Payload::new()
        .with_attribute("scope", scope)
        .with_attribute("running", running)
        .with_attribute("total", total)
        .with_attribute(
            "instances",
            serde_json::to_value(instances).unwrap_or_default(),
        );

    payload.push(Metric::count(format!("Running ({scope})"), running as u64).with_status(status));
    payload.push(Metric::count("Total", total as u64));

    for instance in instances.iter().take(LISTED_INSTANCES) {
        let metric_status = if states.is_settled(&instance.state) {
            MetricStatus::Normal
        } else {
            MetricStatus::Warning
        };
        payload.push(
            Metric::text(shorten(&instance.name, 20), instance.state.clone())
                .with_status(metric_status),
        );
    }

    payload
}
