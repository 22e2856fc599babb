//! Azure response types and payload conversion.

use cloudmon_core::{Metric, MetricStatus, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::format::{self, parse_amount, shorten};
use crate::instances::{instance_payload, Instance, PowerStates};

/// Resource groups below this cost are noise.
const MIN_GROUP_COST: f64 = 0.01;

/// Month-to-date total above which the headline warns.
const COST_WARNING: f64 = 100.0;

/// Resource groups listed as individual metrics.
const LISTED_GROUPS: usize = 5;

/// `deallocated` stops billing for compute; `stopped` does not, but both are
/// deliberate states.
const VM_STATES: PowerStates = PowerStates {
    running: "running",
    stopped: &["deallocated", "stopped"],
};

const POWER_STATE_PREFIX: &str = "PowerState/";

// ============================================================================
// Token
// ============================================================================

/// Entra ID token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for Azure Resource Manager.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ============================================================================
// Cost Management
// ============================================================================

/// Cost Management query result.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    /// Result table.
    pub properties: QueryProperties,
}

/// Result table of a Cost Management query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryProperties {
    /// Column descriptors.
    #[serde(default)]
    pub columns: Vec<QueryColumn>,
    /// Rows, positionally matching `columns`.
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Continuation link when the result is paged.
    #[serde(default)]
    pub next_link: Option<String>,
}

/// One column descriptor.
#[derive(Debug, Deserialize)]
pub struct QueryColumn {
    /// Column name (`Cost`, `ResourceGroup`, `Currency`).
    pub name: String,
    /// Column type (`Number`, `String`).
    #[serde(default, rename = "type")]
    pub column_type: Option<String>,
}

/// Cost of one resource group, as exposed in the payload attributes.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceGroupCost {
    /// Resource group name.
    pub resource_group: String,
    /// Month-to-date cost.
    pub cost: f64,
    /// Share of the total, in percent.
    pub percentage: f64,
}

fn column_index(columns: &[QueryColumn], names: &[&str]) -> Option<usize> {
    columns
        .iter()
        .position(|c| names.contains(&c.name.to_ascii_lowercase().as_str()))
}

fn cell_number(row: &[Value], index: usize) -> f64 {
    match row.get(index) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_amount(s),
        _ => 0.0,
    }
}

fn cell_text(row: &[Value], index: Option<usize>) -> Option<&str> {
    row.get(index?)?.as_str()
}

/// Builds the cost payload from a month-to-date query grouped by resource group.
pub fn cost_payload(response: &QueryResponse) -> Payload {
    let table = &response.properties;
    let Some(cost_idx) = column_index(&table.columns, &["cost", "totalcost"]) else {
        let mut payload = Payload::new();
        payload.push(Metric::amount("Month to date", 0.0, Some("USD")));
        return payload;
    };
    let group_idx = column_index(&table.columns, &["resourcegroup", "resource group"]);
    let currency_idx = column_index(&table.columns, &["currency"]);

    let mut currency: Option<String> = None;
    let mut groups: Vec<(String, f64)> = Vec::new();
    for row in &table.rows {
        let cost = cell_number(row, cost_idx);
        if cost <= MIN_GROUP_COST {
            continue;
        }
        if currency.is_none() {
            currency = cell_text(row, currency_idx).map(str::to_string);
        }
        let name = match cell_text(row, group_idx) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "Unassigned".to_string(),
        };
        groups.push((name, cost));
    }
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total = format::total(groups.iter().map(|(_, cost)| *cost));
    let currency = currency.unwrap_or_else(|| "USD".to_string());
    debug!(total, groups = groups.len(), "Parsed Cost Management response");

    let breakdown: Vec<ResourceGroupCost> = groups
        .iter()
        .map(|(name, cost)| ResourceGroupCost {
            resource_group: name.clone(),
            cost: *cost,
            percentage: if total > 0.0 { cost / total * 100.0 } else { 0.0 },
        })
        .collect();

    let status = if total > COST_WARNING {
        MetricStatus::Warning
    } else {
        MetricStatus::Normal
    };

    let mut payload = Payload::new()
        .with_attribute(
            "resource_groups",
            serde_json::to_value(&breakdown).unwrap_or_default(),
        )
        .with_attribute("currency", currency.as_str());
    payload.push(Metric::amount("Month to date", total, Some(&currency)).with_status(status));
    for item in breakdown.iter().take(LISTED_GROUPS) {
        payload.push(Metric::text(
            shorten(&item.resource_group, 25),
            format!("{:.2} ({:.1}%)", item.cost, item.percentage),
        ));
    }
    payload
}

// ============================================================================
// Compute
// ============================================================================

/// `GET .../virtualMachines?statusOnly=true`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineList {
    /// VMs on this page.
    #[serde(default)]
    pub value: Vec<VirtualMachine>,
    /// Absolute URL of the next page.
    #[serde(default)]
    pub next_link: Option<String>,
}

/// One virtual machine.
#[derive(Debug, Deserialize)]
pub struct VirtualMachine {
    /// ARM resource id.
    #[serde(default)]
    pub id: String,
    /// VM name.
    #[serde(default)]
    pub name: String,
    /// Azure region.
    #[serde(default)]
    pub location: Option<String>,
    /// VM properties.
    #[serde(default)]
    pub properties: Option<VirtualMachineProperties>,
}

/// The VM properties used here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    /// Hardware profile.
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,
    /// Runtime status (present with `statusOnly=true`).
    #[serde(default)]
    pub instance_view: Option<InstanceView>,
}

/// VM hardware profile.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    /// Size (e.g. `Standard_D2s_v3`).
    #[serde(default)]
    pub vm_size: String,
}

/// VM runtime status.
#[derive(Debug, Default, Deserialize)]
pub struct InstanceView {
    /// Provisioning and power statuses.
    #[serde(default)]
    pub statuses: Vec<InstanceStatus>,
}

/// One status entry.
#[derive(Debug, Deserialize)]
pub struct InstanceStatus {
    /// `ProvisioningState/succeeded`, `PowerState/running`, ...
    #[serde(default)]
    pub code: String,
}

/// Extracts the resource group segment of an ARM id.
pub fn resource_group_of(id: &str) -> Option<&str> {
    let mut parts = id.split('/');
    parts.find(|p| p.eq_ignore_ascii_case("resourcegroups"))?;
    parts.next().filter(|p| !p.is_empty())
}

fn power_state(vm: &VirtualMachine) -> String {
    vm.properties
        .as_ref()
        .and_then(|p| p.instance_view.as_ref())
        .and_then(|view| {
            view.statuses
                .iter()
                .find_map(|s| s.code.strip_prefix(POWER_STATE_PREFIX))
        })
        .unwrap_or("unknown")
        .to_string()
}

fn short_vm_size(size: &str) -> String {
    match size.strip_prefix("Standard_") {
        Some(short) => short.to_string(),
        None => shorten(size, 15),
    }
}

/// Converts listed VMs into the shared instance model.
pub fn virtual_machines(vms: &[VirtualMachine]) -> Vec<Instance> {
    vms.iter()
        .map(|vm| Instance {
            id: vm.id.clone(),
            name: if vm.name.is_empty() {
                vm.id.clone()
            } else {
                vm.name.clone()
            },
            state: power_state(vm),
            size: vm
                .properties
                .as_ref()
                .and_then(|p| p.hardware_profile.as_ref())
                .map(|h| short_vm_size(&h.vm_size))
                .unwrap_or_default(),
            location: match (resource_group_of(&vm.id), vm.location.as_deref()) {
                (Some(group), Some(location)) => Some(format!("{group} ({location})")),
                (Some(group), None) => Some(group.to_string()),
                (None, location) => location.map(str::to_string),
            },
            ip: None,
        })
        .collect()
}

/// Builds the instance-list payload for a subscription.
pub fn vms_payload(instances: &[Instance]) -> Payload {
    instance_payload(instances, VM_STATES, "subscription")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = r#"{
        "id": "subscriptions/0000/providers/Microsoft.CostManagement/query/abc",
        "properties": {
            "nextLink": null,
            "columns": [
                {"name": "Cost", "type": "Number"},
                {"name": "ResourceGroup", "type": "String"},
                {"name": "Currency", "type": "String"}
            ],
            "rows": [
                [12.5, "rg-data", "EUR"],
                [140.25, "rg-web", "EUR"],
                [0.004, "rg-idle", "EUR"],
                ["3.10", "", "EUR"]
            ]
        }
    }"#;

    #[test]
    fn test_cost_payload_groups_and_sorts() {
        let response: QueryResponse = serde_json::from_str(QUERY).unwrap();
        let payload = cost_payload(&response);

        let headline = payload.headline().unwrap();
        assert_eq!(headline.value, "155.85");
        assert_eq!(headline.unit.as_deref(), Some("EUR"));
        assert_eq!(headline.status, MetricStatus::Warning);

        assert_eq!(payload.metrics[1].label, "rg-web");
        assert!(payload.metrics[1].value.starts_with("140.25 ("));
        assert_eq!(payload.metrics[3].label, "Unassigned");
        assert_eq!(payload.metrics.len(), 4);
        assert_eq!(payload.attributes["resource_groups"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_cost_column_is_zero() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"properties": {"columns": [{"name": "ResourceGroup"}], "rows": [["rg"]]}}"#,
        )
        .unwrap();
        let payload = cost_payload(&response);
        assert_eq!(payload.metrics.len(), 1);
        assert_eq!(payload.headline().unwrap().value, "0.00");
    }

    #[test]
    fn test_resource_group_of() {
        let id = "/subscriptions/0000/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/vm1";
        assert_eq!(resource_group_of(id), Some("rg-web"));
        assert_eq!(resource_group_of("/subscriptions/0000"), None);
    }

    #[test]
    fn test_virtual_machines() {
        let list: VirtualMachineList = serde_json::from_str(
            r#"{"value": [
                {
                    "id": "/subscriptions/0000/resourceGroups/RG-WEB/providers/Microsoft.Compute/virtualMachines/web-1",
                    "name": "web-1",
                    "location": "westeurope",
                    "properties": {
                        "hardwareProfile": {"vmSize": "Standard_B2s"},
                        "instanceView": {"statuses": [
                            {"code": "ProvisioningState/succeeded"},
                            {"code": "PowerState/running"}
                        ]}
                    }
                },
                {
                    "id": "/subscriptions/0000/resourceGroups/RG-WEB/providers/Microsoft.Compute/virtualMachines/batch",
                    "name": "batch",
                    "location": "westeurope",
                    "properties": {"instanceView": {"statuses": [{"code": "PowerState/deallocated"}]}}
                },
                {"id": "/subscriptions/0000/resourceGroups/rg/providers/x/vm", "name": "new"}
            ]}"#,
        )
        .unwrap();
        let instances = virtual_machines(&list.value);

        assert_eq!(instances[0].state, "running");
        assert_eq!(instances[0].size, "B2s");
        assert_eq!(instances[0].location.as_deref(), Some("RG-WEB (westeurope)"));
        assert_eq!(instances[1].state, "deallocated");
        assert_eq!(instances[2].state, "unknown");

        let payload = vms_payload(&instances);
        let headline = payload.headline().unwrap();
        assert_eq!(headline.label, "Running (subscription)");
        assert_eq!(headline.value, "1");
        // The VM without a power state is not settled.
        assert_eq!(headline.status, MetricStatus::Warning);
    }

    #[test]
    fn test_deallocated_is_settled() {
        let instances = vec![
            Instance {
                id: "a".into(),
                name: "a".into(),
                state: "running".into(),
                size: String::new(),
                location: None,
                ip: None,
            },
            Instance {
                id: "b".into(),
                name: "b".into(),
                state: "stopped".into(),
                size: String::new(),
                location: None,
                ip: None,
            },
        ];
        assert_eq!(vms_payload(&instances).headline().unwrap().status, MetricStatus::Normal);
    }
}
