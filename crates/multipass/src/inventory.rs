//! Discovery of observed instance states via `multipass list`.

use std::collections::HashMap;

use mpfleet_reconciler::{FleetSpec, ObservedSnapshot, ObservedState};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::MultipassClient;
use crate::error::{Error, Result};

/// Top-level shape of `multipass list --format json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListOutput {
    #[serde(default)]
    pub list: Vec<ListedInstance>,
}

/// One instance as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListedInstance {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub ipv4: Vec<String>,
}

/// Map a platform state label onto a lifecycle state.
///
/// Transitional labels collapse onto the state they settle into. Anything
/// else yields `None` and is never guessed.
pub fn observed_state_from_platform(raw: &str) -> Option<ObservedState> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "running" | "starting" | "restarting" => Some(ObservedState::Running),
        "stopped" => Some(ObservedState::Stopped),
        "suspended" | "suspending" => Some(ObservedState::Suspended),
        "deleted" => Some(ObservedState::Deleted),
        _ => None,
    }
}

/// Parse the JSON printed by `multipass list --format json`.
///
/// # Errors
///
/// Returns [`Error::Json`] when the output is not the expected document.
pub fn parse_list(json: &str) -> Result<Vec<ListedInstance>> {
    let output: ListOutput = serde_json::from_str(json)?;
    Ok(output.list)
}

/// Build an observed snapshot for `fleet` out of listed instances.
///
/// Declared machines whose instance is not listed stay absent and read as
/// `not_exist`. Listed instances outside the fleet are ignored.
pub fn snapshot_for(fleet: &FleetSpec, instances: &[ListedInstance]) -> ObservedSnapshot {
    let by_name: HashMap<&str, &ListedInstance> = instances
        .iter()
        .map(|instance| (instance.name.as_str(), instance))
        .collect();

    let mut snapshot = ObservedSnapshot::new();
    for spec in fleet.declared() {
        let Some(instance) = by_name.get(spec.name.as_str()) else {
            continue;
        };
        match observed_state_from_platform(&instance.state) {
            Some(state) => snapshot.insert(spec.id.clone(), state),
            None => {
                warn!(
                    machine = %spec.id,
                    instance = %spec.name,
                    state = %instance.state,
                    "Unrecognized platform state"
                );
                snapshot.insert_raw(spec.id.clone(), &instance.state);
            }
        }
    }
    snapshot
}

/// Queries the platform for the current state of a fleet.
#[derive(Debug, Clone, Default)]
pub struct MultipassInventory {
    client: MultipassClient,
}

impl MultipassInventory {
    pub const fn new(client: MultipassClient) -> Self {
        Self { client }
    }

    /// Observe every declared machine of `fleet`.
    ///
    /// # Errors
    ///
    /// Returns an error when the CLI fails or prints unparseable output.
    pub async fn observe(&self, fleet: &FleetSpec) -> Result<ObservedSnapshot> {
        let args = ["list", "--format", "json"].map(String::from);
        let output = self.client.run(&args).await?;
        let instances = parse_list(&output.stdout)
            .map_err(|e| Error::invalid_response(format!("multipass list: {e}")))?;
        debug!(instances = instances.len(), "Listed multipass instances");
        Ok(snapshot_for(fleet, &instances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpfleet_reconciler::{DesiredState, MachineId, MachineSpec};

    const LIST_JSON: &str = r#"{
        "list": [
            {"ipv4": ["192.168.64.10"], "name": "node-a", "release": "22.04 LTS", "state": "Running"},
            {"ipv4": [], "name": "node-b", "release": "22.04 LTS", "state": "Suspended"},
            {"ipv4": [], "name": "node-c", "release": "22.04 LTS", "state": "Unknown"},
            {"ipv4": [], "name": "stray", "release": "22.04 LTS", "state": "Stopped"}
        ]
    }"#;

    fn fleet() -> FleetSpec {
        FleetSpec::new()
            .with(MachineSpec::new("10.0.0.1", DesiredState::Running).with_name("node-a"))
            .with(MachineSpec::new("10.0.0.2", DesiredState::Stopped).with_name("node-b"))
            .with(MachineSpec::new("10.0.0.3", DesiredState::Running).with_name("node-c"))
            .with(MachineSpec::new("10.0.0.4", DesiredState::Running).with_name("node-d"))
    }

    #[test]
    fn test_platform_state_mapping() {
        assert_eq!(
            observed_state_from_platform("Starting"),
            Some(ObservedState::Running)
        );
        assert_eq!(
            observed_state_from_platform("Restarting"),
            Some(ObservedState::Running)
        );
        assert_eq!(
            observed_state_from_platform("Suspending"),
            Some(ObservedState::Suspended)
        );
        assert_eq!(
            observed_state_from_platform("Deleted"),
            Some(ObservedState::Deleted)
        );
        assert_eq!(observed_state_from_platform("Unknown"), None);
        assert_eq!(observed_state_from_platform("Delayed Shutdown"), None);
    }

    #[test]
    fn test_parse_list() {
        let instances = parse_list(LIST_JSON).unwrap_or_default();
        assert_eq!(instances.len(), 4);
        assert_eq!(
            instances.first().map(|i| i.ipv4.clone()),
            Some(vec!["192.168.64.10".to_string()])
        );
    }

    #[test]
    fn test_parse_list_rejects_garbage() {
        assert!(parse_list("not json").is_err());
    }

    #[test]
    fn test_snapshot_maps_names_back_to_ids() {
        let instances = parse_list(LIST_JSON).unwrap_or_default();
        let snapshot = snapshot_for(&fleet(), &instances);

        assert_eq!(
            snapshot.get(&MachineId::from("10.0.0.1")),
            Ok(ObservedState::Running)
        );
        assert_eq!(
            snapshot.get(&MachineId::from("10.0.0.2")),
            Ok(ObservedState::Suspended)
        );
        assert!(snapshot.get(&MachineId::from("10.0.0.3")).is_err());
        assert_eq!(
            snapshot.get(&MachineId::from("10.0.0.4")),
            Ok(ObservedState::NotExist)
        );
        assert_eq!(snapshot.len(), 3);
    }
}
