//! Fleet and observed-state files.
//!
//! The fleet file is a YAML document:
//!
//! ```yaml
//! vm_names:
//!   192.168.64.10: node-a
//! multipass_vm_instances:
//!   - static_ip: 192.168.64.10
//!     state: running
//!     vcpu: 2
//!     disk: 10G
//!     mem: 2G
//!     cloud_init: base.yaml
//!     networks:
//!       - { name: en0, mode: manual }
//! ```
//!
//! A bad entry (unknown state, incomplete creation parameters) becomes a
//! rejected machine; only an unreadable document fails the whole file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use mpfleet_reconciler::{
    CreationParams, Error as FleetError, FleetSpec, MachineId, MachineSpec, NetworkAttachment,
    ObservedSnapshot,
};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub vm_names: HashMap<String, String>,
    #[serde(default)]
    pub multipass_vm_instances: Vec<VmInstance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmInstance {
    pub static_ip: String,
    #[serde(default)]
    pub name: Option<String>,
    pub state: String,
    #[serde(default)]
    pub vcpu: Option<u32>,
    #[serde(default)]
    pub disk: Option<String>,
    #[serde(default)]
    pub mem: Option<String>,
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
    #[serde(default)]
    pub cloud_init: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    pub name: String,
    pub mode: String,
}

impl FleetFile {
    /// Parse a fleet document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid YAML of this shape.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse fleet file")
    }

    /// Turn the document into a fleet, keeping bad entries as rejections.
    pub fn into_fleet(self) -> FleetSpec {
        let mut fleet = FleetSpec::new();
        for instance in self.multipass_vm_instances {
            let id = MachineId::from(instance.static_ip.trim());
            let name = instance
                .name
                .clone()
                .or_else(|| self.vm_names.get(instance.static_ip.trim()).cloned());
            match machine_spec(&instance, name) {
                Ok(spec) => fleet.push(spec),
                Err(error) => {
                    warn!(machine = %id, error = %error, "Rejecting fleet entry");
                    fleet.push_invalid(id, error);
                }
            }
        }
        fleet
    }
}

fn machine_spec(
    instance: &VmInstance,
    name: Option<String>,
) -> std::result::Result<MachineSpec, FleetError> {
    let mut spec = MachineSpec::parse(instance.static_ip.trim(), &instance.state)?;
    if let Some(name) = name {
        spec = spec.with_name(name);
    }
    match creation_params(instance)? {
        Some(params) => Ok(spec.with_params(params)),
        None => Ok(spec),
    }
}

fn creation_params(
    instance: &VmInstance,
) -> std::result::Result<Option<CreationParams>, FleetError> {
    let (vcpu, disk, mem) = match (instance.vcpu, &instance.disk, &instance.mem) {
        (None, None, None) => return Ok(None),
        (Some(vcpu), Some(disk), Some(mem)) => (vcpu, disk, mem),
        _ => {
            return Err(FleetError::invalid_state(format!(
                "machine '{}': vcpu, disk and mem must be given together",
                instance.static_ip
            )));
        }
    };

    let mut params = CreationParams::new(vcpu, disk.as_str(), mem.as_str());
    for net in &instance.networks {
        params = params.with_network(NetworkAttachment::new(net.name.as_str(), net.mode.as_str()));
    }
    if let Some(cloud_init) = &instance.cloud_init {
        params = params.with_cloud_init(cloud_init.as_str());
    }
    Ok(Some(params))
}

/// Load a fleet file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_fleet(path: &Path) -> Result<FleetSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
    let fleet = FleetFile::parse(&raw)
        .with_context(|| format!("Invalid fleet file {}", path.display()))?
        .into_fleet();
    debug!(path = %path.display(), machines = fleet.len(), "Loaded fleet");
    Ok(fleet)
}

/// Parse an observed-state map (`static_ip: state`). JSON is accepted too.
///
/// # Errors
///
/// Returns an error when the document is not a string-to-string map.
pub fn parse_observed(raw: &str) -> Result<ObservedSnapshot> {
    let states: BTreeMap<String, String> =
        serde_yaml::from_str(raw).context("Failed to parse observed states")?;
    Ok(ObservedSnapshot::from_raw(
        states.into_iter().map(|(id, state)| (id.trim().to_string(), state)),
    ))
}

/// Load an observed-state file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_observed(path: &Path) -> Result<ObservedSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read observed file {}", path.display()))?;
    parse_observed(&raw).with_context(|| format!("Invalid observed file {}", path.display()))
}
