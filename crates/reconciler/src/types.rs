//! Core types for the reconciler.
//!
//! Everything here is a read-only snapshot: a [`FleetSpec`] and an
//! [`ObservedSnapshot`] are built before a pass, joined into a
//! [`FleetSnapshot`], and dropped once the pass reports.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable key of one fleet member (its static network address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Parse a machine id, rejecting empty input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when the id is empty or whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_state("machine id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MachineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MachineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared target lifecycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Running,
    Suspended,
    Stopped,
    Deleted,
}

impl DesiredState {
    /// Every desired state.
    pub const ALL: [Self; 4] = [Self::Running, Self::Suspended, Self::Stopped, Self::Deleted];

    /// Canonical lower-case spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "stopped" => Ok(Self::Stopped),
            "deleted" => Ok(Self::Deleted),
            other => Err(Error::invalid_state(format!(
                "unrecognized desired state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state reported by discovery.
///
/// `NotExist` means the machine was never created. `Deleted` means the
/// platform still holds it in a recoverable form until it is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedState {
    NotExist,
    Deleted,
    Stopped,
    Suspended,
    Running,
}

impl ObservedState {
    /// Every observed state.
    pub const ALL: [Self; 5] = [
        Self::NotExist,
        Self::Deleted,
        Self::Stopped,
        Self::Suspended,
        Self::Running,
    ];

    /// Canonical lower-case spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotExist => "not_exist",
            Self::Deleted => "deleted",
            Self::Stopped => "stopped",
            Self::Suspended => "suspended",
            Self::Running => "running",
        }
    }

    /// Whether the machine is present and usable (not missing, not reclaimable).
    #[must_use]
    pub const fn exists(self) -> bool {
        matches!(self, Self::Stopped | Self::Suspended | Self::Running)
    }

    /// Whether this observation satisfies the given desired state.
    #[must_use]
    pub const fn satisfies(self, desired: DesiredState) -> bool {
        match desired {
            DesiredState::Running => matches!(self, Self::Running),
            DesiredState::Suspended => matches!(self, Self::Suspended),
            DesiredState::Stopped => matches!(self, Self::Stopped),
            DesiredState::Deleted => matches!(self, Self::Deleted | Self::NotExist),
        }
    }
}

impl FromStr for ObservedState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "not_exist" => Ok(Self::NotExist),
            "deleted" => Ok(Self::Deleted),
            "stopped" => Ok(Self::Stopped),
            "suspended" => Ok(Self::Suspended),
            "running" => Ok(Self::Running),
            other => Err(Error::invalid_state(format!(
                "unrecognized observed state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single state-transition request against one machine.
///
/// The derived ordering is the dispatch order of the kind-groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Launch,
    Recover,
    Start,
    Suspend,
    Stop,
    Delete,
}

impl Operation {
    /// All operations in dispatch order.
    pub const ALL: [Self; 6] = [
        Self::Launch,
        Self::Recover,
        Self::Start,
        Self::Suspend,
        Self::Stop,
        Self::Delete,
    ];

    /// The platform CLI verb for this operation.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Recover => "recover",
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Stop => "stop",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// One network the machine is attached to at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
    pub mode: String,
}

impl NetworkAttachment {
    pub fn new(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: mode.into(),
        }
    }
}

/// Resource template used only when the machine is launched.
///
/// Never compared against a running machine: resizing is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationParams {
    pub vcpu: u32,
    pub disk: String,
    pub mem: String,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default)]
    pub cloud_init: Option<String>,
}

impl CreationParams {
    /// Create a template with no networks and no cloud-init payload.
    pub fn new(vcpu: u32, disk: impl Into<String>, mem: impl Into<String>) -> Self {
        Self {
            vcpu,
            disk: disk.into(),
            mem: mem.into(),
            networks: Vec::new(),
            cloud_init: None,
        }
    }

    /// Attach a network.
    #[must_use]
    pub fn with_network(mut self, network: NetworkAttachment) -> Self {
        self.networks.push(network);
        self
    }

    /// Set the cloud-init payload name.
    #[must_use]
    pub fn with_cloud_init(mut self, cloud_init: impl Into<String>) -> Self {
        self.cloud_init = Some(cloud_init.into());
        self
    }

    /// Check the template is usable for a launch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for a zero vCPU count or blank sizes.
    pub fn validate(&self) -> Result<()> {
        if self.vcpu == 0 {
            return Err(Error::invalid_state("vcpu count must be at least 1"));
        }
        if self.disk.trim().is_empty() {
            return Err(Error::invalid_state("disk size must not be empty"));
        }
        if self.mem.trim().is_empty() {
            return Err(Error::invalid_state("memory size must not be empty"));
        }
        if let Some(net) = self
            .networks
            .iter()
            .find(|n| n.name.trim().is_empty() || n.mode.trim().is_empty())
        {
            return Err(Error::invalid_state(format!(
                "network attachment '{}' needs both a name and a mode",
                net.name
            )));
        }
        Ok(())
    }
}

/// One declared fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub id: MachineId,
    /// Platform instance name.
    pub name: String,
    pub desired: DesiredState,
    pub params: Option<CreationParams>,
}

impl MachineSpec {
    /// Declare a machine whose instance name equals its id.
    pub fn new(id: impl Into<MachineId>, desired: DesiredState) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            desired,
            params: None,
        }
    }

    /// Declare a machine from raw strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for an empty id or unknown state.
    pub fn parse(id: &str, desired: &str) -> Result<Self> {
        Ok(Self::new(MachineId::parse(id)?, desired.parse()?))
    }

    /// Set the platform instance name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the creation parameters.
    #[must_use]
    pub fn with_params(mut self, params: CreationParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// What the executor needs to know about the machine it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineTarget {
    pub id: MachineId,
    pub name: String,
    pub params: Option<CreationParams>,
}

/// Per-machine input to the transition policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionInput {
    id: MachineId,
    name: String,
    desired: DesiredState,
    observed: ObservedState,
    params: Option<CreationParams>,
}

impl TransitionInput {
    /// Pair a declared machine with its observed state.
    ///
    /// Deleting a machine that never existed needs no parameters and is
    /// accepted as an already-converged record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when the machine has to be launched
    /// but has no creation parameters, or when the parameters are malformed.
    pub fn new(spec: &MachineSpec, observed: ObservedState) -> Result<Self> {
        if let Some(params) = &spec.params {
            params.validate().map_err(|e| {
                Error::invalid_state(format!("machine '{}': {e}", spec.id))
            })?;
        }

        let needs_launch =
            spec.desired != DesiredState::Deleted && observed == ObservedState::NotExist;
        if needs_launch && spec.params.is_none() {
            return Err(Error::invalid_state(format!(
                "machine '{}' does not exist and has no creation parameters",
                spec.id
            )));
        }

        Ok(Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            desired: spec.desired,
            observed,
            params: spec.params.clone(),
        })
    }

    /// Build an input from raw desired and observed spellings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for unrecognized states or missing
    /// creation parameters.
    pub fn from_raw(
        id: &str,
        desired: &str,
        observed: &str,
        params: Option<CreationParams>,
    ) -> Result<Self> {
        let mut spec = MachineSpec::parse(id, desired)?;
        spec.params = params;
        Self::new(&spec, observed.parse()?)
    }

    #[must_use]
    pub const fn id(&self) -> &MachineId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn desired(&self) -> DesiredState {
        self.desired
    }

    #[must_use]
    pub const fn observed(&self) -> ObservedState {
        self.observed
    }

    #[must_use]
    pub const fn params(&self) -> Option<&CreationParams> {
        self.params.as_ref()
    }

    /// Executor-facing view of this machine.
    #[must_use]
    pub fn target(&self) -> MachineTarget {
        MachineTarget {
            id: self.id.clone(),
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }
}

/// A fleet entry: either a usable declaration or one already known bad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetMember {
    Declared(MachineSpec),
    Invalid { id: MachineId, error: Error },
}

impl FleetMember {
    /// Id of the member.
    #[must_use]
    pub const fn id(&self) -> &MachineId {
        match self {
            Self::Declared(spec) => &spec.id,
            Self::Invalid { id, .. } => id,
        }
    }
}

/// Declared fleet, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSpec {
    members: Vec<FleetMember>,
}

impl FleetSpec {
    /// Create an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declared machine.
    pub fn push(&mut self, spec: MachineSpec) {
        self.members.push(FleetMember::Declared(spec));
    }

    /// Record a member whose declaration could not be parsed.
    pub fn push_invalid(&mut self, id: MachineId, error: Error) {
        self.members.push(FleetMember::Invalid { id, error });
    }

    /// Builder-style [`FleetSpec::push`].
    #[must_use]
    pub fn with(mut self, spec: MachineSpec) -> Self {
        self.push(spec);
        self
    }

    pub fn members(&self) -> impl Iterator<Item = &FleetMember> {
        self.members.iter()
    }

    /// Declared machines, skipping invalid members.
    pub fn declared(&self) -> impl Iterator<Item = &MachineSpec> {
        self.members.iter().filter_map(|m| match m {
            FleetMember::Declared(spec) => Some(spec),
            FleetMember::Invalid { .. } => None,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<MachineSpec> for FleetSpec {
    fn from_iter<T: IntoIterator<Item = MachineSpec>>(iter: T) -> Self {
        Self {
            members: iter.into_iter().map(FleetMember::Declared).collect(),
        }
    }
}

/// Observed lifecycle states, as supplied by discovery.
///
/// Machines missing from the snapshot are observed as [`ObservedState::NotExist`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSnapshot {
    states: HashMap<MachineId, ObservedState>,
    unparsed: HashMap<MachineId, String>,
}

impl ObservedSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parsed observation.
    pub fn insert(&mut self, id: MachineId, state: ObservedState) {
        self.unparsed.remove(&id);
        self.states.insert(id, state);
    }

    /// Builder-style [`ObservedSnapshot::insert`].
    #[must_use]
    pub fn with(mut self, id: impl Into<MachineId>, state: ObservedState) -> Self {
        self.insert(id.into(), state);
        self
    }

    /// Record a raw observation, keeping unrecognized values for rejection.
    pub fn insert_raw(&mut self, id: MachineId, raw: &str) {
        match raw.parse::<ObservedState>() {
            Ok(state) => self.insert(id, state),
            Err(_) => {
                self.states.remove(&id);
                self.unparsed.insert(id, raw.to_string());
            }
        }
    }

    /// Build a snapshot from raw `(id, state)` pairs.
    pub fn from_raw<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<MachineId>,
        V: AsRef<str>,
    {
        let mut snapshot = Self::new();
        for (id, raw) in entries {
            snapshot.insert_raw(id.into(), raw.as_ref());
        }
        snapshot
    }

    /// Observed state of a machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when discovery reported a value that
    /// is not a known lifecycle state.
    pub fn get(&self, id: &MachineId) -> Result<ObservedState> {
        if let Some(raw) = self.unparsed.get(id) {
            return Err(Error::invalid_state(format!(
                "machine '{id}': unrecognized observed state '{raw}'"
            )));
        }
        Ok(self
            .states
            .get(id)
            .copied()
            .unwrap_or(ObservedState::NotExist))
    }

    /// Number of machines with an observation (parsed or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len().saturating_add(self.unparsed.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.unparsed.is_empty()
    }
}

/// One machine of a joined snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEntry {
    Ready(TransitionInput),
    Rejected { id: MachineId, error: Error },
}

impl SnapshotEntry {
    #[must_use]
    pub const fn id(&self) -> &MachineId {
        match self {
            Self::Ready(input) => input.id(),
            Self::Rejected { id, .. } => id,
        }
    }
}

/// Fleet declarations joined with their observations for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl FleetSnapshot {
    /// Join the declared fleet with the observed states.
    ///
    /// Invalid members, duplicate ids or instance names (later occurrences)
    /// and machines with unparseable observations become
    /// [`SnapshotEntry::Rejected`]; the rest of the fleet is unaffected.
    #[must_use]
    pub fn build(fleet: &FleetSpec, observed: &ObservedSnapshot) -> Self {
        let mut seen: HashSet<&MachineId> = HashSet::new();
        let mut seen_names: HashSet<&str> = HashSet::new();
        let entries = fleet
            .members()
            .map(|member| {
                if !seen.insert(member.id()) {
                    return SnapshotEntry::Rejected {
                        id: member.id().clone(),
                        error: Error::invalid_state(format!(
                            "machine id '{}' is declared more than once",
                            member.id()
                        )),
                    };
                }
                match member {
                    FleetMember::Invalid { id, error } => SnapshotEntry::Rejected {
                        id: id.clone(),
                        error: error.clone(),
                    },
                    FleetMember::Declared(spec) => {
                        if !seen_names.insert(spec.name.as_str()) {
                            return SnapshotEntry::Rejected {
                                id: spec.id.clone(),
                                error: Error::invalid_state(format!(
                                    "instance name '{}' is declared more than once",
                                    spec.name
                                )),
                            };
                        }
                        observed
                            .get(&spec.id)
                            .and_then(|state| TransitionInput::new(spec, state))
                            .map_or_else(
                                |error| SnapshotEntry::Rejected {
                                    id: spec.id.clone(),
                                    error,
                                },
                                SnapshotEntry::Ready,
                            )
                    }
                }
            })
            .collect();
        Self { entries }
    }

    /// Snapshot made only of already-validated inputs.
    #[must_use]
    pub fn from_inputs(inputs: Vec<TransitionInput>) -> Self {
        Self {
            entries: inputs.into_iter().map(SnapshotEntry::Ready).collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    pub fn ready(&self) -> impl Iterator<Item = &TransitionInput> {
        self.entries.iter().filter_map(|e| match e {
            SnapshotEntry::Ready(input) => Some(input),
            SnapshotEntry::Rejected { .. } => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&MachineId, &Error)> {
        self.entries.iter().filter_map(|e| match e {
            SnapshotEntry::Rejected { id, error } => Some((id, error)),
            SnapshotEntry::Ready(_) => None,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
