//! Type definitions for cluster resources and VM configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::attrs::{
    AttributeRecord, Result, VmCloudInitIpConfig, VmNetworkDevice, VmNuma, VmQemuGuestAgent,
    VmSmbios,
};

// =============================================================================
// CLUSTER RESOURCES
// =============================================================================

/// Category of a cluster-wide listing (`/cluster/resources?type=<kind>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Vm,
    Storage,
    Node,
    Sdn,
}

impl ResourceKind {
    /// Query value understood by the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vm => "vm",
            ResourceKind::Storage => "storage",
            ResourceKind::Node => "node",
            ResourceKind::Sdn => "sdn",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a cluster resource listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterResource {
    /// Resource ID (e.g., "qemu/100", "storage/pve1/local-lvm")
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub node: String,
    pub name: String,
    pub vmid: Option<u32>,
    pub status: String,
    /// 1 for VM templates
    pub template: u8,
    /// Storage ID (storage rows only)
    pub storage: String,
    pub pool: String,
    pub tags: String,
    pub maxcpu: Option<f64>,
    pub maxmem: Option<u64>,
    pub maxdisk: Option<u64>,
}

impl ClusterResource {
    pub fn is_template(&self) -> bool {
        self.template == 1
    }
}

/// Snapshot of cluster resources of one kind.
pub type ResourceList = Vec<ClusterResource>;

// =============================================================================
// VM CONFIGURATION
// =============================================================================

/// Flat VM configuration as returned by `/nodes/{node}/qemu/{vmid}/config`.
///
/// Structured keys stay as raw property strings until one of the typed
/// accessors decodes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmConfig {
    values: BTreeMap<String, String>,
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw values of every `<prefix>N` key, ordered by N.
    pub fn indexed(&self, prefix: &str) -> Vec<(u32, &str)> {
        let mut entries: Vec<(u32, &str)> = self
            .values
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(prefix)?.parse::<u32>().ok()?;
                Some((index, value.as_str()))
            })
            .collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
    }

    /// Decoded `netN` devices, ordered by N.
    pub fn network_devices(&self) -> Result<Vec<(u32, VmNetworkDevice)>> {
        self.decode_indexed("net")
    }

    /// Decoded `numaN` nodes, ordered by N.
    pub fn numa_nodes(&self) -> Result<Vec<(u32, VmNuma)>> {
        self.decode_indexed("numa")
    }

    /// Decoded `ipconfigN` entries, ordered by N.
    pub fn ip_configs(&self) -> Result<Vec<(u32, VmCloudInitIpConfig)>> {
        self.decode_indexed("ipconfig")
    }

    /// Decoded `smbios1`; the default record when unset.
    pub fn smbios(&self) -> Result<VmSmbios> {
        self.decode_key("smbios1")
    }

    /// Decoded `agent`; the default record when unset.
    pub fn agent(&self) -> Result<VmQemuGuestAgent> {
        self.decode_key("agent")
    }

    fn decode_key<R: AttributeRecord>(&self, key: &str) -> Result<R> {
        R::from_attr_string(self.get(key).unwrap_or_default())
    }

    fn decode_indexed<R: AttributeRecord>(&self, prefix: &str) -> Result<Vec<(u32, R)>> {
        self.indexed(prefix)
            .into_iter()
            .map(|(index, value)| Ok((index, R::from_attr_string(value)?)))
            .collect()
    }
}
