//! VM configuration options.
//!
//! Configuration updates are expressed as [`VmOption`] values whose key is one
//! of the recognized [`VmOptionKey`]s. Keys arriving as strings are parsed
//! against that allow-list, so a typo like `memroy` is rejected with
//! [`ClientError::UnknownOption`] instead of being silently dropped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::attrs::{AttributeRecord, VmNuma};
use crate::error::{AttrError, ClientError, Result};
use crate::types::VmConfig;

// =============================================================================
// OPTION KEYS
// =============================================================================

/// Recognized VM configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmOptionKey {
    Name,
    Description,
    Tags,
    OnBoot,
    Cores,
    Sockets,
    Memory,
    Balloon,
    Affinity,
    Cpu,
    /// NUMA emulation switch (`numa=1`)
    Numa,
    Agent,
    Smbios1,
    Boot,
    OsType,
    Machine,
    Bios,
    ScsiHw,
    CiUser,
    SshKeys,
    Nameserver,
    SearchDomain,
    /// Request-only parameter listing keys to remove
    Delete,
    Net(u32),
    /// NUMA node layout (`numaN`)
    NumaNode(u32),
    IpConfig(u32),
    HostPci(u32),
    Scsi(u32),
    Virtio(u32),
    Sata(u32),
    Ide(u32),
}

const SIMPLE_KEYS: &[(&str, VmOptionKey)] = &[
    ("name", VmOptionKey::Name),
    ("description", VmOptionKey::Description),
    ("tags", VmOptionKey::Tags),
    ("onboot", VmOptionKey::OnBoot),
    ("cores", VmOptionKey::Cores),
    ("sockets", VmOptionKey::Sockets),
    ("memory", VmOptionKey::Memory),
    ("balloon", VmOptionKey::Balloon),
    ("affinity", VmOptionKey::Affinity),
    ("cpu", VmOptionKey::Cpu),
    ("numa", VmOptionKey::Numa),
    ("agent", VmOptionKey::Agent),
    ("smbios1", VmOptionKey::Smbios1),
    ("boot", VmOptionKey::Boot),
    ("ostype", VmOptionKey::OsType),
    ("machine", VmOptionKey::Machine),
    ("bios", VmOptionKey::Bios),
    ("scsihw", VmOptionKey::ScsiHw),
    ("ciuser", VmOptionKey::CiUser),
    ("sshkeys", VmOptionKey::SshKeys),
    ("nameserver", VmOptionKey::Nameserver),
    ("searchdomain", VmOptionKey::SearchDomain),
    ("delete", VmOptionKey::Delete),
];

const INDEXED_KEYS: &[(&str, fn(u32) -> VmOptionKey)] = &[
    ("net", VmOptionKey::Net),
    ("numa", VmOptionKey::NumaNode),
    ("ipconfig", VmOptionKey::IpConfig),
    ("hostpci", VmOptionKey::HostPci),
    ("scsi", VmOptionKey::Scsi),
    ("virtio", VmOptionKey::Virtio),
    ("sata", VmOptionKey::Sata),
    ("ide", VmOptionKey::Ide),
];

impl FromStr for VmOptionKey {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();

        if let Some((_, parsed)) = SIMPLE_KEYS.iter().find(|(name, _)| *name == key) {
            return Ok(*parsed);
        }

        INDEXED_KEYS
            .iter()
            .find_map(|(prefix, build)| {
                let index = key.strip_prefix(prefix)?;
                if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                index.parse::<u32>().ok().map(build)
            })
            .ok_or_else(|| ClientError::UnknownOption(s.to_string()))
    }
}

impl fmt::Display for VmOptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indexed = |prefix: &str, index: &u32| format!("{}{}", prefix, index);
        let name = match self {
            VmOptionKey::Net(i) => indexed("net", i),
            VmOptionKey::NumaNode(i) => indexed("numa", i),
            VmOptionKey::IpConfig(i) => indexed("ipconfig", i),
            VmOptionKey::HostPci(i) => indexed("hostpci", i),
            VmOptionKey::Scsi(i) => indexed("scsi", i),
            VmOptionKey::Virtio(i) => indexed("virtio", i),
            VmOptionKey::Sata(i) => indexed("sata", i),
            VmOptionKey::Ide(i) => indexed("ide", i),
            simple => SIMPLE_KEYS
                .iter()
                .find(|(_, key)| key == simple)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default(),
        };
        f.write_str(&name)
    }
}

impl VmOptionKey {
    /// Whether the key names a disk slot (`scsiN`, `virtioN`, `sataN`, `ideN`).
    pub fn is_disk_slot(&self) -> bool {
        matches!(
            self,
            VmOptionKey::Scsi(_) | VmOptionKey::Virtio(_) | VmOptionKey::Sata(_) | VmOptionKey::Ide(_)
        )
    }
}

/// One `key=value` request parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOption {
    pub key: VmOptionKey,
    pub value: String,
}

impl VmOption {
    pub fn new(key: VmOptionKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Build an option from an untyped key, checked against the allow-list.
    pub fn parse(key: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self::new(key.parse()?, value))
    }

    /// Build an option holding an encoded property string.
    pub fn record<R: AttributeRecord>(key: VmOptionKey, record: &R) -> Result<Self> {
        Ok(Self::new(key, record.to_attr_string()?))
    }

    /// Request parameter name and value.
    pub fn to_param(&self) -> (String, String) {
        (self.key.to_string(), self.value.clone())
    }
}

/// Parse an untyped key/value map into options, rejecting unknown keys.
pub fn parse_options<I, K, V>(desired: I) -> Result<Vec<VmOption>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    desired
        .into_iter()
        .map(|(key, value)| VmOption::parse(key.as_ref(), value))
        .collect()
}

/// Options from `desired` that would actually change `current`.
///
/// A `delete` option is narrowed to keys `current` has set and emitted first;
/// every other option is kept only when its value differs.
pub fn changed_options(current: &VmConfig, desired: &[VmOption]) -> Result<Vec<VmOption>> {
    let mut changes = Vec::new();
    let mut deletes = Vec::new();

    for option in desired.iter().filter(|o| o.key == VmOptionKey::Delete) {
        for key in option.value.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let key: VmOptionKey = key.parse()?;
            let name = key.to_string();
            if current.get(&name).is_some_and(|v| !v.is_empty()) && !deletes.contains(&name) {
                deletes.push(name);
            }
        }
    }

    if !deletes.is_empty() {
        changes.push(VmOption::new(VmOptionKey::Delete, deletes.join(",")));
    }

    for option in desired.iter().filter(|o| o.key != VmOptionKey::Delete) {
        if current.get(&option.key.to_string()) != Some(option.value.as_str()) {
            changes.push(option.clone());
        }
    }

    Ok(changes)
}

// =============================================================================
// INSTANCE OPTIONS
// =============================================================================

/// NUMA policies the platform accepts.
pub const NUMA_POLICIES: &[&str] = &["preferred", "bind", "interleave"];

/// Guest NUMA node placement on one host node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaNodeSpec {
    /// Host CPU set, comma separated (e.g., "0-3,8-11")
    pub cpus: String,
    /// Memory in MiB
    pub memory: u64,
    /// preferred, bind or interleave; anything else becomes preferred
    pub policy: String,
}

/// Sizing and identity applied to a freshly cloned VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSpec {
    pub name: String,
    /// vCPU cores (0 leaves the template value)
    pub cpu: u32,
    pub cpu_affinity: String,
    /// Memory in MiB (0 leaves the template value)
    pub memory: u32,
    /// Host NUMA node ID to placement
    pub numa_nodes: BTreeMap<u32, NumaNodeSpec>,
    pub tags: String,
    /// Instance type name, stored base64-encoded in the SMBIOS SKU
    pub instance_type: String,
}

/// Build the options that turn a cloned template into the instance `spec`
/// describes. `config` is the clone's current configuration.
pub fn instance_options(vmid: u32, config: &VmConfig, spec: &InstanceSpec) -> Result<Vec<VmOption>> {
    let mut options = Vec::new();

    if spec.cpu != 0 {
        options.push(VmOption::new(VmOptionKey::Cores, spec.cpu.to_string()));
    }

    if !spec.cpu_affinity.is_empty() {
        options.push(VmOption::new(VmOptionKey::Affinity, spec.cpu_affinity.clone()));
    }

    if spec.memory != 0 {
        options.push(VmOption::new(VmOptionKey::Memory, spec.memory.to_string()));
    }

    if !spec.numa_nodes.is_empty() {
        options.push(VmOption::new(VmOptionKey::Numa, "1"));

        for (index, (host_node, node)) in spec.numa_nodes.iter().enumerate() {
            let policy = if NUMA_POLICIES.contains(&node.policy.as_str()) {
                node.policy.clone()
            } else {
                "preferred".to_string()
            };

            let memory = i64::try_from(node.memory).map_err(|_| AttrError::Encode {
                field: "memory".to_string(),
                reason: format!("NUMA node memory {} MiB out of range", node.memory),
            })?;

            let numa = VmNuma {
                cpus: node
                    .cpus
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
                host_nodes: vec![host_node.to_string()],
                memory: Some(memory),
                policy,
            };

            options.push(VmOption::record(VmOptionKey::NumaNode(index as u32), &numa)?);
        }
    }

    if !spec.tags.is_empty() {
        options.push(VmOption::new(VmOptionKey::Tags, spec.tags.clone()));
    }

    let mut smbios = config.smbios()?;
    smbios.sku = STANDARD.encode(spec.instance_type.as_bytes());
    smbios.serial = STANDARD.encode(format!("h={};i={}", spec.name, vmid));
    smbios.base64 = Some(true);
    options.push(VmOption::record(VmOptionKey::Smbios1, &smbios)?);

    if spec.cpu != 0 {
        for (index, mut nic) in config.network_devices()? {
            nic.queues = Some(i64::from(spec.cpu));
            options.push(VmOption::record(VmOptionKey::Net(index), &nic)?);
        }
    }

    Ok(options)
}

/// SMBIOS UUID of a VM, empty when unset.
pub fn vm_uuid(config: &VmConfig) -> Result<String> {
    Ok(config.smbios()?.uuid)
}

/// Instance type recorded in the SMBIOS SKU, empty when unset.
pub fn vm_sku(config: &VmConfig) -> Result<String> {
    let sku = config.smbios()?.sku;
    let decoded = STANDARD.decode(sku.as_bytes()).map_err(|e| AttrError::Decode {
        field: "sku".to_string(),
        value: sku.clone(),
        reason: e.to_string(),
    })?;

    Ok(String::from_utf8_lossy(&decoded).into_owned())
}
