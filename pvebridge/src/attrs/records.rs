//! Property-string records for VM configuration fields.
//!
//! Every record here maps one Proxmox configuration key:
//!
//! | Record | Config key |
//! |--------|------------|
//! | [`VmNetworkDevice`] | `net0`..`netN` |
//! | [`VmNuma`] | `numa0`..`numaN` |
//! | [`VmSmbios`] | `smbios1` |
//! | [`VmCloudInitIpConfig`] | `ipconfig0`..`ipconfigN` |
//! | [`VmQemuGuestAgent`] | `agent` |
//! | [`VmCpu`] | `cpu` |
//! | [`VmHostPci`] | `hostpci0`..`hostpciN` |
//!
//! Descriptor order is encode order, so it matches what the Proxmox UI writes.

use serde::{Deserialize, Serialize};

use super::{AttributeRecord, Field};

// =============================================================================
// NETWORK
// =============================================================================

/// Network device (`netN`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmNetworkDevice {
    /// MAC address when the model is virtio (`virtio=<mac>`)
    pub virtio: String,
    /// Host bridge (e.g., "vmbr0")
    pub bridge: String,
    /// Proxmox firewall enabled on this interface
    pub firewall: Option<bool>,
    /// Link is administratively down
    pub link_down: Option<bool>,
    /// Explicit MAC address
    pub macaddr: String,
    pub mtu: Option<i64>,
    pub model: String,
    /// Multiqueue count (usually the vCPU count)
    pub queues: Option<i64>,
    /// Access VLAN tag
    pub tag: Option<i64>,
    /// Trunked VLAN IDs
    pub trunks: Vec<i64>,
}

static NETWORK_DEVICE_FIELDS: &[Field<VmNetworkDevice>] = &[
    Field::string("virtio", |r| r.virtio.as_str(), |r, v| r.virtio = v),
    Field::string("bridge", |r| r.bridge.as_str(), |r, v| r.bridge = v),
    Field::flag("firewall", |r| r.firewall, |r, v| r.firewall = Some(v)),
    Field::flag("link_down", |r| r.link_down, |r, v| r.link_down = Some(v)),
    Field::string("macaddr", |r| r.macaddr.as_str(), |r, v| r.macaddr = v),
    Field::int("mtu", |r| r.mtu, |r, v| r.mtu = Some(v)),
    Field::string("model", |r| r.model.as_str(), |r, v| r.model = v),
    Field::int("queues", |r| r.queues, |r, v| r.queues = Some(v)),
    Field::int("tag", |r| r.tag, |r, v| r.tag = Some(v)),
    Field::ints("trunks", |r| r.trunks.as_slice(), |r, v| r.trunks = v),
];

impl AttributeRecord for VmNetworkDevice {
    fn fields() -> &'static [Field<Self>] {
        NETWORK_DEVICE_FIELDS
    }
}

// =============================================================================
// NUMA
// =============================================================================

/// NUMA node layout (`numaN`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmNuma {
    /// Guest CPU ranges (e.g., ["0-3", "4-7"])
    pub cpus: Vec<String>,
    /// Host NUMA nodes backing this guest node
    pub host_nodes: Vec<String>,
    /// Memory in MiB
    pub memory: Option<i64>,
    /// Allocation policy: preferred, bind or interleave
    pub policy: String,
}

static NUMA_FIELDS: &[Field<VmNuma>] = &[
    Field::strings("cpus", |r| r.cpus.as_slice(), |r, v| r.cpus = v),
    Field::strings("hostnodes", |r| r.host_nodes.as_slice(), |r, v| r.host_nodes = v),
    Field::int("memory", |r| r.memory, |r, v| r.memory = Some(v)),
    Field::string("policy", |r| r.policy.as_str(), |r, v| r.policy = v),
];

impl AttributeRecord for VmNuma {
    fn fields() -> &'static [Field<Self>] {
        NUMA_FIELDS
    }
}

// =============================================================================
// SMBIOS
// =============================================================================

/// SMBIOS type 1 identity (`smbios1`).
///
/// When `base64` is set, the string fields hold base64 text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSmbios {
    pub base64: Option<bool>,
    pub family: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
    pub sku: String,
    pub uuid: String,
    pub version: String,
}

static SMBIOS_FIELDS: &[Field<VmSmbios>] = &[
    Field::flag("base64", |r| r.base64, |r, v| r.base64 = Some(v)),
    Field::string("family", |r| r.family.as_str(), |r, v| r.family = v),
    Field::string("manufacturer", |r| r.manufacturer.as_str(), |r, v| r.manufacturer = v),
    Field::string("product", |r| r.product.as_str(), |r, v| r.product = v),
    Field::string("serial", |r| r.serial.as_str(), |r, v| r.serial = v),
    Field::string("sku", |r| r.sku.as_str(), |r, v| r.sku = v),
    Field::string("uuid", |r| r.uuid.as_str(), |r, v| r.uuid = v),
    Field::string("version", |r| r.version.as_str(), |r, v| r.version = v),
];

impl AttributeRecord for VmSmbios {
    fn fields() -> &'static [Field<Self>] {
        SMBIOS_FIELDS
    }
}

// =============================================================================
// CLOUD-INIT
// =============================================================================

/// Cloud-init IP settings (`ipconfigN`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmCloudInitIpConfig {
    pub gateway_ipv4: String,
    pub gateway_ipv6: String,
    /// IPv4 CIDR, "dhcp" or empty
    pub ipv4: String,
    /// IPv6 CIDR, "dhcp", "auto" or empty
    pub ipv6: String,
}

static CLOUD_INIT_IP_FIELDS: &[Field<VmCloudInitIpConfig>] = &[
    Field::string("gw", |r| r.gateway_ipv4.as_str(), |r, v| r.gateway_ipv4 = v),
    Field::string("gw6", |r| r.gateway_ipv6.as_str(), |r, v| r.gateway_ipv6 = v),
    Field::string("ip", |r| r.ipv4.as_str(), |r, v| r.ipv4 = v),
    Field::string("ip6", |r| r.ipv6.as_str(), |r, v| r.ipv6 = v),
];

impl AttributeRecord for VmCloudInitIpConfig {
    fn fields() -> &'static [Field<Self>] {
        CLOUD_INIT_IP_FIELDS
    }
}

// =============================================================================
// GUEST AGENT / CPU / PCI
// =============================================================================

/// QEMU guest agent settings (`agent`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmQemuGuestAgent {
    pub enabled: Option<bool>,
    pub freeze_fs_on_backup: Option<bool>,
    pub fstrim_cloned_disks: Option<bool>,
    /// Channel type: virtio or isa
    pub agent_type: String,
}

static GUEST_AGENT_FIELDS: &[Field<VmQemuGuestAgent>] = &[
    Field::flag("enabled", |r| r.enabled, |r, v| r.enabled = Some(v)),
    Field::flag(
        "freeze-fs-on-backup",
        |r| r.freeze_fs_on_backup,
        |r, v| r.freeze_fs_on_backup = Some(v),
    ),
    Field::flag(
        "fstrim_cloned_disks",
        |r| r.fstrim_cloned_disks,
        |r, v| r.fstrim_cloned_disks = Some(v),
    ),
    Field::string("type", |r| r.agent_type.as_str(), |r, v| r.agent_type = v),
];

impl AttributeRecord for VmQemuGuestAgent {
    fn fields() -> &'static [Field<Self>] {
        GUEST_AGENT_FIELDS
    }
}

/// CPU model (`cpu`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmCpu {
    /// Feature flags (e.g., ["+aes", "-pcid"])
    pub flags: Vec<String>,
    pub cpu_type: String,
}

static CPU_FIELDS: &[Field<VmCpu>] = &[
    Field::strings("flags", |r| r.flags.as_slice(), |r, v| r.flags = v),
    Field::string("cputype", |r| r.cpu_type.as_str(), |r, v| r.cpu_type = v),
];

impl AttributeRecord for VmCpu {
    fn fields() -> &'static [Field<Self>] {
        CPU_FIELDS
    }
}

/// PCI passthrough device (`hostpciN`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmHostPci {
    pub device_id: String,
    /// Cluster-wide resource mapping name
    pub mapping: String,
    /// Mediated device type
    pub mdev: String,
    pub pcie: Option<bool>,
    pub rombar: Option<bool>,
    pub romfile: String,
    /// Primary GPU
    pub x_vga: Option<bool>,
}

static HOST_PCI_FIELDS: &[Field<VmHostPci>] = &[
    Field::string("device-id", |r| r.device_id.as_str(), |r, v| r.device_id = v),
    Field::string("mapping", |r| r.mapping.as_str(), |r, v| r.mapping = v),
    Field::string("mdev", |r| r.mdev.as_str(), |r, v| r.mdev = v),
    Field::flag("pcie", |r| r.pcie, |r, v| r.pcie = Some(v)),
    Field::flag("rombar", |r| r.rombar, |r, v| r.rombar = Some(v)),
    Field::string("romfile", |r| r.romfile.as_str(), |r, v| r.romfile = v),
    Field::flag("x-vga", |r| r.x_vga, |r, v| r.x_vga = Some(v)),
];

impl AttributeRecord for VmHostPci {
    fn fields() -> &'static [Field<Self>] {
        HOST_PCI_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttrError;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cloud_init_ip_config_decode() {
        assert_eq!(
            VmCloudInitIpConfig::from_attr_string("").unwrap(),
            VmCloudInitIpConfig::default()
        );

        let ipconfig = VmCloudInitIpConfig::from_attr_string("ip=1.2.3.4,gw=1.2.3.1").unwrap();
        assert_eq!(
            ipconfig,
            VmCloudInitIpConfig {
                gateway_ipv4: "1.2.3.1".to_string(),
                ipv4: "1.2.3.4".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_network_device_decode() {
        assert_eq!(
            VmNetworkDevice::from_attr_string("").unwrap(),
            VmNetworkDevice::default()
        );

        let nic = VmNetworkDevice::from_attr_string(
            "virtio=32:90:AC:10:00:91,bridge=vmbr0,firewall=1,mtu=1500,queues=8,tag=1,trunks=1;2",
        )
        .unwrap();

        assert_eq!(
            nic,
            VmNetworkDevice {
                virtio: "32:90:AC:10:00:91".to_string(),
                bridge: "vmbr0".to_string(),
                firewall: Some(true),
                mtu: Some(1500),
                queues: Some(8),
                tag: Some(1),
                trunks: vec![1, 2],
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_network_device_encode() {
        assert_eq!(VmNetworkDevice::default().to_attr_string().unwrap(), "");

        let nic = VmNetworkDevice {
            virtio: "32:90:AC:10:00:91".to_string(),
            bridge: "vmbr0".to_string(),
            firewall: Some(true),
            mtu: Some(1500),
            queues: Some(8),
            trunks: vec![1, 2],
            ..Default::default()
        };

        assert_eq!(
            nic.to_attr_string().unwrap(),
            "virtio=32:90:AC:10:00:91,bridge=vmbr0,firewall=1,mtu=1500,queues=8,trunks=1;2"
        );
    }

    #[test]
    fn test_network_device_bridge_key_case() {
        let upper = VmNetworkDevice::from_attr_string("BRIDGE=vmbr0").unwrap();
        let lower = VmNetworkDevice::from_attr_string("bridge=vmbr0").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.bridge, "vmbr0");
    }

    #[test]
    fn test_network_device_unknown_key() {
        let nic = VmNetworkDevice::from_attr_string("unknownkey=5,bridge=vmbr0").unwrap();
        assert_eq!(
            nic,
            VmNetworkDevice {
                bridge: "vmbr0".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_network_device_bad_trunks() {
        let err = VmNetworkDevice::from_attr_string("trunks=1;x").unwrap_err();
        assert!(matches!(err, AttrError::Decode { ref field, .. } if field == "trunks"));
    }

    #[test]
    fn test_network_device_link_down_false_is_present() {
        let nic = VmNetworkDevice::from_attr_string("bridge=vmbr1,link_down=0").unwrap();
        assert_eq!(nic.link_down, Some(false));
        assert_eq!(nic.to_attr_string().unwrap(), "bridge=vmbr1,link_down=0");
    }

    #[test]
    fn test_numa_decode() {
        assert_eq!(VmNuma::from_attr_string("").unwrap(), VmNuma::default());

        let cases = [
            (
                "cpus=0-3,hostnodes=0,memory=12288,policy=bind",
                VmNuma {
                    cpus: strings(&["0-3"]),
                    host_nodes: strings(&["0"]),
                    memory: Some(12288),
                    policy: "bind".to_string(),
                },
            ),
            (
                "cpus=4-7,hostnodes=1,memory=12288",
                VmNuma {
                    cpus: strings(&["4-7"]),
                    host_nodes: strings(&["1"]),
                    memory: Some(12288),
                    policy: String::new(),
                },
            ),
            (
                "cpus=0-3;4-7,hostnodes=0;1,memory=12288",
                VmNuma {
                    cpus: strings(&["0-3", "4-7"]),
                    host_nodes: strings(&["0", "1"]),
                    memory: Some(12288),
                    policy: String::new(),
                },
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(VmNuma::from_attr_string(input).unwrap(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_numa_encode() {
        assert_eq!(VmNuma::default().to_attr_string().unwrap(), "");

        let numa = VmNuma {
            cpus: strings(&["0-3"]),
            host_nodes: strings(&["0"]),
            memory: Some(12288),
            policy: "bind".to_string(),
        };
        assert_eq!(
            numa.to_attr_string().unwrap(),
            "cpus=0-3,hostnodes=0,memory=12288,policy=bind"
        );

        let numa = VmNuma {
            cpus: strings(&["0-3", "4-7"]),
            host_nodes: strings(&["0", "1"]),
            memory: Some(12288),
            ..Default::default()
        };
        assert_eq!(
            numa.to_attr_string().unwrap(),
            "cpus=0-3;4-7,hostnodes=0;1,memory=12288"
        );
    }

    #[test]
    fn test_smbios_round_trip_with_base64_padding() {
        let smbios = VmSmbios {
            base64: Some(true),
            serial: "aD13ZWI7aT0xMDA=".to_string(),
            sku: "c21hbGw=".to_string(),
            uuid: "5b0f7c0e-8f5a-4a39-9a57-2f0b1f1f0c11".to_string(),
            ..Default::default()
        };

        let encoded = smbios.to_attr_string().unwrap();
        assert_eq!(
            encoded,
            "base64=1,serial=aD13ZWI7aT0xMDA=,sku=c21hbGw=,uuid=5b0f7c0e-8f5a-4a39-9a57-2f0b1f1f0c11"
        );
        assert_eq!(VmSmbios::from_attr_string(&encoded).unwrap(), smbios);
    }

    #[test]
    fn test_guest_agent_positional_value_is_skipped() {
        let agent = VmQemuGuestAgent::from_attr_string("1,fstrim_cloned_disks=1,type=virtio").unwrap();
        assert_eq!(agent.enabled, None);
        assert_eq!(agent.fstrim_cloned_disks, Some(true));
        assert_eq!(agent.agent_type, "virtio");
    }

    #[test]
    fn test_cpu_flags() {
        let cpu = VmCpu::from_attr_string("cputype=host,flags=+aes;-pcid").unwrap();
        assert_eq!(cpu.cpu_type, "host");
        assert_eq!(cpu.flags, strings(&["+aes", "-pcid"]));
        assert_eq!(cpu.to_attr_string().unwrap(), "flags=+aes;-pcid,cputype=host");
    }

    #[test]
    fn test_host_pci_hyphenated_keys() {
        let pci = VmHostPci::from_attr_string("mapping=gpu0,pcie=1,x-vga=1,rombar=0").unwrap();
        assert_eq!(pci.mapping, "gpu0");
        assert_eq!(pci.pcie, Some(true));
        assert_eq!(pci.x_vga, Some(true));
        assert_eq!(pci.rombar, Some(false));
        assert_eq!(pci.to_attr_string().unwrap(), "mapping=gpu0,pcie=1,rombar=0,x-vga=1");
    }

    #[test]
    fn test_zero_records_encode_empty() {
        assert_eq!(VmSmbios::default().to_attr_string().unwrap(), "");
        assert_eq!(VmCloudInitIpConfig::default().to_attr_string().unwrap(), "");
        assert_eq!(VmQemuGuestAgent::default().to_attr_string().unwrap(), "");
        assert_eq!(VmCpu::default().to_attr_string().unwrap(), "");
        assert_eq!(VmHostPci::default().to_attr_string().unwrap(), "");
    }
}
