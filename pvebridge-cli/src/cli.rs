//! Command-line argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

/// pvebridge - Proxmox VE attribute-string inspector
#[derive(Parser, Debug)]
#[command(name = "pvebridge")]
#[command(about = "Decode, encode and inspect Proxmox VE attribute strings")]
#[command(version)]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "PVEBRIDGE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (pretty, json)
    #[arg(long, default_value = "pretty", env = "PVEBRIDGE_LOG_FORMAT")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an attribute string into JSON
    Decode {
        /// Record type the string belongs to
        #[arg(value_enum)]
        record: RecordType,
        /// Attribute string (e.g., "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0")
        value: String,
    },

    /// Encode a JSON record into an attribute string
    Encode {
        #[arg(value_enum)]
        record: RecordType,
        /// JSON object; missing fields take their defaults
        json: String,
    },

    /// List the attribute names a record understands
    Fields {
        #[arg(value_enum)]
        record: RecordType,
    },

    /// Validate a client configuration file and print the effective values
    CheckConfig {
        /// Path to the YAML configuration file
        path: String,
    },
}

/// Record types addressable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Network device (netN)
    Net,
    /// NUMA node (numaN)
    Numa,
    /// SMBIOS type 1 (smbios1)
    Smbios,
    /// Cloud-init IP config (ipconfigN)
    Ipconfig,
    /// QEMU guest agent (agent)
    Agent,
    /// CPU model (cpu)
    Cpu,
    /// PCI passthrough (hostpciN)
    Hostpci,
}
