//! # pvebridge
//!
//! Command-line inspector for Proxmox VE attribute strings.
//!
//! ## Usage
//! ```bash
//! pvebridge decode net "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,tag=20"
//! pvebridge encode numa '{"cpus":["0-3","4-7"],"host_nodes":["0"],"memory":4096}'
//! pvebridge fields smbios
//! pvebridge check-config /etc/pvebridge/client.yaml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use pvebridge::attrs::AttributeRecord;
use pvebridge::{
    ClientConfig, VmCloudInitIpConfig, VmCpu, VmHostPci, VmNetworkDevice, VmNuma,
    VmQemuGuestAgent, VmSmbios,
};

mod cli;

use cli::{Args, Command, RecordType};

fn main() -> Result<()> {
    let args = Args::parse();

    pvebridge_common::init_logging_with_format(&args.log_level, args.log_format.parse()?)?;

    // Errors are reported once, by the `Result` returned from main.
    let output = run(args.command)?;
    println!("{}", output);
    Ok(())
}

fn run(command: Command) -> Result<String> {
    match command {
        Command::Decode { record, value } => {
            debug!(?record, value = %value, "Decoding attribute string");
            dispatch(record, Op::Decode(&value))
        }
        Command::Encode { record, json } => {
            debug!(?record, "Encoding record");
            dispatch(record, Op::Encode(&json))
        }
        Command::Fields { record } => dispatch(record, Op::Fields),
        Command::CheckConfig { path } => {
            let config = ClientConfig::load(&path)?;
            serde_json::to_string_pretty(&config).context("Failed to render config")
        }
    }
}

enum Op<'a> {
    Decode(&'a str),
    Encode(&'a str),
    Fields,
}

fn dispatch(record: RecordType, op: Op<'_>) -> Result<String> {
    match record {
        RecordType::Net => apply::<VmNetworkDevice>(op),
        RecordType::Numa => apply::<VmNuma>(op),
        RecordType::Smbios => apply::<VmSmbios>(op),
        RecordType::Ipconfig => apply::<VmCloudInitIpConfig>(op),
        RecordType::Agent => apply::<VmQemuGuestAgent>(op),
        RecordType::Cpu => apply::<VmCpu>(op),
        RecordType::Hostpci => apply::<VmHostPci>(op),
    }
}

fn apply<R>(op: Op<'_>) -> Result<String>
where
    R: AttributeRecord + Serialize + DeserializeOwned,
{
    match op {
        Op::Decode(value) => {
            let record = R::from_attr_string(value)
                .with_context(|| format!("Failed to decode '{}'", value))?;
            serde_json::to_string_pretty(&record).context("Failed to render record")
        }
        Op::Encode(json) => {
            let record: R = serde_json::from_str(json).context("Failed to parse JSON record")?;
            Ok(record.to_attr_string()?)
        }
        Op::Fields => Ok(R::fields()
            .iter()
            .filter(|field| field.is_mapped())
            .map(|field| format!("{}\t{}", field.name, field.kind()))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}
