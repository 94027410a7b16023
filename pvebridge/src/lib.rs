//! # pvebridge
//!
//! Typed access to Proxmox VE VM configuration and cached cluster lookups.
//!
//! The crate has two halves:
//! - **Attribute strings** ([`attrs`]): structured configuration values such as
//!   `net0`, `numa0` or `smbios1` travel as `key=value,key=value` strings.
//!   Each record type carries a descriptor table that drives encoding and
//!   decoding.
//! - **Session client** ([`ApiClient`]): cluster resource listings cached per
//!   kind, VMID reservations, and VM mutations that keep both consistent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               ApiClient                 │
//! │  (lookups, next_id, create/update/...)  │
//! └──────┬──────────────┬───────────────┬───┘
//!        │              │               │
//!        ▼              ▼               ▼
//! ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐
//! │ResourceCache│ │   Vmid      │ │ ClusterTransport│
//! │ (TTL/kind)  │ │Reservations │ │ (HTTP or Mock)  │
//! └─────────────┘ └─────────────┘ └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pvebridge::{ApiClient, MockTransport, VmConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.add_vm("pve1", 100, VmConfig::new().with("name", "web-1")).unwrap();
//!
//!     let client = ApiClient::new(transport);
//!     let vm = client.find_vm_by_name("web-1").await.unwrap();
//!     let vmid = client.next_id(100).await.unwrap();
//! }
//! ```

pub mod attrs;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod mock;
pub mod options;
pub mod reservations;
pub mod traits;
pub mod types;

pub use attrs::{
    AttributeRecord, VmCloudInitIpConfig, VmCpu, VmHostPci, VmNetworkDevice, VmNuma,
    VmQemuGuestAgent, VmSmbios,
};
pub use cache::ResourceCache;
pub use client::{ApiClient, MAX_VMID};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{AttrError, ClientError, Result};
pub use mock::MockTransport;
pub use options::{vm_sku, vm_uuid, InstanceSpec, NumaNodeSpec, VmOption, VmOptionKey};
pub use reservations::VmidReservations;
pub use traits::ClusterTransport;
pub use types::*;
