//! Cluster transport abstraction.

use async_trait::async_trait;

use crate::error::Result;
use crate::options::VmOption;
use crate::types::*;

/// Requests the session client needs from the Proxmox API.
///
/// Implementations own HTTP, authentication and task polling: every mutating
/// call returns once the platform task has finished. The client layers
/// caching and codec work on top and never builds a request path itself.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    // =========================================================================
    // Queries
    // =========================================================================

    /// List cluster resources of one kind (`GET /cluster/resources?type=`).
    async fn cluster_resources(&self, kind: ResourceKind) -> Result<ResourceList>;

    /// Ask the platform whether `vmid` is free (`GET /cluster/nextid?vmid=`).
    ///
    /// Returns the confirmed ID, or [`crate::ClientError::IdUnavailable`]
    /// when it is taken.
    async fn next_id(&self, vmid: u32) -> Result<u32>;

    /// Fetch a VM's configuration.
    async fn vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig>;

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a VM (`POST /nodes/{node}/qemu`).
    async fn create_vm(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()>;

    /// Apply configuration changes (`POST /nodes/{node}/qemu/{vmid}/config`).
    async fn update_vm_config(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()>;

    /// Stop if running, then delete.
    async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()>;

    /// Migrate to `target`.
    async fn migrate_vm(&self, node: &str, vmid: u32, target: &str, online: bool) -> Result<()>;
}
