//! Mock cluster transport for testing and development.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{ClientError, Result};
use crate::options::{VmOption, VmOptionKey};
use crate::traits::ClusterTransport;
use crate::types::*;

/// Mock transport for testing.
///
/// This transport simulates a Proxmox cluster in memory. Useful for:
/// - Unit and integration testing
/// - Development without a cluster
///
/// Call counters let tests check how often the client really went to the
/// platform.
pub struct MockTransport {
    vms: RwLock<BTreeMap<u32, MockVm>>,
    resources: RwLock<HashMap<ResourceKind, ResourceList>>,
    taken_ids: RwLock<HashSet<u32>>,
    updates: RwLock<Vec<(u32, Vec<VmOption>)>>,
    fail_mutations: AtomicBool,
    fail_listings: AtomicBool,
    fail_next_id: AtomicBool,
    resource_calls: AtomicUsize,
    next_id_calls: AtomicUsize,
    config_calls: AtomicUsize,
}

struct MockVm {
    node: String,
    template: bool,
    config: VmConfig,
}

impl MockVm {
    fn resource(&self, vmid: u32) -> ClusterResource {
        ClusterResource {
            id: format!("qemu/{}", vmid),
            resource_type: "qemu".to_string(),
            node: self.node.clone(),
            name: self.config.get("name").unwrap_or_default().to_string(),
            vmid: Some(vmid),
            status: "stopped".to_string(),
            template: u8::from(self.template),
            tags: self.config.get("tags").unwrap_or_default().to_string(),
            ..Default::default()
        }
    }
}

impl MockTransport {
    /// Create an empty mock cluster.
    pub fn new() -> Self {
        info!("Creating mock cluster transport");
        Self {
            vms: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(HashMap::new()),
            taken_ids: RwLock::new(HashSet::new()),
            updates: RwLock::new(Vec::new()),
            fail_mutations: AtomicBool::new(false),
            fail_listings: AtomicBool::new(false),
            fail_next_id: AtomicBool::new(false),
            resource_calls: AtomicUsize::new(0),
            next_id_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add an online node.
    pub fn add_node(&self, node: &str) -> Result<()> {
        self.push_resource(
            ResourceKind::Node,
            ClusterResource {
                id: format!("node/{}", node),
                resource_type: "node".to_string(),
                node: node.to_string(),
                status: "online".to_string(),
                ..Default::default()
            },
        )
    }

    /// Add a storage row for `node`.
    pub fn add_storage(&self, node: &str, storage: &str, status: &str) -> Result<()> {
        self.push_resource(
            ResourceKind::Storage,
            ClusterResource {
                id: format!("storage/{}/{}", node, storage),
                resource_type: "storage".to_string(),
                node: node.to_string(),
                storage: storage.to_string(),
                status: status.to_string(),
                ..Default::default()
            },
        )
    }

    /// Add a VM with the given configuration.
    pub fn add_vm(&self, node: &str, vmid: u32, config: VmConfig) -> Result<()> {
        self.insert_vm(node, vmid, config, false)
    }

    /// Add a VM template.
    pub fn add_template(&self, node: &str, vmid: u32, name: &str) -> Result<()> {
        self.insert_vm(node, vmid, VmConfig::new().with("name", name), true)
    }

    /// Mark `vmid` as used by something outside the VM listing.
    pub fn mark_id_taken(&self, vmid: u32) -> Result<()> {
        self.taken_ids
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .insert(vmid);
        Ok(())
    }

    /// Make every mutating call fail until switched off.
    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Make resource listings fail until switched off.
    pub fn set_fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }

    /// Make next-id queries fail until switched off.
    pub fn set_fail_next_id(&self, fail: bool) {
        self.fail_next_id.store(fail, Ordering::SeqCst);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of resource listings served.
    pub fn resource_calls(&self) -> usize {
        self.resource_calls.load(Ordering::SeqCst)
    }

    /// Number of next-id queries served.
    pub fn next_id_calls(&self) -> usize {
        self.next_id_calls.load(Ordering::SeqCst)
    }

    /// Number of VM config reads served.
    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }

    /// Every option set sent through `update_vm_config`, in order.
    pub fn updates(&self) -> Vec<(u32, Vec<VmOption>)> {
        self.updates
            .read()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// Current configuration of a VM.
    pub fn config_of(&self, vmid: u32) -> Option<VmConfig> {
        self.vms
            .read()
            .ok()
            .and_then(|vms| vms.get(&vmid).map(|vm| vm.config.clone()))
    }

    /// Node a VM currently lives on.
    pub fn node_of(&self, vmid: u32) -> Option<String> {
        self.vms
            .read()
            .ok()
            .and_then(|vms| vms.get(&vmid).map(|vm| vm.node.clone()))
    }

    fn push_resource(&self, kind: ResourceKind, resource: ClusterResource) -> Result<()> {
        self.resources
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .entry(kind)
            .or_default()
            .push(resource);
        Ok(())
    }

    fn insert_vm(&self, node: &str, vmid: u32, config: VmConfig, template: bool) -> Result<()> {
        self.vms
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .insert(
                vmid,
                MockVm {
                    node: node.to_string(),
                    template,
                    config,
                },
            );
        Ok(())
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(ClientError::Transport(format!("mock {} failed", operation)));
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_options(config: &mut VmConfig, options: &[VmOption]) {
    for option in options {
        if option.key == VmOptionKey::Delete {
            for key in option.value.split(',').map(str::trim) {
                config.remove(key);
            }
        } else {
            config.set(option.key.to_string(), option.value.clone());
        }
    }
}

#[async_trait]
impl ClusterTransport for MockTransport {
    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn cluster_resources(&self, kind: ResourceKind) -> Result<ResourceList> {
        self.resource_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("mock listing failed".to_string()));
        }

        if kind == ResourceKind::Vm {
            let vms = self
                .vms
                .read()
                .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;
            return Ok(vms.iter().map(|(vmid, vm)| vm.resource(*vmid)).collect());
        }

        let resources = self
            .resources
            .read()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

        let list = resources.get(&kind).cloned().unwrap_or_default();
        debug!(count = list.len(), "Listing mock resources");
        Ok(list)
    }

    #[instrument(skip(self))]
    async fn next_id(&self, vmid: u32) -> Result<u32> {
        self.next_id_calls.fetch_add(1, Ordering::SeqCst);

        // A real round trip suspends here; let concurrent callers interleave.
        tokio::task::yield_now().await;

        if self.fail_next_id.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("mock next_id failed".to_string()));
        }

        let in_use = self
            .vms
            .read()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .contains_key(&vmid);
        let taken = self
            .taken_ids
            .read()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .contains(&vmid);

        if in_use || taken {
            return Err(ClientError::IdUnavailable(vmid));
        }

        Ok(vmid)
    }

    #[instrument(skip(self))]
    async fn vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);

        let vms = self
            .vms
            .read()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

        vms.get(&vmid)
            .filter(|vm| vm.node == node)
            .map(|vm| vm.config.clone())
            .ok_or_else(|| ClientError::VmNotFound(vmid.to_string()))
    }

    #[instrument(skip(self, options), fields(option_count = options.len()))]
    async fn create_vm(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()> {
        info!("Creating mock VM");
        self.check_failure("create")?;

        let mut vms = self
            .vms
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

        if vms.contains_key(&vmid) {
            return Err(ClientError::Transport(format!("VM {} already exists", vmid)));
        }

        let mut config = VmConfig::new();
        apply_options(&mut config, options);

        vms.insert(
            vmid,
            MockVm {
                node: node.to_string(),
                template: false,
                config,
            },
        );

        info!(vmid, "Mock VM created");
        Ok(())
    }

    #[instrument(skip(self, options), fields(option_count = options.len()))]
    async fn update_vm_config(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()> {
        info!("Updating mock VM config");
        self.check_failure("update")?;

        {
            let mut vms = self
                .vms
                .write()
                .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

            let vm = vms
                .get_mut(&vmid)
                .filter(|vm| vm.node == node)
                .ok_or_else(|| ClientError::VmNotFound(vmid.to_string()))?;

            apply_options(&mut vm.config, options);
        }

        self.updates
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?
            .push((vmid, options.to_vec()));

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()> {
        info!("Deleting mock VM");
        self.check_failure("delete")?;

        let mut vms = self
            .vms
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

        match vms.get(&vmid) {
            Some(vm) if vm.node == node => {
                vms.remove(&vmid);
                info!("Mock VM deleted");
                Ok(())
            }
            _ => Err(ClientError::VmNotFound(vmid.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn migrate_vm(&self, node: &str, vmid: u32, target: &str, online: bool) -> Result<()> {
        info!("Migrating mock VM");
        self.check_failure("migrate")?;

        let mut vms = self
            .vms
            .write()
            .map_err(|_| ClientError::Internal("Lock poisoned".to_string()))?;

        let vm = vms
            .get_mut(&vmid)
            .filter(|vm| vm.node == node)
            .ok_or_else(|| ClientError::VmNotFound(vmid.to_string()))?;

        vm.node = target.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_vm_lifecycle() {
        let transport = MockTransport::new();

        transport
            .create_vm("pve1", 100, &[VmOption::new(VmOptionKey::Name, "web-1")])
            .await
            .unwrap();

        let listing = transport.cluster_resources(ResourceKind::Vm).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "web-1");
        assert_eq!(listing[0].node, "pve1");

        assert!(matches!(
            transport.next_id(100).await,
            Err(ClientError::IdUnavailable(100))
        ));

        transport.migrate_vm("pve1", 100, "pve2", true).await.unwrap();
        assert_eq!(transport.node_of(100).as_deref(), Some("pve2"));

        transport.delete_vm("pve2", 100).await.unwrap();
        assert!(transport.cluster_resources(ResourceKind::Vm).await.unwrap().is_empty());
        assert_eq!(transport.resource_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_update_applies_delete() {
        let transport = MockTransport::new();
        transport
            .add_vm("pve1", 101, VmConfig::new().with("net1", "bridge=vmbr1").with("cores", "2"))
            .unwrap();

        transport
            .update_vm_config(
                "pve1",
                101,
                &[
                    VmOption::new(VmOptionKey::Delete, "net1"),
                    VmOption::new(VmOptionKey::Cores, "4"),
                ],
            )
            .await
            .unwrap();

        let config = transport.config_of(101).unwrap();
        assert_eq!(config.get("net1"), None);
        assert_eq!(config.get("cores"), Some("4"));
        assert_eq!(transport.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_switch() {
        let transport = MockTransport::new();
        transport.set_fail_mutations(true);

        assert!(matches!(
            transport.create_vm("pve1", 100, &[]).await,
            Err(ClientError::Transport(_))
        ));
        assert!(transport.config_of(100).is_none());

        transport.set_fail_listings(true);
        assert!(matches!(
            transport.cluster_resources(ResourceKind::Node).await,
            Err(ClientError::Transport(_))
        ));
    }
}
