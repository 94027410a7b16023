//! Session client on top of a [`ClusterTransport`].
//!
//! [`ApiClient`] owns the resource listing cache and the VMID reservations for
//! one session. Every lookup goes through the cached listing; every mutation
//! invalidates the `vm` listing once the platform call returns.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::cache::ResourceCache;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::options::{changed_options, instance_options, parse_options, InstanceSpec, VmOption, VmOptionKey};
use crate::reservations::VmidReservations;
use crate::traits::ClusterTransport;
use crate::types::*;

/// Highest VMID the platform accepts.
pub const MAX_VMID: u32 = 999_999_999;

/// Cached session against one cluster.
pub struct ApiClient {
    transport: Arc<dyn ClusterTransport>,
    resources: ResourceCache<ResourceList>,
    reservations: VmidReservations,
    vmid_start: u32,
}

impl ApiClient {
    /// Create a client with the default configuration.
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self::with_config(transport, &ClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn ClusterTransport>, config: &ClientConfig) -> Self {
        Self::with_clock(transport, config, Arc::new(SystemClock))
    }

    /// Create a client whose caches read time from `clock`.
    pub fn with_clock(
        transport: Arc<dyn ClusterTransport>,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            resources: ResourceCache::with_clock(config.cache.default_ttl(), Arc::clone(&clock)),
            reservations: VmidReservations::with_clock(config.cache.vmid_reservation_ttl(), clock),
            vmid_start: config.vmid.start,
        }
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    pub fn resource_cache(&self) -> &ResourceCache<ResourceList> {
        &self.resources
    }

    pub fn reservations(&self) -> &VmidReservations {
        &self.reservations
    }

    /// Start a task that drops expired listings and reservations every
    /// `interval`. The task ends once the client is dropped.
    pub fn start_background_purge(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval.max(Duration::from_millis(1)));

            loop {
                timer.tick().await;
                let Some(client) = weak.upgrade() else {
                    debug!("Client dropped, stopping background purge");
                    break;
                };
                let listings = client.resources.purge_expired();
                let vmids = client.reservations.purge_expired();
                trace!(listings, vmids, "Background purge completed");
            }
        })
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Cached listing of `kind`.
    pub async fn resources(&self, kind: ResourceKind) -> Result<Arc<ResourceList>> {
        let transport = &self.transport;
        self.resources
            .get(kind, move || async move {
                debug!(kind = %kind, "Fetching cluster resources");
                transport.cluster_resources(kind).await
            })
            .await
    }

    /// First VM (templates excluded) matching `filter`.
    pub async fn find_vm_by_filter<F>(&self, filter: F) -> Result<ClusterResource>
    where
        F: Fn(&ClusterResource) -> bool,
    {
        let vms = self.resources(ResourceKind::Vm).await?;

        vms.iter()
            .filter(|vm| !vm.is_template())
            .find(|vm| filter(vm))
            .cloned()
            .ok_or_else(|| ClientError::VmNotFound("no VM matches filter".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn find_vm_by_id(&self, vmid: u32) -> Result<ClusterResource> {
        self.find_vm_by_filter(|vm| vm.vmid == Some(vmid))
            .await
            .map_err(|e| match e {
                ClientError::VmNotFound(_) => ClientError::VmNotFound(vmid.to_string()),
                other => other,
            })
    }

    #[instrument(skip(self))]
    pub async fn find_vm_by_name(&self, name: &str) -> Result<ClusterResource> {
        self.find_vm_by_filter(|vm| vm.name == name)
            .await
            .map_err(|e| match e {
                ClientError::VmNotFound(_) => ClientError::VmNotFound(name.to_string()),
                other => other,
            })
    }

    /// Template called `name` on `node`.
    #[instrument(skip(self))]
    pub async fn find_vm_template_by_name(&self, node: &str, name: &str) -> Result<ClusterResource> {
        let vms = self.resources(ResourceKind::Vm).await?;

        vms.iter()
            .find(|vm| vm.is_template() && vm.node == node && vm.name == name)
            .cloned()
            .ok_or_else(|| ClientError::TemplateNotFound(format!("{}/{}", node, name)))
    }

    /// Node rows matching `filter`.
    pub async fn nodes_by_filter<F>(&self, filter: F) -> Result<Vec<ClusterResource>>
    where
        F: Fn(&ClusterResource) -> bool,
    {
        let nodes = self.resources(ResourceKind::Node).await?;
        Ok(nodes.iter().filter(|node| filter(node)).cloned().collect())
    }

    /// Names of every node in the cluster.
    pub async fn node_names(&self) -> Result<Vec<String>> {
        let nodes = self.resources(ResourceKind::Node).await?;
        Ok(nodes
            .iter()
            .filter(|node| !node.node.is_empty())
            .map(|node| node.node.clone())
            .collect())
    }

    /// Storage row for `storage`.
    #[instrument(skip(self))]
    pub async fn cluster_storage(&self, storage: &str) -> Result<ClusterResource> {
        let rows = self.resources(ResourceKind::Storage).await?;

        rows.iter()
            .find(|row| row.storage == storage)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("storage {}", storage)))
    }

    /// Node where `storage` is available.
    #[instrument(skip(self))]
    pub async fn node_for_storage(&self, storage: &str) -> Result<String> {
        let rows = self.resources(ResourceKind::Storage).await?;

        rows.iter()
            .find(|row| row.storage == storage && row.status == "available")
            .map(|row| row.node.clone())
            .ok_or_else(|| ClientError::NotFound(format!("available storage {}", storage)))
    }

    /// Configuration of `vmid`, wherever it runs.
    #[instrument(skip(self))]
    pub async fn vm_config(&self, vmid: u32) -> Result<VmConfig> {
        let vm = self.find_vm_by_id(vmid).await?;
        self.transport.vm_config(&vm.node, vmid).await
    }

    // =========================================================================
    // VMID allocation
    // =========================================================================

    /// Next free VMID at or above `start`.
    ///
    /// Each candidate is reserved before the platform is asked about it, so
    /// concurrent callers never get the same ID. IDs reserved by this session
    /// are skipped without a platform call. The returned ID stays reserved
    /// until it expires or [`create_vm`](Self::create_vm) settles.
    #[instrument(skip(self))]
    pub async fn next_id(&self, start: u32) -> Result<u32> {
        self.reservations.purge_expired();

        let mut vmid = start.max(1);
        while vmid <= MAX_VMID {
            if !self.reservations.try_claim(vmid) {
                debug!(vmid, "VMID reserved by this session, skipping");
                vmid += 1;
                continue;
            }

            match self.transport.next_id(vmid).await {
                Ok(id) if id == vmid => {
                    debug!(vmid, "Reserved VMID");
                    return Ok(vmid);
                }
                Ok(id) => {
                    self.reservations.release(vmid);
                    if id <= MAX_VMID && self.reservations.try_claim(id) {
                        debug!(requested = vmid, vmid = id, "Reserved VMID");
                        return Ok(id);
                    }
                    debug!(vmid = id, "Platform offered an unusable VMID, moving on");
                    vmid = id.saturating_add(1).max(vmid + 1);
                }
                Err(ClientError::IdUnavailable(_)) => {
                    self.reservations.release(vmid);
                    debug!(vmid, "VMID in use, trying next");
                    vmid += 1;
                }
                Err(e) => {
                    self.reservations.release(vmid);
                    return Err(e);
                }
            }
        }

        Err(ClientError::IdSpaceExhausted(start))
    }

    /// Next free VMID from the configured start.
    pub async fn allocate_id(&self) -> Result<u32> {
        self.next_id(self.vmid_start).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a VM and drop the reservation on `vmid` either way: on success
    /// the platform itself now reports the ID as used, on failure it is free
    /// again.
    #[instrument(skip(self, options), fields(option_count = options.len()))]
    pub async fn create_vm(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()> {
        info!("Creating VM");

        let result = self.transport.create_vm(node, vmid, options).await;
        self.resources.invalidate(ResourceKind::Vm);
        self.reservations.release(vmid);

        if let Err(e) = result {
            warn!(error = %e, "VM creation failed, VMID released");
            return Err(e);
        }

        info!("VM created");
        Ok(())
    }

    /// Bring `vmid` to the `desired` option values.
    ///
    /// Keys are checked against the option allow-list. Only changed values
    /// are sent, and a `delete` entry is narrowed to keys currently set.
    /// Returns whether anything was sent.
    #[instrument(skip(self, desired))]
    pub async fn update_vm<I, K, V>(&self, node: &str, vmid: u32, desired: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let desired = parse_options(desired)?;
        let current = self.transport.vm_config(node, vmid).await?;

        let changes = changed_options(&current, &desired)?;
        if changes.is_empty() {
            debug!("VM config already up to date");
            return Ok(false);
        }

        self.apply(node, vmid, &changes).await?;
        Ok(true)
    }

    /// Size and label a freshly cloned VM after `spec`.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn configure_instance(&self, node: &str, vmid: u32, spec: &InstanceSpec) -> Result<()> {
        let current = self.transport.vm_config(node, vmid).await?;
        let options = instance_options(vmid, &current, spec)?;

        self.apply(node, vmid, &options).await
    }

    /// Stop and delete a VM. The freed VMID stays reserved for a while so it
    /// is not handed out again straight away.
    #[instrument(skip(self))]
    pub async fn delete_vm(&self, node: &str, vmid: u32) -> Result<()> {
        info!("Deleting VM");

        let result = self.transport.delete_vm(node, vmid).await;
        self.resources.invalidate(ResourceKind::Vm);
        result?;

        self.reservations.claim(vmid);
        info!("VM deleted");
        Ok(())
    }

    /// Migrate `vmid` to `target`.
    #[instrument(skip(self))]
    pub async fn migrate_vm(&self, vmid: u32, target: &str, online: bool) -> Result<()> {
        let vm = self.find_vm_by_id(vmid).await?;
        if vm.node == target {
            debug!("VM already on target node");
            return Ok(());
        }

        info!(from = %vm.node, "Migrating VM");
        let result = self.transport.migrate_vm(&vm.node, vmid, target, online).await;
        self.resources.invalidate(ResourceKind::Vm);
        result
    }

    /// Attach an existing volume `disk` to slot `device` (e.g., "scsi1").
    #[instrument(skip(self))]
    pub async fn attach_disk(&self, vmid: u32, device: &str, disk: &str) -> Result<()> {
        let slot = disk_slot(device)?;
        let vm = self.find_vm_by_id(vmid).await?;

        self.apply(&vm.node, vmid, &[VmOption::new(slot, disk)]).await
    }

    /// Detach whatever occupies slot `device`.
    #[instrument(skip(self))]
    pub async fn detach_disk(&self, vmid: u32, device: &str) -> Result<()> {
        let slot = disk_slot(device)?;
        let vm = self.find_vm_by_id(vmid).await?;

        self.apply(&vm.node, vmid, &[VmOption::new(VmOptionKey::Delete, slot.to_string())])
            .await
    }

    async fn apply(&self, node: &str, vmid: u32, options: &[VmOption]) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }

        debug!(vmid, option_count = options.len(), "Applying VM options");
        let result = self.transport.update_vm_config(node, vmid, options).await;
        self.resources.invalidate(ResourceKind::Vm);
        result
    }
}

fn disk_slot(device: &str) -> Result<VmOptionKey> {
    let key: VmOptionKey = device.parse()?;
    if !key.is_disk_slot() {
        return Err(ClientError::UnknownOption(device.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockTransport;
    use std::time::Duration;

    fn client() -> (ApiClient, Arc<MockTransport>, Arc<ManualClock>) {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new());
        let client = ApiClient::with_clock(transport.clone(), &ClientConfig::default(), clock.clone());
        (client, transport, clock)
    }

    #[tokio::test]
    async fn test_lookups_share_cached_listing() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new().with("name", "web-1")).unwrap();
        transport.add_template("pve1", 9000, "ubuntu").unwrap();

        assert_eq!(client.find_vm_by_id(100).await.unwrap().name, "web-1");
        assert_eq!(client.find_vm_by_name("web-1").await.unwrap().vmid, Some(100));
        assert_eq!(
            client.find_vm_template_by_name("pve1", "ubuntu").await.unwrap().vmid,
            Some(9000)
        );
        assert_eq!(transport.resource_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookups_respect_template_flag() {
        let (client, transport, _clock) = client();
        transport.add_template("pve1", 9000, "ubuntu").unwrap();

        assert!(matches!(
            client.find_vm_by_name("ubuntu").await,
            Err(ClientError::VmNotFound(_))
        ));
        assert!(matches!(
            client.find_vm_template_by_name("pve2", "ubuntu").await,
            Err(ClientError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_surfaces_listing_failure() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new().with("name", "web-1")).unwrap();
        transport.set_fail_listings(true);

        assert!(matches!(client.find_vm_by_id(100).await, Err(ClientError::Transport(_))));
        assert!(matches!(
            client.find_vm_by_name("web-1").await,
            Err(ClientError::Transport(_))
        ));
        assert!(matches!(client.vm_config(100).await, Err(ClientError::Transport(_))));
        assert!(client.resource_cache().is_empty());

        transport.set_fail_listings(false);
        assert_eq!(client.find_vm_by_id(100).await.unwrap().name, "web-1");
        assert!(matches!(client.find_vm_by_id(101).await, Err(ClientError::VmNotFound(ref id)) if id == "101"));
    }

    #[tokio::test]
    async fn test_vm_listing_expires_after_ttl() {
        let (client, transport, clock) = client();

        client.resources(ResourceKind::Vm).await.unwrap();
        clock.advance(Duration::from_secs(5));
        client.resources(ResourceKind::Vm).await.unwrap();

        assert_eq!(transport.resource_calls(), 2);
    }

    #[tokio::test]
    async fn test_storage_lookups() {
        let (client, transport, _clock) = client();
        transport.add_storage("pve1", "local-lvm", "unavailable").unwrap();
        transport.add_storage("pve2", "local-lvm", "available").unwrap();

        assert_eq!(client.cluster_storage("local-lvm").await.unwrap().node, "pve1");
        assert_eq!(client.node_for_storage("local-lvm").await.unwrap(), "pve2");
        assert!(matches!(
            client.node_for_storage("ceph").await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_next_id_skips_used_and_reserved() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new()).unwrap();
        transport.mark_id_taken(101).unwrap();

        assert_eq!(client.next_id(100).await.unwrap(), 102);
        assert_eq!(client.next_id(100).await.unwrap(), 103);
        assert!(client.reservations().is_claimed(102));
    }

    #[tokio::test]
    async fn test_concurrent_next_id_hands_out_distinct_ids() {
        let (client, transport, _clock) = client();

        let (first, second) = tokio::join!(client.next_id(100), client.next_id(100));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first, second);
        assert!(client.reservations().is_claimed(first));
        assert!(client.reservations().is_claimed(second));
        assert_eq!(transport.next_id_calls(), 2);
    }

    #[tokio::test]
    async fn test_next_id_failure_releases_candidate() {
        let (client, transport, _clock) = client();
        transport.set_fail_next_id(true);

        assert!(matches!(client.next_id(100).await, Err(ClientError::Transport(_))));
        assert!(client.reservations().is_empty());

        transport.set_fail_next_id(false);
        assert_eq!(client.next_id(100).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_next_id_reuses_after_reservation_expires() {
        let (client, _transport, clock) = client();

        assert_eq!(client.next_id(200).await.unwrap(), 200);
        clock.advance(Duration::from_secs(300));
        assert_eq!(client.next_id(200).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_next_id_bounded_by_max_vmid() {
        let (client, transport, _clock) = client();
        transport.mark_id_taken(MAX_VMID).unwrap();

        assert!(matches!(
            client.next_id(MAX_VMID).await,
            Err(ClientError::IdSpaceExhausted(MAX_VMID))
        ));
    }

    #[tokio::test]
    async fn test_create_failure_releases_id() {
        let (client, transport, _clock) = client();
        let vmid = client.allocate_id().await.unwrap();
        assert_eq!(vmid, 100);

        transport.set_fail_mutations(true);
        assert!(client.create_vm("pve1", vmid, &[]).await.is_err());
        assert!(!client.reservations().is_claimed(vmid));
    }

    #[tokio::test]
    async fn test_create_success_releases_id() {
        let (client, transport, _clock) = client();
        let vmid = client.allocate_id().await.unwrap();

        client.create_vm("pve1", vmid, &[]).await.unwrap();

        assert!(!client.reservations().is_claimed(vmid));
        assert!(client.reservations().is_empty());
        assert_eq!(client.next_id(vmid).await.unwrap(), vmid + 1);
        assert_eq!(transport.node_of(vmid).as_deref(), Some("pve1"));
    }

    #[tokio::test]
    async fn test_create_invalidates_vm_listing() {
        let (client, _transport, _clock) = client();

        assert!(client.resources(ResourceKind::Vm).await.unwrap().is_empty());
        client
            .create_vm("pve1", 100, &[VmOption::new(VmOptionKey::Name, "web-1")])
            .await
            .unwrap();

        assert_eq!(client.find_vm_by_name("web-1").await.unwrap().vmid, Some(100));
    }

    #[tokio::test]
    async fn test_update_sends_only_changes() {
        let (client, transport, _clock) = client();
        transport
            .add_vm("pve1", 100, VmConfig::new().with("memory", "2048").with("cores", "2"))
            .unwrap();

        let changed = client
            .update_vm("pve1", 100, [("memory", "2048"), ("cores", "4")])
            .await
            .unwrap();
        assert!(changed);

        let changed = client
            .update_vm("pve1", 100, [("memory", "2048"), ("cores", "4")])
            .await
            .unwrap();
        assert!(!changed);

        let updates = transport.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, vec![VmOption::new(VmOptionKey::Cores, "4")]);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_option() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new()).unwrap();

        let err = client.update_vm("pve1", 100, [("memroy", "4096")]).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownOption(ref k) if k == "memroy"));
        assert!(transport.updates().is_empty());
        assert_eq!(transport.config_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_reserves_freed_id() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new()).unwrap();

        client.delete_vm("pve1", 100).await.unwrap();

        assert!(client.reservations().is_claimed(100));
        assert_eq!(client.next_id(100).await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_migrate_moves_vm() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new()).unwrap();

        client.migrate_vm(100, "pve2", true).await.unwrap();

        assert_eq!(transport.node_of(100).as_deref(), Some("pve2"));
        assert_eq!(client.find_vm_by_id(100).await.unwrap().node, "pve2");
    }

    #[tokio::test]
    async fn test_attach_and_detach_disk() {
        let (client, transport, _clock) = client();
        transport.add_vm("pve1", 100, VmConfig::new()).unwrap();

        client.attach_disk(100, "scsi1", "local-lvm:vm-100-disk-1").await.unwrap();
        assert_eq!(
            transport.config_of(100).unwrap().get("scsi1"),
            Some("local-lvm:vm-100-disk-1")
        );

        client.detach_disk(100, "scsi1").await.unwrap();
        assert_eq!(transport.config_of(100).unwrap().get("scsi1"), None);

        assert!(matches!(
            client.attach_disk(100, "net0", "local-lvm:x").await,
            Err(ClientError::UnknownOption(_))
        ));
    }

    #[tokio::test]
    async fn test_background_purge_drops_expired_state() {
        let (client, _transport, clock) = client();
        let client = Arc::new(client);

        client.resources(ResourceKind::Vm).await.unwrap();
        client.reservations().claim(100);
        clock.advance(Duration::from_secs(300));

        let handle = client.start_background_purge(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(client.resource_cache().is_empty());
        assert!(client.reservations().is_empty());

        drop(client);
        assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_configure_instance() {
        let (client, transport, _clock) = client();
        transport
            .add_vm("pve1", 100, VmConfig::new().with("net0", "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0"))
            .unwrap();

        let spec = InstanceSpec {
            name: "web-1".to_string(),
            cpu: 2,
            memory: 4096,
            instance_type: "small".to_string(),
            ..Default::default()
        };
        client.configure_instance("pve1", 100, &spec).await.unwrap();

        let config = transport.config_of(100).unwrap();
        assert_eq!(config.get("cores"), Some("2"));
        assert_eq!(config.get("memory"), Some("4096"));
        assert_eq!(config.network_devices().unwrap()[0].1.queues, Some(2));
        assert_eq!(crate::options::vm_sku(&config).unwrap(), "small");
    }
}
