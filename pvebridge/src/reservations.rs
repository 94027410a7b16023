//! VMIDs handed out by this process but maybe not yet visible to the cluster.
//!
//! `/cluster/nextid` only knows about VMs that already exist. Two clones
//! started back to back would otherwise get the same ID, so every ID returned
//! by the client is parked here until it expires or gets released. The client
//! releases it once the create call settles, successful or not, and claims it
//! again after a delete so a freed ID is not reused straight away.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{expiry_after, is_live, Clock, SystemClock};

/// How long a claimed VMID stays reserved.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Short-lived set of claimed VMIDs.
pub struct VmidReservations {
    /// `None` never expires
    claimed: DashMap<u32, Option<Instant>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl VmidReservations {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_RESERVATION_TTL, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            claimed: DashMap::new(),
            ttl,
            clock,
        }
    }

    fn expiry(&self) -> Option<Instant> {
        expiry_after(self.clock.now(), self.ttl)
    }

    /// Reserve `vmid`, refreshing the expiry if it is already held.
    pub fn claim(&self, vmid: u32) {
        self.claimed.insert(vmid, self.expiry());
    }

    /// Reserve `vmid` only if nobody holds a live reservation on it.
    ///
    /// The check and the insert happen under one shard lock, so of two
    /// concurrent callers at most one gets `true`.
    pub fn try_claim(&self, vmid: u32) -> bool {
        let now = self.clock.now();
        let expires_at = self.expiry();

        match self.claimed.entry(vmid) {
            Entry::Occupied(mut held) => {
                if is_live(*held.get(), now) {
                    return false;
                }
                held.insert(expires_at);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    /// Whether `vmid` is reserved and not yet expired.
    pub fn is_claimed(&self, vmid: u32) -> bool {
        let now = self.clock.now();
        self.claimed
            .get(&vmid)
            .is_some_and(|expires_at| is_live(*expires_at, now))
    }

    /// Drop the reservation for `vmid`. Returns whether one was held.
    pub fn release(&self, vmid: u32) -> bool {
        self.claimed.remove(&vmid).is_some()
    }

    /// Drop expired reservations. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.claimed.len();
        self.claimed.retain(|_, expires_at| is_live(*expires_at, now));
        before.saturating_sub(self.claimed.len())
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

impl Default for VmidReservations {
    fn default() -> Self {
        Self::new()
    }
}
