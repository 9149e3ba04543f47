//! Virtual appliance storage.

use indexmap::IndexMap;
use serde::Serialize;

/// An immutable image record from which VMs of one executable kind are
/// instantiated. At most one appliance per kind exists in a repository.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualAppliance {
    /// Executable kind the appliance hosts; doubles as the storage key.
    pub id: String,
    /// Length of the boot procedure in work units.
    pub boot_cost: f64,
    /// Image size in bytes.
    pub size: u64,
}

impl VirtualAppliance {
    pub fn new(id: &str, boot_cost: f64, size: u64) -> Self {
        Self {
            id: id.to_owned(),
            boot_cost,
            size,
        }
    }
}

/// Byte-capacity-bounded appliance store of the cloud.
///
/// Contents keep registration order, which the eviction logic of the
/// control plane relies on for its FIFO of obsolete appliances.
pub struct Repository {
    capacity: u64,
    bandwidth: f64,
    used: u64,
    contents: IndexMap<String, VirtualAppliance>,
}

impl Repository {
    pub fn new(capacity: u64, bandwidth: f64) -> Self {
        Self {
            capacity,
            bandwidth,
            used: 0,
            contents: IndexMap::new(),
        }
    }

    /// Image transfer bandwidth in bytes per millisecond.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Registers an appliance. Returns `false` when the image would exceed
    /// the remaining capacity (or the id is already taken).
    pub fn register(&mut self, va: VirtualAppliance) -> bool {
        if self.contents.contains_key(&va.id) {
            return false;
        }
        if self.used + va.size > self.capacity {
            return false;
        }
        self.used += va.size;
        self.contents.insert(va.id.clone(), va);
        true
    }

    /// Removes an appliance, freeing its bytes.
    pub fn deregister(&mut self, id: &str) -> Option<VirtualAppliance> {
        let removed = self.contents.shift_remove(id);
        if let Some(va) = &removed {
            self.used -= va.size;
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> Option<&VirtualAppliance> {
        self.contents.get(id)
    }

    /// Ids of the stored appliances in registration order.
    pub fn contents(&self) -> Vec<String> {
        self.contents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
