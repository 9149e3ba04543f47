//! Headroom-keeping pool scaling.

use std::collections::HashMap;

use crate::scaler::infrastructure::{ScalingPolicy, VirtualInfrastructure};
use crate::scaler::policies::fatal;
use crate::scaler::policies::threshold::IDLE_TICK_LIMIT;

/// Minimum number of idle VMs each pool keeps ready for incoming jobs.
pub const POOL_HEADROOM: usize = 4;

/// Keeps every pool at least `POOL_HEADROOM` idle VMs deep so arriving jobs
/// land on a ready VM, shedding one VM at a time when the idle surplus
/// grows. A pool that sits fully idle for an hour is dismantled and its
/// kind dropped.
pub struct PoolingPolicy {
    /// Consecutive ticks each kind's pool has been seen fully idle.
    unnecessary_hits: HashMap<String, u32>,
}

impl PoolingPolicy {
    pub fn new() -> Self {
        Self {
            unnecessary_hits: HashMap::new(),
        }
    }
}

impl Default for PoolingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalingPolicy for PoolingPolicy {
    fn tick(&mut self, infra: &mut VirtualInfrastructure) {
        for kind in infra.kinds() {
            let pool = infra.pool(&kind).cloned().unwrap_or_default();
            if pool.len() < POOL_HEADROOM {
                fatal(infra.request_vm(&kind));
                continue;
            }
            let unused: Vec<u32> = pool.iter().copied().filter(|&vm| infra.vm_is_idle(vm)).collect();
            if unused.len() < POOL_HEADROOM {
                // too few ready VMs for new arrivals
                fatal(infra.request_vm(&kind));
            } else if unused.len() == pool.len() {
                if infra.under_prep_vm(&kind).is_some() {
                    // a VM is still in flight, the pool is about to change
                    continue;
                }
                let hits = self.unnecessary_hits.entry(kind.clone()).or_insert(0);
                *hits += 1;
                if *hits >= IDLE_TICK_LIMIT {
                    // an hour of disuse, the whole pool goes
                    self.unnecessary_hits.remove(&kind);
                    while let Some(&vm_id) = infra.pool(&kind).and_then(|pool| pool.last()) {
                        fatal(infra.destroy_vm(vm_id));
                    }
                    infra.drop_kind(&kind);
                }
            } else {
                self.unnecessary_hits.remove(&kind);
                if unused.len() > POOL_HEADROOM {
                    // surplus of ready VMs, shed the oldest idle one
                    if let Some(&victim) = unused.iter().find(|&&vm| !infra.is_under_prep(vm)) {
                        fatal(infra.destroy_vm(victim));
                    }
                }
            }
        }
    }
}
