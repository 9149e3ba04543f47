//! Threshold scaling with growth prioritised over shrinking.

use std::collections::HashMap;

use crate::scaler::infrastructure::{ScalingPolicy, VirtualInfrastructure};
use crate::scaler::policies::fatal;
use crate::scaler::policies::threshold::{IDLE_TICK_LIMIT, MAX_UTILIZATION, MIN_UTILIZATION};

/// Like [`ThresholdPolicy`](crate::scaler::policies::threshold::ThresholdPolicy),
/// but a pool over the growth threshold always gets its VM first, even when
/// under-utilised VMs exist; shrinking then evicts one of the idle
/// under-utilised VMs chosen uniformly at random. Randomised eviction
/// avoids always hitting the pool head and decorrelates the choice from
/// arrival order. The draw comes from the seeded simulation-wide RNG, so
/// runs are reproducible.
pub struct VmCreationPriorityPolicy {
    unnecessary_hits: HashMap<u32, u32>,
}

impl VmCreationPriorityPolicy {
    pub fn new() -> Self {
        Self {
            unnecessary_hits: HashMap::new(),
        }
    }
}

impl Default for VmCreationPriorityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalingPolicy for VmCreationPriorityPolicy {
    fn tick(&mut self, infra: &mut VirtualInfrastructure) {
        for kind in infra.kinds() {
            let pool = infra.pool(&kind).cloned().unwrap_or_default();
            if pool.is_empty() {
                fatal(infra.request_vm(&kind));
                continue;
            }
            let mut under_utilized = Vec::new();
            let mut utilization_sum = 0.;
            for &vm_id in pool.iter() {
                let utilization = infra.hourly_utilization(vm_id);
                if utilization < MIN_UTILIZATION && infra.vm_is_idle(vm_id) && !infra.is_under_prep(vm_id) {
                    under_utilized.push(vm_id);
                }
                utilization_sum += utilization;
            }
            if utilization_sum / pool.len() as f64 > MAX_UTILIZATION {
                // growth wins regardless of how many idle VMs there are
                fatal(infra.request_vm(&kind));
            } else if pool.len() == 1 {
                let only_machine = pool[0];
                if infra.vm_is_idle(only_machine) {
                    let hits = self.unnecessary_hits.entry(only_machine).or_insert(0);
                    *hits += 1;
                    if *hits >= IDLE_TICK_LIMIT && !infra.is_under_prep(only_machine) {
                        self.unnecessary_hits.remove(&only_machine);
                        fatal(infra.destroy_vm(only_machine));
                        infra.drop_kind(&kind);
                    }
                } else {
                    self.unnecessary_hits.remove(&only_machine);
                }
            } else if !under_utilized.is_empty() {
                let victim = under_utilized[infra.ctx().gen_range(0..under_utilized.len())];
                fatal(infra.destroy_vm(victim));
            }
        }
    }
}
