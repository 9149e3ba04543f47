//! Threshold-based scaling.

use std::collections::HashMap;

use crate::scaler::infrastructure::{ScalingPolicy, VirtualInfrastructure};
use crate::scaler::policies::fatal;

/// A VM below this hourly utilization is expendable.
pub const MIN_UTILIZATION: f64 = 0.2;
/// A pool whose mean hourly utilization exceeds this needs another VM.
pub const MAX_UTILIZATION: f64 = 0.75;
/// Consecutive idle control ticks a singleton pool survives, roughly one
/// hour at the two-minute cadence.
pub const IDLE_TICK_LIMIT: u32 = 30;

/// Destroys under-utilised VMs and grows pools whose average utilization is
/// too high. The last VM of a kind gets an hour of grace before the kind is
/// dropped altogether.
pub struct ThresholdPolicy {
    /// Consecutive ticks each singleton VM has been seen with no work.
    unnecessary_hits: HashMap<u32, u32>,
}

impl ThresholdPolicy {
    pub fn new() -> Self {
        Self {
            unnecessary_hits: HashMap::new(),
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalingPolicy for ThresholdPolicy {
    fn tick(&mut self, infra: &mut VirtualInfrastructure) {
        for kind in infra.kinds() {
            let pool = infra.pool(&kind).cloned().unwrap_or_default();
            if pool.is_empty() {
                // freshly registered kind, give it its first VM
                fatal(infra.request_vm(&kind));
                continue;
            }
            if pool.len() == 1 {
                let only_machine = pool[0];
                if infra.vm_is_idle(only_machine) {
                    let hits = self.unnecessary_hits.entry(only_machine).or_insert(0);
                    *hits += 1;
                    if *hits >= IDLE_TICK_LIMIT && !infra.is_under_prep(only_machine) {
                        self.unnecessary_hits.remove(&only_machine);
                        fatal(infra.destroy_vm(only_machine));
                        infra.drop_kind(&kind);
                    }
                    // no growth check, the sole VM has nothing to do
                    continue;
                }
                self.unnecessary_hits.remove(&only_machine);
            } else {
                let mut destroyed = false;
                for &vm_id in pool.iter() {
                    if infra.vm_is_idle(vm_id)
                        && !infra.is_under_prep(vm_id)
                        && infra.hourly_utilization(vm_id) < MIN_UTILIZATION
                    {
                        fatal(infra.destroy_vm(vm_id));
                        destroyed = true;
                    }
                }
                if destroyed {
                    // the pool just shrank, leave the average for the next tick
                    continue;
                }
            }
            let pool = infra.pool(&kind).cloned().unwrap_or_default();
            let mean_utilization =
                pool.iter().map(|&vm| infra.hourly_utilization(vm)).sum::<f64>() / pool.len() as f64;
            if mean_utilization > MAX_UTILIZATION {
                fatal(infra.request_vm(&kind));
            }
        }
    }
}
