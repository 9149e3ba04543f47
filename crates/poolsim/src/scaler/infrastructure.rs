//! The elastic virtual infrastructure: per-kind VM pools and the periodic
//! control loop driving them through an injected scaling policy.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use poolsim_core::{log_info, on_event, EventId};
use poolsim_core::{Event, EventHandler, SimulationContext};

use crate::cloud::repository::VirtualAppliance;
use crate::cloud::service::CloudService;
use crate::cloud::vm::VmState;
use crate::config::SimulationConfig;
use crate::error::ScalingError;
use crate::events::dispatch::AllJobsFinished;
use crate::events::scaling::ScalingTick;
use crate::events::vm::VmStateChanged;
use crate::scaler::monitor::VmMonitoring;

/// Period of the autoscaling control loop, ms.
pub const SCALING_PERIOD: f64 = 120_000.;

/// A scaling policy decides, once per control tick and per registered kind,
/// whether pools grow, shrink or get dropped.
///
/// Policies act through the infrastructure handed to them: reading pools
/// and utilization, requesting and destroying VMs, dropping kinds. They
/// must never destroy the VM a kind currently has under preparation; the
/// infrastructure itself already refuses duplicate requests for such kinds.
pub trait ScalingPolicy {
    fn tick(&mut self, infra: &mut VirtualInfrastructure);
}

/// Owns the per-kind VM pools, the under-preparation guard, the obsolete
/// appliance FIFO and the monitor wiring; runs the injected policy every
/// two simulated minutes.
pub struct VirtualInfrastructure {
    cloud: Rc<RefCell<CloudService>>,
    monitoring: Rc<RefCell<VmMonitoring>>,
    pools: IndexMap<String, Vec<u32>>,
    under_prep: HashMap<String, u32>,
    obsolete_appliances: VecDeque<String>,
    policy: Option<Box<dyn ScalingPolicy>>,
    active: bool,
    tick_event: Option<EventId>,
    machine_cores: u32,
    machine_memory: u64,
    config: Rc<SimulationConfig>,
    ctx: SimulationContext,
}

impl VirtualInfrastructure {
    /// Builds the infrastructure on a cloud that already has machines; VM
    /// sizing is derived from the first machine's capacity.
    pub fn new(
        cloud: Rc<RefCell<CloudService>>,
        monitoring: Rc<RefCell<VmMonitoring>>,
        policy: Box<dyn ScalingPolicy>,
        config: Rc<SimulationConfig>,
        ctx: SimulationContext,
    ) -> Result<Self, ScalingError> {
        let (machine_cores, machine_memory, _) = cloud
            .borrow()
            .first_machine_capacity()
            .ok_or_else(|| ScalingError::InvalidParameter("cloud has no machines".to_string()))?;
        Ok(Self {
            cloud,
            monitoring,
            pools: IndexMap::new(),
            under_prep: HashMap::new(),
            obsolete_appliances: VecDeque::new(),
            policy: Some(policy),
            active: false,
            tick_event: None,
            machine_cores,
            machine_memory,
            config,
            ctx,
        })
    }

    pub fn id(&self) -> poolsim_core::Id {
        self.ctx.id()
    }

    pub fn ctx(&self) -> &SimulationContext {
        &self.ctx
    }

    /// Declares that a kind of executable needs a VM pool. Registering an
    /// already-known kind changes nothing.
    pub fn register_kind(&mut self, kind: &str) {
        self.pools.entry(kind.to_owned()).or_default();
    }

    /// Arms the periodic control loop; the first tick fires one period from
    /// now.
    pub fn start_autoscaling(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.tick_event = Some(self.ctx.emit_self(ScalingTick {}, SCALING_PERIOD));
    }

    /// Dismantles every pool (newest VM first, so pool order stays valid
    /// during iteration) and cancels the control loop.
    pub fn terminate(&mut self) -> Result<(), ScalingError> {
        let kinds: Vec<String> = self.pools.keys().cloned().collect();
        for kind in kinds {
            while let Some(&vm_id) = self.pools.get(&kind).and_then(|pool| pool.last()) {
                self.destroy_vm(vm_id)?;
            }
        }
        self.active = false;
        if let Some(event_id) = self.tick_event.take() {
            self.ctx.cancel_event(event_id);
        }
        log_info!(self.ctx, "autoscaling mechanism terminated");
        Ok(())
    }

    // pool inspection (used by policies and tests) ////////////////////////

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }

    /// The pool of a kind, in VM request order. `None` for unknown kinds.
    pub fn pool(&self, kind: &str) -> Option<&Vec<u32>> {
        self.pools.get(kind)
    }

    /// Whether the kind currently has a VM in flight towards `Running`.
    pub fn under_prep_vm(&self, kind: &str) -> Option<u32> {
        self.under_prep.get(kind).copied()
    }

    /// Whether this particular VM is some kind's in-flight VM.
    pub fn is_under_prep(&self, vm_id: u32) -> bool {
        self.under_prep.values().any(|&id| id == vm_id)
    }

    pub fn vm_is_idle(&self, vm_id: u32) -> bool {
        self.cloud.borrow().vm_is_idle(vm_id)
    }

    pub fn vm_state(&self, vm_id: u32) -> VmState {
        self.cloud.borrow().vm_state(vm_id)
    }

    /// Hourly utilization of a pool VM. Querying a VM without a live
    /// monitor is a programming error and aborts the run.
    pub fn hourly_utilization(&self, vm_id: u32) -> f64 {
        match self.monitoring.borrow().hourly_utilization(vm_id) {
            Ok(value) => value,
            Err(e) => panic!("{}", e),
        }
    }

    /// Ids of the obsolete (eviction-candidate) appliances, oldest first.
    pub fn obsolete_appliances(&self) -> Vec<String> {
        self.obsolete_appliances.iter().cloned().collect()
    }

    /// Removes a kind from the infrastructure. The pool must already be
    /// empty; jobs of this kind arriving later need a fresh
    /// [`register_kind`](Self::register_kind).
    pub fn drop_kind(&mut self, kind: &str) {
        self.pools.shift_remove(kind);
    }

    // scaling primitives //////////////////////////////////////////////////

    /// Arranges one new VM for the kind: registers the appliance image if
    /// needed (evicting obsolete images when storage is full), sizes the VM
    /// deterministically from the kind name, asks the cloud for it, wires a
    /// monitor and records the under-preparation guard.
    ///
    /// A kind that already has a VM under preparation is left alone.
    pub fn request_vm(&mut self, kind: &str) -> Result<(), ScalingError> {
        if self.under_prep.contains_key(kind) {
            return Ok(());
        }

        {
            let mut cloud = self.cloud.borrow_mut();
            let repository = cloud.repository_mut();
            if repository.lookup(kind).is_none() {
                let va = VirtualAppliance::new(kind, self.config.appliance_boot_cost, self.config.appliance_size);
                while !repository.register(va.clone()) {
                    // out of space: evict the appliance that has been
                    // obsolete the longest
                    match self.obsolete_appliances.pop_front() {
                        Some(evicted) => {
                            repository.deregister(&evicted);
                        }
                        None => return Err(ScalingError::StorageExhausted(kind.to_owned())),
                    }
                }
            }
        }

        // deterministic per-kind VM size with 1 to 4 cores
        let cores = (kind.len() % 4) as u32 + 1;
        let memory = cores as u64 * self.machine_memory / self.machine_cores as u64;
        let vm_id = self.cloud.borrow_mut().request_vms(kind, cores, memory, 1)?[0];

        self.monitoring.borrow_mut().start(vm_id);
        let pool = self.pools.entry(kind.to_owned()).or_default();
        if pool.is_empty() {
            // the appliance is in use again
            self.obsolete_appliances.retain(|k| k != kind);
        }
        pool.push(vm_id);
        self.under_prep.insert(kind.to_owned(), vm_id);
        self.cloud.borrow_mut().subscribe_state_change(vm_id, self.ctx.id());
        Ok(())
    }

    /// Removes a VM from its pool and from the cloud, stopping its monitor.
    /// When this empties the pool, the kind's appliance becomes an eviction
    /// candidate.
    pub fn destroy_vm(&mut self, vm_id: u32) -> Result<(), ScalingError> {
        self.monitoring.borrow_mut().stop(vm_id);
        let kind = self.cloud.borrow().vm_appliance(vm_id);
        if let Some(pool) = self.pools.get_mut(&kind) {
            pool.retain(|&id| id != vm_id);
        }
        if self.under_prep.get(&kind) == Some(&vm_id) {
            self.under_prep.remove(&kind);
        }
        let state = self.cloud.borrow().vm_state(vm_id);
        if state == VmState::Destroyed {
            // the decision came before the cloud ever hosted it
            self.cloud.borrow_mut().terminate_vm(vm_id, true)?;
        } else {
            self.cloud.borrow_mut().destroy_vm(vm_id, true)?;
        }
        if self.pools.get(&kind).map_or(false, |pool| pool.is_empty())
            && !self.obsolete_appliances.contains(&kind)
        {
            self.obsolete_appliances.push_back(kind);
        }
        Ok(())
    }

    // event reactions /////////////////////////////////////////////////////

    fn on_scaling_tick(&mut self) {
        if !self.active {
            return;
        }
        if let Some(mut policy) = self.policy.take() {
            policy.tick(self);
            self.policy = Some(policy);
        }
        if self.active {
            self.tick_event = Some(self.ctx.emit_self(ScalingTick {}, SCALING_PERIOD));
        }
    }

    fn on_vm_state_changed(&mut self, vm_id: u32, new_state: VmState) {
        if new_state != VmState::Running && new_state != VmState::Nonservable {
            return;
        }
        let kind = self
            .under_prep
            .iter()
            .find(|(_, &id)| id == vm_id)
            .map(|(kind, _)| kind.clone());
        if let Some(kind) = kind {
            self.under_prep.remove(&kind);
        }
        self.cloud.borrow_mut().unsubscribe_state_change(vm_id, self.ctx.id());
    }
}

impl EventHandler for VirtualInfrastructure {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            ScalingTick {} => {
                self.on_scaling_tick();
            }
            VmStateChanged {
                vm_id,
                old_state: _,
                new_state,
            } => {
                self.on_vm_state_changed(vm_id, new_state);
            }
            AllJobsFinished {} => {
                if let Err(e) = self.terminate() {
                    panic!("{}", e);
                }
            }
        })
    }
}
