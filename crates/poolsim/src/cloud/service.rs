//! The cloud service component: VM requests, placement, lifecycle events,
//! compute tasks and state-change subscriptions.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use poolsim_core::{log_debug, log_trace, on_event};
use poolsim_core::{Event, EventHandler, EventId, Id, SimulationContext};

use crate::cloud::machine::PhysicalMachine;
use crate::cloud::repository::Repository;
use crate::cloud::vm::{ComputeTask, VirtualMachine, VmState};
use crate::config::SimulationConfig;
use crate::error::ScalingError;
use crate::events::task::{TaskCancelled, TaskCompleted, TaskFinished, TaskStarted};
use crate::events::vm::{PlaceVm, VmBootCompleted, VmStateChanged, VmTransferCompleted};

/// The simulated IaaS cloud.
///
/// Owns the machines, the image repository and every VM. Placement is
/// first-fit across machines in registration order; requests that do not
/// fit right now wait in a queue replayed whenever resources are released,
/// and requests no machine could ever satisfy become nonservable.
pub struct CloudService {
    machines: Vec<PhysicalMachine>,
    repository: Repository,
    vms: HashMap<u32, VirtualMachine>,
    waiting_placement: VecDeque<u32>,
    subscriptions: HashMap<u32, Vec<Id>>,
    phase_events: HashMap<u32, EventId>,
    vm_counter: u32,
    task_counter: u64,
    config: Rc<SimulationConfig>,
    ctx: SimulationContext,
}

impl CloudService {
    pub fn new(config: Rc<SimulationConfig>, ctx: SimulationContext) -> Self {
        let repository = Repository::new(config.repository_capacity, config.repository_bandwidth);
        Self {
            machines: Vec::new(),
            repository,
            vms: HashMap::new(),
            waiting_placement: VecDeque::new(),
            subscriptions: HashMap::new(),
            phase_events: HashMap::new(),
            vm_counter: 0,
            task_counter: 0,
            config,
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Registers one machine with the given core count; memory, processing
    /// power and the power band come from the configuration.
    pub fn add_machine(&mut self, cores: u32) -> usize {
        self.machines.push(PhysicalMachine::new(
            cores,
            self.config.machine_memory,
            self.config.per_core_power,
            self.config.machine_idle_power,
            self.config.machine_peak_power,
            self.ctx.time(),
        ));
        self.machines.len() - 1
    }

    pub fn machines(&self) -> &[PhysicalMachine] {
        &self.machines
    }

    /// Capacity of the first machine: `(cores, memory, per_core_power)`.
    /// VM sizing is derived from it.
    pub fn first_machine_capacity(&self) -> Option<(u32, u64, f64)> {
        self.machines.first().map(|m| (m.cores(), m.memory(), m.per_core_power()))
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut self.repository
    }

    // VM observables //////////////////////////////////////////////////////

    fn vm(&self, vm_id: u32) -> &VirtualMachine {
        self.vms.get(&vm_id).unwrap_or_else(|| panic!("unknown vm #{}", vm_id))
    }

    fn vm_mut(&mut self, vm_id: u32) -> &mut VirtualMachine {
        self.vms.get_mut(&vm_id).unwrap_or_else(|| panic!("unknown vm #{}", vm_id))
    }

    pub fn vm_state(&self, vm_id: u32) -> VmState {
        self.vm(vm_id).state()
    }

    pub fn vm_is_idle(&self, vm_id: u32) -> bool {
        self.vm(vm_id).is_idle()
    }

    pub fn vm_appliance(&self, vm_id: u32) -> String {
        self.vm(vm_id).appliance.clone()
    }

    pub fn per_tick_processing_power(&self, vm_id: u32) -> f64 {
        self.vm(vm_id).per_tick_processing_power()
    }

    /// Cumulative processed work of the VM, accrued up to now.
    pub fn total_processed(&mut self, vm_id: u32) -> f64 {
        self.advance_vm(vm_id);
        self.vm(vm_id).total_processed()
    }

    // VM lifecycle ////////////////////////////////////////////////////////

    /// Requests `count` VMs instantiated from the named appliance with the
    /// given resources. Placement happens asynchronously; the returned VMs
    /// stay in the `Destroyed` state until placed.
    pub fn request_vms(&mut self, appliance: &str, cores: u32, memory: u64, count: u32) -> Result<Vec<u32>, ScalingError> {
        if self.repository.lookup(appliance).is_none() {
            return Err(ScalingError::VmManagement(format!(
                "appliance {} is not registered in the repository",
                appliance
            )));
        }
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let vm_id = self.vm_counter;
            self.vm_counter += 1;
            self.vms.insert(
                vm_id,
                VirtualMachine::new(vm_id, appliance, cores, memory, self.config.per_core_power),
            );
            self.ctx.emit_self_now(PlaceVm { vm_id });
            log_debug!(self.ctx, "vm #{} requested for appliance {}", vm_id, appliance);
            ids.push(vm_id);
        }
        Ok(ids)
    }

    /// Destroys a live (placed or booting) VM, releasing its resources and
    /// cancelling its tasks. Fails on a VM that is already destroyed; those
    /// take the [`terminate_vm`](Self::terminate_vm) path.
    pub fn destroy_vm(&mut self, vm_id: u32, _force: bool) -> Result<(), ScalingError> {
        let now = self.ctx.time();
        let vm = self
            .vms
            .get_mut(&vm_id)
            .ok_or_else(|| ScalingError::VmManagement(format!("destroy of unknown vm #{}", vm_id)))?;
        if vm.state() == VmState::Destroyed {
            return Err(ScalingError::VmManagement(format!(
                "destroy of vm #{} which is not alive",
                vm_id
            )));
        }
        self.advance_vm(vm_id);
        if let Some(event_id) = self.phase_events.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        let (cores, memory, host) = {
            let vm = self.vm(vm_id);
            (vm.cores(), vm.memory(), vm.host())
        };
        let tasks = self.vm_mut(vm_id).drain_tasks();
        for task in tasks {
            if let Some(event_id) = task.completion_event {
                self.ctx.cancel_event(event_id);
            }
            self.ctx.emit_now(
                TaskCancelled {
                    vm_id,
                    task_id: task.id,
                },
                task.listener,
            );
        }
        if let Some(host) = host {
            self.machines[host].release(now, cores, memory);
            self.vm_mut(vm_id).set_host(None);
        }
        self.set_vm_state(vm_id, VmState::Destroyed);
        self.subscriptions.remove(&vm_id);
        log_debug!(self.ctx, "vm #{} destroyed", vm_id);
        self.place_waiting_vms();
        Ok(())
    }

    /// Removes a VM that never reached a machine (still queued for
    /// placement or freshly requested). Fails on a live VM.
    pub fn terminate_vm(&mut self, vm_id: u32, _force: bool) -> Result<(), ScalingError> {
        let vm = self
            .vms
            .get(&vm_id)
            .ok_or_else(|| ScalingError::VmManagement(format!("terminate of unknown vm #{}", vm_id)))?;
        if vm.state() != VmState::Destroyed {
            return Err(ScalingError::VmManagement(format!(
                "terminate of vm #{} which is hosted (state {})",
                vm_id,
                vm.state()
            )));
        }
        self.waiting_placement.retain(|&id| id != vm_id);
        self.subscriptions.remove(&vm_id);
        self.vms.remove(&vm_id);
        log_debug!(self.ctx, "queued vm #{} terminated", vm_id);
        Ok(())
    }

    // state-change subscriptions //////////////////////////////////////////

    /// Subscribes a component to every state transition of the VM.
    /// Subscribing twice is a no-op.
    pub fn subscribe_state_change(&mut self, vm_id: u32, listener: Id) {
        let listeners = self.subscriptions.entry(vm_id).or_default();
        if !listeners.contains(&listener) {
            listeners.push(listener);
        }
    }

    /// Removes a state-change subscription; unknown subscriptions are
    /// ignored.
    pub fn unsubscribe_state_change(&mut self, vm_id: u32, listener: Id) {
        if let Some(listeners) = self.subscriptions.get_mut(&vm_id) {
            listeners.retain(|&l| l != listener);
        }
    }

    fn set_vm_state(&mut self, vm_id: u32, new_state: VmState) {
        let old_state = self.vm(vm_id).state();
        self.vm_mut(vm_id).set_state(new_state);
        let listeners = self.subscriptions.get(&vm_id).cloned().unwrap_or_default();
        for listener in listeners {
            self.ctx.emit_now(
                VmStateChanged {
                    vm_id,
                    old_state,
                    new_state,
                },
                listener,
            );
        }
    }

    // compute tasks ///////////////////////////////////////////////////////

    /// Enqueues a compute task of `work` units on a running VM. The task
    /// starts processing at the current instant; `listener` receives a
    /// `TaskCompleted` (or `TaskCancelled`) event.
    pub fn new_compute_task(&mut self, vm_id: u32, work: f64, listener: Id) -> Result<u64, ScalingError> {
        let vm = self
            .vms
            .get_mut(&vm_id)
            .ok_or_else(|| ScalingError::VmManagement(format!("task submitted to unknown vm #{}", vm_id)))?;
        if vm.state() != VmState::Running {
            return Err(ScalingError::VmManagement(format!(
                "task submitted to vm #{} in state {}",
                vm_id,
                vm.state()
            )));
        }
        let task_id = self.task_counter;
        self.task_counter += 1;
        vm.add_pending_task(ComputeTask {
            id: task_id,
            remaining: work,
            listener,
            completion_event: None,
        });
        self.ctx.emit_self_now(TaskStarted { vm_id });
        log_trace!(self.ctx, "task #{} ({} units) accepted on vm #{}", task_id, work, vm_id);
        Ok(task_id)
    }

    fn advance_vm(&mut self, vm_id: u32) {
        let now = self.ctx.time();
        let host = self.vm(vm_id).host();
        let processed = self.vm_mut(vm_id).advance(now);
        if processed > 0. {
            if let Some(host) = host {
                self.machines[host].record_processed(processed);
            }
        }
    }

    /// Re-derives the completion schedule of a VM after its running set
    /// changed: every pending completion is cancelled and re-emitted for
    /// the new equal power share.
    fn reschedule_completions(&mut self, vm_id: u32) {
        let power = self.vm(vm_id).per_tick_processing_power();
        let count = self.vm(vm_id).running_tasks().len();
        if count == 0 {
            return;
        }
        let share = power / count as f64;
        let ctx = self.ctx.clone();
        for task in self.vm_mut(vm_id).running_tasks_mut().iter_mut() {
            if let Some(event_id) = task.completion_event.take() {
                ctx.cancel_event(event_id);
            }
            let task_id = task.id;
            task.completion_event = Some(ctx.emit_self(TaskFinished { vm_id, task_id }, task.remaining / share));
        }
    }

    // placement ///////////////////////////////////////////////////////////

    fn try_place(&mut self, vm_id: u32) -> bool {
        let now = self.ctx.time();
        let (cores, memory) = {
            let vm = self.vm(vm_id);
            (vm.cores(), vm.memory())
        };
        let host = match self.machines.iter().position(|m| m.fits(cores, memory)) {
            Some(host) => host,
            None => return false,
        };
        self.machines[host].allocate(now, cores, memory);
        self.vm_mut(vm_id).set_host(Some(host));
        let size = match self.repository.lookup(&self.vm(vm_id).appliance) {
            Some(va) => va.size,
            None => self.config.appliance_size,
        };
        let transfer_time = size as f64 / self.repository.bandwidth();
        self.set_vm_state(vm_id, VmState::InitialTransfer);
        let event_id = self.ctx.emit_self(VmTransferCompleted { vm_id }, transfer_time);
        self.phase_events.insert(vm_id, event_id);
        log_debug!(self.ctx, "vm #{} placed on machine #{}", vm_id, host);
        true
    }

    fn place_waiting_vms(&mut self) {
        let waiting: Vec<u32> = self.waiting_placement.iter().copied().collect();
        for vm_id in waiting {
            if self.try_place(vm_id) {
                self.waiting_placement.retain(|&id| id != vm_id);
            }
        }
    }

    fn on_place_vm(&mut self, vm_id: u32) {
        // a VM terminated before its placement fired leaves no trace
        let vm = match self.vms.get(&vm_id) {
            Some(vm) => vm,
            None => return,
        };
        let (cores, memory) = (vm.cores(), vm.memory());
        if !self.machines.iter().any(|m| m.could_ever_fit(cores, memory)) {
            log_debug!(self.ctx, "vm #{} can never be placed, marking nonservable", vm_id);
            self.set_vm_state(vm_id, VmState::Nonservable);
            return;
        }
        if !self.try_place(vm_id) {
            log_trace!(self.ctx, "vm #{} queued for placement", vm_id);
            self.waiting_placement.push_back(vm_id);
        }
    }

    fn on_transfer_completed(&mut self, vm_id: u32) {
        self.phase_events.remove(&vm_id);
        let boot_time = self.config.appliance_boot_cost / self.config.per_core_power;
        self.set_vm_state(vm_id, VmState::Startup);
        let event_id = self.ctx.emit_self(VmBootCompleted { vm_id }, boot_time);
        self.phase_events.insert(vm_id, event_id);
    }

    fn on_boot_completed(&mut self, vm_id: u32) {
        self.phase_events.remove(&vm_id);
        let now = self.ctx.time();
        self.vm_mut(vm_id).reset_advance(now);
        self.set_vm_state(vm_id, VmState::Running);
        log_debug!(self.ctx, "vm #{} is running", vm_id);
    }

    fn on_task_started(&mut self, vm_id: u32) {
        if !self.vms.contains_key(&vm_id) {
            return;
        }
        self.advance_vm(vm_id);
        if self.vm_mut(vm_id).activate_pending() {
            self.reschedule_completions(vm_id);
        }
    }

    fn on_task_finished(&mut self, vm_id: u32, task_id: u64) {
        self.advance_vm(vm_id);
        let task = match self.vm_mut(vm_id).take_task(task_id) {
            Some(task) => task,
            None => return,
        };
        log_trace!(self.ctx, "task #{} finished on vm #{}", task_id, vm_id);
        self.ctx.emit_now(TaskCompleted { vm_id, task_id }, task.listener);
        self.reschedule_completions(vm_id);
    }
}

impl EventHandler for CloudService {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            PlaceVm { vm_id } => {
                self.on_place_vm(vm_id);
            }
            VmTransferCompleted { vm_id } => {
                self.on_transfer_completed(vm_id);
            }
            VmBootCompleted { vm_id } => {
                self.on_boot_completed(vm_id);
            }
            TaskStarted { vm_id } => {
                self.on_task_started(vm_id);
            }
            TaskFinished { vm_id, task_id } => {
                self.on_task_finished(vm_id, task_id);
            }
        })
    }
}
