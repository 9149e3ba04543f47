//! Virtual machines and their compute tasks.

use std::fmt::{Display, Formatter};

use poolsim_core::{EventId, Id};
use serde::Serialize;

/// Lifecycle state of a virtual machine.
///
/// A freshly requested VM is `Destroyed` until the cloud places it; requests
/// that no machine could ever satisfy become `Nonservable`. `Suspended` is
/// part of the cloud contract but never entered by this harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VmState {
    InitialTransfer,
    Startup,
    Running,
    Suspended,
    Nonservable,
    Destroyed,
}

impl Display for VmState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmState::InitialTransfer => write!(f, "initial-transfer"),
            VmState::Startup => write!(f, "startup"),
            VmState::Running => write!(f, "running"),
            VmState::Suspended => write!(f, "suspended"),
            VmState::Nonservable => write!(f, "nonservable"),
            VmState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// A compute task placed on a VM.
#[derive(Debug, Clone)]
pub struct ComputeTask {
    pub id: u64,
    /// Work units still to process.
    pub remaining: f64,
    /// Component notified on completion.
    pub listener: Id,
    /// Pending completion event, if scheduled.
    pub completion_event: Option<EventId>,
}

/// A virtual machine instantiated from an appliance.
///
/// Processing power is shared equally among running tasks; the cumulative
/// processed counter accrues lazily whenever the task set is advanced to
/// the current time.
pub struct VirtualMachine {
    pub id: u32,
    /// Id of the appliance (and thereby the executable kind) this VM runs.
    pub appliance: String,
    cores: u32,
    memory: u64,
    per_core_power: f64,
    state: VmState,
    host: Option<usize>,
    pending: Vec<ComputeTask>,
    running: Vec<ComputeTask>,
    total_processed: f64,
    last_advance: f64,
}

impl VirtualMachine {
    pub fn new(id: u32, appliance: &str, cores: u32, memory: u64, per_core_power: f64) -> Self {
        Self {
            id,
            appliance: appliance.to_owned(),
            cores,
            memory,
            per_core_power,
            state: VmState::Destroyed,
            host: None,
            pending: Vec::new(),
            running: Vec::new(),
            total_processed: 0.,
            last_advance: 0.,
        }
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }

    pub fn memory(&self) -> u64 {
        self.memory
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: VmState) {
        self.state = state;
    }

    pub fn host(&self) -> Option<usize> {
        self.host
    }

    pub(crate) fn set_host(&mut self, host: Option<usize>) {
        self.host = host;
    }

    /// Aggregate processing power, work units per millisecond.
    pub fn per_tick_processing_power(&self) -> f64 {
        self.cores as f64 * self.per_core_power
    }

    /// A VM with neither running nor pending tasks.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.pending.is_empty()
    }

    pub fn running_tasks(&self) -> &[ComputeTask] {
        &self.running
    }

    pub fn pending_tasks(&self) -> &[ComputeTask] {
        &self.pending
    }

    /// Cumulative work processed since creation, accrued up to the last
    /// advance.
    pub fn total_processed(&self) -> f64 {
        self.total_processed
    }

    pub(crate) fn add_pending_task(&mut self, task: ComputeTask) {
        self.pending.push(task);
    }

    /// Moves every pending task into the running set. Returns whether the
    /// running set changed.
    pub(crate) fn activate_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.running.append(&mut self.pending);
        true
    }

    pub(crate) fn take_task(&mut self, task_id: u64) -> Option<ComputeTask> {
        let pos = self.running.iter().position(|t| t.id == task_id)?;
        Some(self.running.remove(pos))
    }

    pub(crate) fn running_tasks_mut(&mut self) -> &mut Vec<ComputeTask> {
        &mut self.running
    }

    pub(crate) fn drain_tasks(&mut self) -> Vec<ComputeTask> {
        let mut tasks = std::mem::take(&mut self.running);
        tasks.append(&mut self.pending);
        tasks
    }

    pub(crate) fn reset_advance(&mut self, time: f64) {
        self.last_advance = time;
    }

    /// Accrues processing between the last advance and `time`. Returns the
    /// amount of work processed in the interval (0 while idle or not
    /// running).
    pub(crate) fn advance(&mut self, time: f64) -> f64 {
        let dt = time - self.last_advance;
        self.last_advance = time;
        if self.state != VmState::Running || self.running.is_empty() || dt <= 0. {
            return 0.;
        }
        let share = self.per_tick_processing_power() / self.running.len() as f64;
        for task in self.running.iter_mut() {
            task.remaining = (task.remaining - share * dt).max(0.);
        }
        let processed = self.per_tick_processing_power() * dt;
        self.total_processed += processed;
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> VirtualMachine {
        let mut vm = VirtualMachine::new(0, "a", 2, 100, 0.001);
        vm.set_state(VmState::Running);
        vm
    }

    #[test]
    fn idle_accrues_nothing() {
        let mut vm = vm();
        assert_eq!(vm.advance(1000.), 0.);
        assert_eq!(vm.total_processed(), 0.);
    }

    #[test]
    fn power_is_shared_between_tasks() {
        let mut vm = vm();
        vm.add_pending_task(ComputeTask {
            id: 1,
            remaining: 10.,
            listener: 0,
            completion_event: None,
        });
        vm.add_pending_task(ComputeTask {
            id: 2,
            remaining: 10.,
            listener: 0,
            completion_event: None,
        });
        assert!(!vm.is_idle());
        vm.activate_pending();
        // 2 cores x 0.001/ms = 0.002/ms aggregate, 0.001/ms per task
        vm.advance(1000.);
        assert_eq!(vm.total_processed(), 2.);
        assert_eq!(vm.running_tasks()[0].remaining, 9.);
        assert_eq!(vm.running_tasks()[1].remaining, 9.);
    }
}
