use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use poolsim::cloud::repository::VirtualAppliance;
use poolsim::cloud::service::CloudService;
use poolsim::cloud::vm::VmState;
use poolsim::config::SimulationConfig;
use poolsim::events::task::{TaskCancelled, TaskCompleted};
use poolsim_core::{on_event, Event, EventHandler, Simulation};

// transfer of the 1e6-byte test appliance takes 1000 ms, boot takes
// 15000 ms, so a placed VM runs 16000 ms after its request
fn test_config() -> SimulationConfig {
    SimulationConfig {
        repository_bandwidth: 1000.,
        appliance_size: 1_000_000,
        ..Default::default()
    }
}

struct TaskSink {
    completed: Vec<(f64, u64)>,
    cancelled: Vec<u64>,
    ctx: poolsim_core::SimulationContext,
}

impl EventHandler for TaskSink {
    fn on(&mut self, event: Event) {
        let time = self.ctx.time();
        on_event!(event, {
            TaskCompleted { vm_id: _, task_id } => {
                self.completed.push((time, task_id));
            }
            TaskCancelled { vm_id: _, task_id } => {
                self.cancelled.push(task_id);
            }
        })
    }
}

struct Harness {
    sim: Simulation,
    cloud: Rc<RefCell<CloudService>>,
    sink: Rc<RefCell<TaskSink>>,
    sink_id: poolsim_core::Id,
}

fn harness(config: SimulationConfig) -> Harness {
    let mut sim = Simulation::new(123);
    let cloud = rc!(refcell!(CloudService::new(Rc::new(config), sim.create_context("cloud"))));
    sim.add_handler("cloud", cloud.clone());
    let sink = rc!(refcell!(TaskSink {
        completed: Vec::new(),
        cancelled: Vec::new(),
        ctx: sim.create_context("sink"),
    }));
    let sink_id = sim.add_handler("sink", sink.clone());
    Harness {
        sim,
        cloud,
        sink,
        sink_id,
    }
}

#[test]
fn vm_walks_through_its_startup_phases() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    assert!(h
        .cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000)));
    let vm = h.cloud.borrow_mut().request_vms("a", 2, 1000, 1).unwrap()[0];

    assert_eq!(h.cloud.borrow().vm_state(vm), VmState::Destroyed);
    h.sim.step_for_duration(500.);
    assert_eq!(h.cloud.borrow().vm_state(vm), VmState::InitialTransfer);
    h.sim.step_for_duration(1000.);
    assert_eq!(h.cloud.borrow().vm_state(vm), VmState::Startup);
    h.sim.step_for_duration(15_000.);
    assert_eq!(h.cloud.borrow().vm_state(vm), VmState::Running);
    assert!(h.cloud.borrow().vm_is_idle(vm));
}

#[test]
fn unknown_appliance_is_rejected() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    assert!(h.cloud.borrow_mut().request_vms("ghost", 2, 1000, 1).is_err());
    h.sim.step_until_no_events();
}

#[test]
fn oversized_requests_become_nonservable() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    let vm = h.cloud.borrow_mut().request_vms("a", 16, 1000, 1).unwrap()[0];
    h.sim.step_until_no_events();
    assert_eq!(h.cloud.borrow().vm_state(vm), VmState::Nonservable);
}

#[test]
fn requests_wait_for_capacity_and_resume_on_release() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    // 5+5 cores cannot share one 8-core machine
    let first = h.cloud.borrow_mut().request_vms("a", 5, 1000, 1).unwrap()[0];
    let second = h.cloud.borrow_mut().request_vms("a", 5, 1000, 1).unwrap()[0];
    h.sim.step_for_duration(60_000.);
    assert_eq!(h.cloud.borrow().vm_state(first), VmState::Running);
    assert_eq!(h.cloud.borrow().vm_state(second), VmState::Destroyed);

    h.cloud.borrow_mut().destroy_vm(first, true).unwrap();
    h.sim.step_for_duration(60_000.);
    assert_eq!(h.cloud.borrow().vm_state(second), VmState::Running);
}

#[test]
fn queued_vms_take_the_terminate_path() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    let first = h.cloud.borrow_mut().request_vms("a", 5, 1000, 1).unwrap()[0];
    let second = h.cloud.borrow_mut().request_vms("a", 5, 1000, 1).unwrap()[0];
    h.sim.step_for_duration(60_000.);

    // a live VM cannot be terminated, a queued VM cannot be destroyed
    assert!(h.cloud.borrow_mut().terminate_vm(first, true).is_err());
    assert!(h.cloud.borrow_mut().destroy_vm(second, true).is_err());
    h.cloud.borrow_mut().terminate_vm(second, true).unwrap();

    // freed capacity no longer revives the terminated request
    h.cloud.borrow_mut().destroy_vm(first, true).unwrap();
    h.sim.step_until_no_events();
}

#[test]
fn task_completion_is_reported_to_the_listener() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    let vm = h.cloud.borrow_mut().request_vms("a", 2, 1000, 1).unwrap()[0];
    h.sim.step_for_duration(20_000.);

    // 2 cores x 0.001/ms; 120 work units run for 60000 ms
    let power = h.cloud.borrow().per_tick_processing_power(vm);
    assert_eq!(power, 0.002);
    let task = h.cloud.borrow_mut().new_compute_task(vm, 120., h.sink_id).unwrap();
    let submitted_at = h.sim.time();
    assert!(!h.cloud.borrow().vm_is_idle(vm));

    h.sim.step_until_no_events();
    let completed = h.sink.borrow().completed.clone();
    assert_eq!(completed, vec![(submitted_at + 60_000., task)]);
    assert!(h.cloud.borrow().vm_is_idle(vm));
    assert_eq!(h.cloud.borrow_mut().total_processed(vm), 120.);
}

#[test]
fn tasks_on_a_destroyed_vm_are_cancelled() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    let vm = h.cloud.borrow_mut().request_vms("a", 2, 1000, 1).unwrap()[0];
    h.sim.step_for_duration(20_000.);
    let task = h.cloud.borrow_mut().new_compute_task(vm, 120., h.sink_id).unwrap();
    h.sim.step_for_duration(10_000.);
    h.cloud.borrow_mut().destroy_vm(vm, true).unwrap();
    h.sim.step_until_no_events();
    assert!(h.sink.borrow().completed.is_empty());
    assert_eq!(h.sink.borrow().cancelled, vec![task]);
}

#[test]
fn tasks_are_rejected_before_the_vm_runs() {
    let mut h = harness(test_config());
    h.cloud.borrow_mut().add_machine(8);
    h.cloud
        .borrow_mut()
        .repository_mut()
        .register(VirtualAppliance::new("a", 15., 1_000_000));
    let vm = h.cloud.borrow_mut().request_vms("a", 2, 1000, 1).unwrap()[0];
    h.sim.step_for_duration(5_000.);
    assert!(h.cloud.borrow_mut().new_compute_task(vm, 120., h.sink_id).is_err());
    h.sim.step_until_no_events();
}
