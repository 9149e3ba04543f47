use poolsim::cloud::vm::VmState;
use poolsim::config::SimulationConfig;
use poolsim::error::ScalingError;
use poolsim::scaler::infrastructure::{ScalingPolicy, VirtualInfrastructure};
use poolsim::scaler::policies::pooling::{PoolingPolicy, POOL_HEADROOM};
use poolsim::scaler::policies::threshold::ThresholdPolicy;
use poolsim::simulation::ScalingSimulation;
use poolsim::trace::Job;
use poolsim_core::Simulation;

/// Leaves every scaling decision to the test body.
struct ManualPolicy;

impl ScalingPolicy for ManualPolicy {
    fn tick(&mut self, _infra: &mut VirtualInfrastructure) {}
}

fn pool_len(sim: &ScalingSimulation, kind: &str) -> usize {
    sim.infrastructure()
        .unwrap()
        .borrow()
        .pool(kind)
        .map_or(0, |pool| pool.len())
}

// Pooling policy under a burst of long jobs: the pool grows one VM per tick
// while fewer than POOL_HEADROOM VMs sit idle, and settles once every job
// has a VM and the headroom stands ready.
#[test]
fn pooling_grows_until_headroom_is_idle() {
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, SimulationConfig::default());
    scaling_sim.scale_datacenter(4, 8).unwrap();
    scaling_sim
        .install_infrastructure(Box::new(PoolingPolicy::new()))
        .unwrap();
    let jobs: Vec<Job> = (0..10).map(|i| Job::new(i, Some("A".to_string()), 0, 3600)).collect();
    scaling_sim.add_workload(jobs).unwrap();

    scaling_sim.step_for_duration(2_000_000.);
    let infra = scaling_sim.infrastructure().unwrap();
    let pool = infra.borrow().pool("A").cloned().unwrap();
    // ten busy VMs plus the ready headroom
    assert_eq!(pool.len(), 10 + POOL_HEADROOM);
    let cloud = scaling_sim.cloud();
    let idle = pool.iter().filter(|&&vm| cloud.borrow().vm_is_idle(vm)).count();
    assert_eq!(idle, POOL_HEADROOM);
    // every pool member was built from the kind's appliance
    for &vm in pool.iter() {
        assert_eq!(cloud.borrow().vm_appliance(vm), "A");
    }
    assert_eq!(scaling_sim.queue().unwrap().borrow().queued_jobs(), 0);
    assert_eq!(scaling_sim.progress().unwrap().borrow().dispatched_count(), 10);

    scaling_sim.run();
    assert_eq!(scaling_sim.progress().unwrap().borrow().done_count(), 10);
    assert_eq!(pool_len(&scaling_sim, "A"), 0);
    assert!(scaling_sim.statistics().average_queue_time > 0.);
}

// Threshold policy with a single idle VM and no jobs: the first tick at
// t=120000 creates the VM, the 30th consecutive idle observation lands at
// t=120000 + 30 * 120000 and destroys it, dropping the kind.
#[test]
fn threshold_drops_an_idle_singleton_after_the_grace_period() {
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, SimulationConfig::default());
    scaling_sim.scale_datacenter(1, 8).unwrap();
    let infra = scaling_sim
        .install_infrastructure(Box::new(ThresholdPolicy::new()))
        .unwrap();
    infra.borrow_mut().register_kind("svc");

    scaling_sim.step_for_duration(3_715_000.);
    let pool = infra.borrow().pool("svc").cloned().unwrap();
    assert_eq!(pool.len(), 1);
    let vm_id = pool[0];

    let duration = 3_725_000. - scaling_sim.time();
    scaling_sim.step_for_duration(duration);
    assert!(infra.borrow().pool("svc").is_none());
    assert_eq!(scaling_sim.cloud().borrow().vm_state(vm_id), VmState::Destroyed);
    // the emptied pool turned its appliance into an eviction candidate
    assert_eq!(infra.borrow().obsolete_appliances(), vec!["svc".to_string()]);

    // re-registering after the drop yields a fresh single-VM pool
    infra.borrow_mut().register_kind("svc");
    let duration = 3_990_000. - scaling_sim.time();
    scaling_sim.step_for_duration(duration);
    let pool = infra.borrow().pool("svc").cloned().unwrap();
    assert_eq!(pool.len(), 1);
    assert_ne!(pool[0], vm_id);
    assert_eq!(scaling_sim.cloud().borrow().vm_state(pool[0]), VmState::Running);
    assert!(infra.borrow().obsolete_appliances().is_empty());
}

// Storage sized for two appliance images: registration of a third evicts
// the longest-obsolete image, and with no obsolete image left the request
// fails.
#[test]
fn full_storage_evicts_obsolete_appliances_in_fifo_order() {
    let config = SimulationConfig {
        repository_capacity: 2_600_000_000,
        ..Default::default()
    };
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, config);
    scaling_sim.scale_datacenter(1, 8).unwrap();
    let infra = scaling_sim.install_infrastructure(Box::new(ManualPolicy)).unwrap();

    let kinds = ["A", "B"];
    for kind in kinds {
        infra.borrow_mut().request_vm(kind).unwrap();
        scaling_sim.step_for_duration(20_000.);
        let vm_id = infra.borrow().pool(kind).unwrap()[0];
        assert_eq!(scaling_sim.cloud().borrow().vm_state(vm_id), VmState::Running);
        infra.borrow_mut().destroy_vm(vm_id).unwrap();
        scaling_sim.step_for_duration(5_000.);
    }
    assert_eq!(scaling_sim.cloud().borrow().repository().contents(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(infra.borrow().obsolete_appliances(), vec!["A".to_string(), "B".to_string()]);

    // "C" does not fit: the oldest obsolete image ("A") is evicted
    infra.borrow_mut().request_vm("C").unwrap();
    scaling_sim.step_for_duration(20_000.);
    assert_eq!(scaling_sim.cloud().borrow().repository().contents(), vec!["B".to_string(), "C".to_string()]);
    assert_eq!(infra.borrow().obsolete_appliances(), vec!["B".to_string()]);

    // reviving "B" reuses its stored image and clears its obsolete mark
    infra.borrow_mut().request_vm("B").unwrap();
    scaling_sim.step_for_duration(20_000.);
    assert_eq!(scaling_sim.cloud().borrow().repository().contents(), vec!["B".to_string(), "C".to_string()]);
    assert!(infra.borrow().obsolete_appliances().is_empty());

    // nothing evictable remains for a fourth image
    let result = infra.borrow_mut().request_vm("D");
    assert!(matches!(result, Err(ScalingError::StorageExhausted(_))));
    assert_eq!(scaling_sim.cloud().borrow().repository().len(), 2);
}

// A boot procedure stretched over ten control ticks: the under-preparation
// guard must swallow the repeated pooling requests and protect the booting
// VM from destruction.
#[test]
fn under_prep_guard_blocks_duplicates_and_destruction() {
    let config = SimulationConfig {
        appliance_boot_cost: 1200.,
        ..Default::default()
    };
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, config);
    scaling_sim.scale_datacenter(1, 8).unwrap();
    let infra = scaling_sim.install_infrastructure(Box::new(PoolingPolicy::new())).unwrap();
    infra.borrow_mut().register_kind("k");

    // the VM from the tick at t=120000 reaches Running at ~t=1320859
    scaling_sim.step_for_duration(125_000.);
    let pool = infra.borrow().pool("k").cloned().unwrap();
    assert_eq!(pool.len(), 1);
    let vm_id = pool[0];

    for target in [250_000., 500_000., 750_000., 1_000_000., 1_250_000., 1_310_000.] {
        let duration = target - scaling_sim.time();
        scaling_sim.step_for_duration(duration);
        assert_eq!(infra.borrow().pool("k").unwrap().len(), 1);
        assert_eq!(infra.borrow().under_prep_vm("k"), Some(vm_id));
        assert_ne!(scaling_sim.cloud().borrow().vm_state(vm_id), VmState::Destroyed);
    }

    // once the VM runs, the guard lifts and the pool resumes growing
    let duration = 1_450_000. - scaling_sim.time();
    scaling_sim.step_for_duration(duration);
    assert_eq!(infra.borrow().under_prep_vm("k"), None);
    assert_eq!(scaling_sim.cloud().borrow().vm_state(vm_id), VmState::Running);
    assert_eq!(infra.borrow().pool("k").unwrap().len(), 2);
}

#[test]
fn register_kind_is_idempotent() {
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, SimulationConfig::default());
    scaling_sim.scale_datacenter(1, 8).unwrap();
    let infra = scaling_sim.install_infrastructure(Box::new(ManualPolicy)).unwrap();

    infra.borrow_mut().register_kind("x");
    infra.borrow_mut().register_kind("x");
    assert_eq!(infra.borrow().kinds(), vec!["x".to_string()]);

    infra.borrow_mut().request_vm("x").unwrap();
    infra.borrow_mut().register_kind("x");
    assert_eq!(infra.borrow().pool("x").unwrap().len(), 1);
}

#[test]
fn datacenter_preconditions_are_validated() {
    let sim = Simulation::new(123);
    let mut scaling_sim = ScalingSimulation::new(sim, SimulationConfig::default());
    assert!(matches!(
        scaling_sim.scale_datacenter(2, 3),
        Err(ScalingError::InvalidParameter(_))
    ));
    assert!(matches!(
        scaling_sim.scale_datacenter(0, 8),
        Err(ScalingError::InvalidParameter(_))
    ));
    assert!(matches!(
        scaling_sim.install_infrastructure(Box::new(ManualPolicy)),
        Err(ScalingError::InvalidParameter(_))
    ));
    scaling_sim.scale_datacenter(2, 8).unwrap();
}
