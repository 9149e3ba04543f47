//! The main entry point for configuring and running a scaling simulation.

use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use poolsim_core::{Simulation, SimulationContext};

use crate::cloud::service::CloudService;
use crate::config::SimulationConfig;
use crate::dispatch::arrivals::JobArrivalHandler;
use crate::dispatch::launcher::FirstFitLauncher;
use crate::dispatch::progress::Progress;
use crate::dispatch::queue::QueueManager;
use crate::error::ScalingError;
use crate::scaler::infrastructure::{ScalingPolicy, VirtualInfrastructure};
use crate::scaler::monitor::VmMonitoring;
use crate::trace::Job;

/// End-of-run metrics of a simulation.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Virtual time covered between `run()` and the last event, ms.
    pub simulated_timespan: f64,
    /// Mean utilization of the physical machines over the timespan.
    pub average_machine_utilization: f64,
    /// Energy consumed by all machines over the whole run, kWh.
    pub total_energy_kwh: f64,
    /// Mean job queueing delay, seconds.
    pub average_queue_time: f64,
    /// Appliances left registered in the repository.
    pub appliances_registered: usize,
}

/// Wires the cloud, the monitoring, the autoscaled infrastructure and the
/// dispatch pipeline into one simulation and drives it.
pub struct ScalingSimulation {
    sim: Simulation,
    config: Rc<SimulationConfig>,
    cloud: Rc<RefCell<CloudService>>,
    monitoring: Rc<RefCell<VmMonitoring>>,
    infrastructure: Option<Rc<RefCell<VirtualInfrastructure>>>,
    arrivals: Option<Rc<RefCell<JobArrivalHandler>>>,
    queue: Option<Rc<RefCell<QueueManager>>>,
    progress: Option<Rc<RefCell<Progress>>>,
    run_started_at: Option<f64>,
    machine_baselines: Vec<f64>,
    #[allow(dead_code)]
    ctx: SimulationContext,
}

impl ScalingSimulation {
    /// Creates the simulation with the cloud and monitoring components in
    /// place; machines, policy and workload are added separately.
    pub fn new(mut sim: Simulation, config: SimulationConfig) -> Self {
        let config = rc!(config);
        let cloud = rc!(refcell!(CloudService::new(config.clone(), sim.create_context("cloud"))));
        sim.add_handler("cloud", cloud.clone());
        let monitoring = rc!(refcell!(VmMonitoring::new(cloud.clone(), sim.create_context("monitoring"))));
        sim.add_handler("monitoring", monitoring.clone());
        let ctx = sim.create_context("simulation");
        Self {
            sim,
            config,
            cloud,
            monitoring,
            infrastructure: None,
            arrivals: None,
            queue: None,
            progress: None,
            run_started_at: None,
            machine_baselines: Vec::new(),
            ctx,
        }
    }

    /// Populates the datacentre with uniform machines.
    ///
    /// VM sizing takes up to 4 cores, so smaller machines could produce
    /// requests the cloud can never serve; such configurations are
    /// rejected.
    pub fn scale_datacenter(&mut self, machines: u32, cores_per_machine: u32) -> Result<(), ScalingError> {
        if cores_per_machine < 4 {
            return Err(ScalingError::InvalidParameter(
                "per machine core count cannot be lower than 4".to_string(),
            ));
        }
        if machines == 0 {
            return Err(ScalingError::InvalidParameter(
                "the datacentre needs at least one machine".to_string(),
            ));
        }
        let mut cloud = self.cloud.borrow_mut();
        for _ in 0..machines {
            cloud.add_machine(cores_per_machine);
        }
        Ok(())
    }

    /// Installs the autoscaled virtual infrastructure with the given policy
    /// and starts its control loop.
    pub fn install_infrastructure(
        &mut self,
        policy: Box<dyn ScalingPolicy>,
    ) -> Result<Rc<RefCell<VirtualInfrastructure>>, ScalingError> {
        let infra = rc!(refcell!(VirtualInfrastructure::new(
            self.cloud.clone(),
            self.monitoring.clone(),
            policy,
            self.config.clone(),
            self.sim.create_context("infrastructure"),
        )?));
        self.sim.add_handler("infrastructure", infra.clone());
        infra.borrow_mut().start_autoscaling();
        self.infrastructure = Some(infra.clone());
        Ok(infra)
    }

    /// Sets up the dispatch pipeline for the given trace and schedules its
    /// arrivals, fast-forwarding the clock to the first submission.
    pub fn add_workload(&mut self, jobs: Vec<Job>) -> Result<(), ScalingError> {
        if jobs.is_empty() {
            return Err(ScalingError::TraceLoad("trace contains no jobs".to_string()));
        }
        let infra = self
            .infrastructure
            .clone()
            .ok_or_else(|| ScalingError::InvalidParameter("install the infrastructure before the workload".to_string()))?;
        let progress = rc!(refcell!(Progress::new(self.sim.create_context("progress"))));
        progress.borrow_mut().add_listener(infra.borrow().id());
        let launcher = rc!(refcell!(FirstFitLauncher::new(
            infra,
            self.cloud.clone(),
            progress.clone(),
            self.sim.create_context("launcher"),
        )));
        self.sim.add_handler("launcher", launcher.clone());
        let queue = rc!(refcell!(QueueManager::new(
            launcher.clone(),
            self.sim.create_context("queue")
        )));
        self.sim.add_handler("queue", queue.clone());
        let arrivals = rc!(refcell!(JobArrivalHandler::new(
            jobs,
            launcher,
            queue.clone(),
            &mut progress.borrow_mut(),
            self.sim.create_context("arrivals"),
        )?));
        self.sim.add_handler("arrivals", arrivals.clone());
        if let Some(first_ms) = arrivals.borrow().first_submit_ms() {
            self.sim.skip_until(first_ms);
        }
        arrivals.borrow().process_trace();
        self.arrivals = Some(arrivals);
        self.queue = Some(queue);
        self.progress = Some(progress);
        Ok(())
    }

    /// Runs the simulation to completion.
    pub fn run(&mut self) {
        self.begin_measurement();
        self.sim.step_until_no_events();
    }

    /// Steps through the simulation with a duration limit (useful in
    /// tests). Returns `true` while pending events remain.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.begin_measurement();
        self.sim.step_for_duration(duration)
    }

    fn begin_measurement(&mut self) {
        if self.run_started_at.is_none() {
            self.run_started_at = Some(self.sim.time());
            self.machine_baselines = self
                .cloud
                .borrow()
                .machines()
                .iter()
                .map(|machine| machine.total_processed())
                .collect();
        }
    }

    /// Current virtual time, ms.
    pub fn time(&self) -> f64 {
        self.sim.time()
    }

    /// End-of-run statistics; queue time is meaningful only once the trace
    /// has drained.
    pub fn statistics(&self) -> RunStatistics {
        let now = self.sim.time();
        let started = self.run_started_at.unwrap_or(0.);
        let timespan = now - started;
        let cloud = self.cloud.borrow();
        let machines = cloud.machines();
        let mut utilization_sum = 0.;
        let mut energy = 0.;
        for (i, machine) in machines.iter().enumerate() {
            let baseline = self.machine_baselines.get(i).copied().unwrap_or(0.);
            utilization_sum += machine.utilization(baseline, timespan);
            energy += machine.energy_consumed(now);
        }
        RunStatistics {
            simulated_timespan: timespan,
            average_machine_utilization: if machines.is_empty() {
                0.
            } else {
                utilization_sum / machines.len() as f64
            },
            total_energy_kwh: energy / 3_600_000_000.,
            average_queue_time: self
                .arrivals
                .as_ref()
                .map(|arrivals| arrivals.borrow().average_queue_time())
                .unwrap_or(0.),
            appliances_registered: cloud.repository().len(),
        }
    }

    // component access for drivers and tests //////////////////////////////

    pub fn cloud(&self) -> Rc<RefCell<CloudService>> {
        self.cloud.clone()
    }

    pub fn monitoring(&self) -> Rc<RefCell<VmMonitoring>> {
        self.monitoring.clone()
    }

    pub fn infrastructure(&self) -> Option<Rc<RefCell<VirtualInfrastructure>>> {
        self.infrastructure.clone()
    }

    pub fn arrivals(&self) -> Option<Rc<RefCell<JobArrivalHandler>>> {
        self.arrivals.clone()
    }

    pub fn queue(&self) -> Option<Rc<RefCell<QueueManager>>> {
        self.queue.clone()
    }

    pub fn progress(&self) -> Option<Rc<RefCell<Progress>>> {
        self.progress.clone()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.config.clone()
    }
}
