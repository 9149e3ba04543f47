use std::process::exit;
use std::time::Instant;

use clap::Parser;
use log::info;

use poolsim::config::SimulationConfig;
use poolsim::error::ScalingError;
use poolsim::scaler::policies::scaling_policy_resolver;
use poolsim::simulation::ScalingSimulation;
use poolsim::trace::load_trace;
use poolsim_core::Simulation;

/// Replays a job trace against an autoscaled virtual infrastructure on a
/// uniform simulated datacentre and reports queueing, utilization and
/// energy statistics.
#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
    /// Workload trace file (CSV: id, submit_time, exec_time, executable)
    trace_file: String,

    /// Number of CPU cores per physical machine (at least 4)
    cores_per_machine: u32,

    /// Number of physical machines in the datacentre
    machines: u32,

    /// Scaling policy: threshold, vm-creation-priority or pooling
    policy: String,

    /// Simulation seed
    #[clap(long, default_value_t = 123)]
    seed: u64,
}

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn run(args: Args) -> Result<(), ScalingError> {
    info!(
        "scaling datacentre to {} machines with {} cpu cores each",
        args.machines, args.cores_per_machine
    );
    let policy = scaling_policy_resolver(&args.policy)?;
    let jobs = load_trace(&args.trace_file)?;

    let sim = Simulation::new(args.seed);
    let mut scaling_sim = ScalingSimulation::new(sim, SimulationConfig::default());
    scaling_sim.scale_datacenter(args.machines, args.cores_per_machine)?;
    scaling_sim.install_infrastructure(policy)?;
    scaling_sim.add_workload(jobs)?;

    let wall_clock = Instant::now();
    scaling_sim.run();

    let stats = scaling_sim.statistics();
    println!("Simulation took: {} ms", wall_clock.elapsed().as_millis());
    println!("Simulated timespan: {} ms", stats.simulated_timespan);
    println!(
        "Average utilization of machines: {:.3} %",
        100. * stats.average_machine_utilization
    );
    println!("Total power consumption: {:.3} kWh", stats.total_energy_kwh);
    println!("Average queue time: {:.3} s", stats.average_queue_time);
    println!(
        "Virtual appliances registered at the end: {}",
        stats.appliances_registered
    );
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        exit(1);
    }
}
