//! Simulation configuration.

use std::fs::File;

use serde::{Deserialize, Serialize};

use crate::error::ScalingError;

/// Substrate parameters of a simulation run.
///
/// The defaults reproduce the uniform datacentre the harness was designed
/// against: a 36 TB image repository with 1.25 GB/s transfer bandwidth and
/// nodes with 256 GB of memory whose cores process 0.001 work units per
/// simulated millisecond, drawing between 296 W (idle) and 493 W (fully
/// allocated).
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    /// image repository capacity in bytes
    pub repository_capacity: u64,
    /// image transfer bandwidth in bytes per millisecond
    pub repository_bandwidth: f64,
    /// processing power of one physical core, work units per millisecond
    pub per_core_power: f64,
    /// physical machine memory in bytes
    pub machine_memory: u64,
    /// machine power draw with nothing allocated, watts
    pub machine_idle_power: f64,
    /// machine power draw with every core allocated, watts
    pub machine_peak_power: f64,
    /// boot procedure length of a virtual appliance, work units
    pub appliance_boot_cost: f64,
    /// size of a virtual appliance image in bytes
    pub appliance_size: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            repository_capacity: 36_000_000_000_000,
            repository_bandwidth: 1_250_000.,
            per_core_power: 0.001,
            machine_memory: 256_000_000_000,
            machine_idle_power: 296.,
            machine_peak_power: 493.,
            appliance_boot_cost: 15.,
            appliance_size: 1024 * 1024 * 1024,
        }
    }
}

impl SimulationConfig {
    /// Reads the configuration from a YAML file. Missing fields fall back
    /// to the defaults.
    pub fn from_file(file_name: &str) -> Result<Self, ScalingError> {
        let file =
            File::open(file_name).map_err(|e| ScalingError::InvalidParameter(format!("{}: {}", file_name, e)))?;
        serde_yaml::from_reader(file).map_err(|e| ScalingError::InvalidParameter(format!("{}: {}", file_name, e)))
    }
}
