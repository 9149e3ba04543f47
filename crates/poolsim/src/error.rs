//! Error taxonomy of the simulation harness.

use thiserror::Error;

/// Errors surfaced by the harness.
///
/// Apart from [`ScalingError::MonitorInactive`] and
/// [`ScalingError::AlreadyInitialized`] (programmer errors, surfaced
/// immediately), every variant is fatal to the run: the simulation has no
/// meaningful recovery path once the substrate misbehaves. The only
/// recovered condition in normal operation is "no idle VM right now", which
/// is not an error but the launcher's boolean verdict.
#[derive(Error, Debug)]
pub enum ScalingError {
    #[error("trace load failed: {0}")]
    TraceLoad(String),

    #[error("repository cannot accommodate appliance {0} and no obsolete appliance is evictable")]
    StorageExhausted(String),

    #[error("VM management failed: {0}")]
    VmManagement(String),

    #[error("network failure during dispatch: {0}")]
    Network(String),

    #[error("utilization queried for a VM that is not monitored: vm #{0}")]
    MonitorInactive(u32),

    #[error("total job count was already set")]
    AlreadyInitialized,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
