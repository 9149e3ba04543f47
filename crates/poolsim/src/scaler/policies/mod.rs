//! Scaling policies.

pub mod creation_priority;
pub mod pooling;
pub mod threshold;

use crate::error::ScalingError;
use crate::scaler::infrastructure::ScalingPolicy;

use creation_priority::VmCreationPriorityPolicy;
use pooling::PoolingPolicy;
use threshold::ThresholdPolicy;

/// Resolves a policy by its CLI/config name.
pub fn scaling_policy_resolver(name: &str) -> Result<Box<dyn ScalingPolicy>, ScalingError> {
    match name {
        "threshold" => Ok(Box::new(ThresholdPolicy::new())),
        "vm-creation-priority" => Ok(Box::new(VmCreationPriorityPolicy::new())),
        "pooling" => Ok(Box::new(PoolingPolicy::new())),
        _ => Err(ScalingError::InvalidParameter(format!(
            "unknown scaling policy: {}",
            name
        ))),
    }
}

/// Scaling decisions have no recovery path; substrate failures abort the
/// run with the error as diagnostic.
pub(crate) fn fatal<T>(result: Result<T, ScalingError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}", e),
    }
}
