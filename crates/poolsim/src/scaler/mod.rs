//! The autoscaling control plane: per-VM utilization monitoring, the
//! virtual infrastructure with its per-kind VM pools, and the scaling
//! policies driving it.

pub mod infrastructure;
pub mod monitor;
pub mod policies;
