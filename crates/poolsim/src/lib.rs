//! Trace-driven simulation of autoscaled virtual infrastructures.
//!
//! A workload trace is replayed against an elastic set of per-kind VM pools
//! living on a simulated IaaS cloud. A pluggable scaling policy grows and
//! shrinks the pools every two simulated minutes based on sliding-window
//! utilization estimates, while a first-fit launcher and a periodic retry
//! queue move the jobs onto idle VMs.

pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod scaler;
pub mod simulation;
pub mod trace;
