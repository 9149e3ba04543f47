//! Discrete-event simulation kernel: a virtual clock, a pending-event
//! queue and typed event dispatch to registered components.

pub mod component;
pub mod context;
pub mod event;
pub mod handler;
mod kernel;
pub mod log;
mod queue;
pub mod simulation;

pub use component::Id;
pub use context::SimulationContext;
pub use event::{Event, EventData, EventId};
pub use handler::EventHandler;
pub use simulation::Simulation;
