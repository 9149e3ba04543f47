//! Access to the simulation from inside components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::kernel::Kernel;
use crate::simulation::Registry;

/// A per-component handle on the simulation kernel.
///
/// Components hold their context to read the virtual clock, schedule
/// events and draw from the simulation-wide RNG.
#[derive(Clone)]
pub struct SimulationContext {
    id: Id,
    name: String,
    kernel: Rc<RefCell<Kernel>>,
    registry: Rc<RefCell<Registry>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, kernel: Rc<RefCell<Kernel>>, registry: Rc<RefCell<Registry>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            kernel,
            registry,
        }
    }

    /// Identifier of the component this context belongs to.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Name of the component this context belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current virtual time.
    pub fn time(&self) -> f64 {
        self.kernel.borrow().now()
    }

    /// Random float in `[0, 1)` from the simulation-wide RNG.
    pub fn rand(&self) -> f64 {
        self.kernel.borrow_mut().draw_unit()
    }

    /// Random value in the given range from the simulation-wide RNG.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.kernel.borrow_mut().draw_from_range(range)
    }

    /// Schedules an event for component `dst` after `delay`.
    pub fn emit<T>(&self, data: T, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        self.kernel.borrow_mut().post(data, self.id, dst, delay)
    }

    /// Schedules an event for component `dst` at the current time.
    pub fn emit_now<T>(&self, data: T, dst: Id) -> EventId
    where
        T: EventData,
    {
        self.emit(data, dst, 0.0)
    }

    /// Schedules an event for this component after `delay`.
    pub fn emit_self<T>(&self, data: T, delay: f64) -> EventId
    where
        T: EventData,
    {
        self.emit(data, self.id, delay)
    }

    /// Schedules an event for this component at the current time.
    pub fn emit_self_now<T>(&self, data: T) -> EventId
    where
        T: EventData,
    {
        self.emit(data, self.id, 0.0)
    }

    /// Revokes a pending event by its identifier. Already delivered or
    /// unknown identifiers are ignored.
    pub fn cancel_event(&self, id: EventId) {
        self.kernel.borrow_mut().revoke(id);
    }

    /// Drops every pending event matching the predicate.
    pub fn cancel_events<F>(&self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.kernel.borrow_mut().revoke_where(pred);
    }

    /// Name of an arbitrary component by its identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.registry.borrow().name_of(id)
    }
}
