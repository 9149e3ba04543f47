//! Simulation assembly and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Event;
use crate::handler::EventHandler;
use crate::kernel::Kernel;
use crate::log::report_undeliverable;

/// One registered component: its name, and its handler once attached.
struct ComponentSlot {
    name: String,
    handler: Option<Rc<RefCell<dyn EventHandler>>>,
}

/// Bookkeeping for registered components. Identifiers index straight into
/// the slot table and are handed out in registration order.
#[derive(Default)]
pub(crate) struct Registry {
    ids: HashMap<String, Id>,
    slots: Vec<ComponentSlot>,
}

impl Registry {
    fn id_for(&mut self, name: &str) -> Id {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.slots.len() as Id;
        self.ids.insert(name.to_owned(), id);
        self.slots.push(ComponentSlot {
            name: name.to_owned(),
            handler: None,
        });
        id
    }

    fn lookup(&self, name: &str) -> Option<Id> {
        self.ids.get(name).copied()
    }

    pub(crate) fn name_of(&self, id: Id) -> String {
        self.slots[id as usize].name.clone()
    }

    fn handler_of(&self, id: Id) -> Option<Rc<RefCell<dyn EventHandler>>> {
        self.slots.get(id as usize).and_then(|slot| slot.handler.clone())
    }
}

/// A simulation: the kernel (clock, RNG, pending events) plus the component
/// registry, with the methods that drive event delivery.
pub struct Simulation {
    kernel: Rc<RefCell<Kernel>>,
    registry: Rc<RefCell<Registry>>,
}

impl Simulation {
    /// Creates an empty simulation whose RNG is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            kernel: Rc::new(RefCell::new(Kernel::new(seed))),
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// Creates a context for the named component, registering the name if
    /// it is new.
    ///
    /// ```rust
    /// use poolsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("comp");
    /// assert_eq!((ctx.id(), ctx.name()), (0, "comp"));
    /// ```
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let id = self.registry.borrow_mut().id_for(name.as_ref());
        SimulationContext::new(id, name.as_ref(), self.kernel.clone(), self.registry.clone())
    }

    /// Attaches the event handler of the named component and returns the
    /// component identifier. A component that already has a context keeps
    /// the identifier assigned there.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let mut registry = self.registry.borrow_mut();
        let id = registry.id_for(name.as_ref());
        registry.slots[id as usize].handler = Some(handler);
        id
    }

    /// Detaches the handler of the named component; later events addressed
    /// to it are reported as undeliverable and dropped.
    pub fn remove_handler<S>(&mut self, name: S)
    where
        S: AsRef<str>,
    {
        let id = self.lookup_id(name.as_ref());
        self.registry.borrow_mut().slots[id as usize].handler = None;
    }

    /// Identifier of the named component.
    ///
    /// Panics if no component with this name was registered.
    pub fn lookup_id(&self, name: &str) -> Id {
        self.registry
            .borrow()
            .lookup(name)
            .unwrap_or_else(|| panic!("no component named {}", name))
    }

    /// Name of the component with the given identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.registry.borrow().name_of(id)
    }

    /// Current virtual time.
    pub fn time(&self) -> f64 {
        self.kernel.borrow().now()
    }

    /// Delivers the next pending event, advancing the clock to its due
    /// time. Returns `false` when nothing is pending.
    pub fn step(&mut self) -> bool {
        let event = match self.kernel.borrow_mut().pull_due() {
            Some(event) => event,
            None => return false,
        };
        let handler = self.registry.borrow().handler_of(event.dst);
        match handler {
            Some(handler) => handler.borrow_mut().on(event),
            None => report_undeliverable(event),
        }
        true
    }

    /// Performs up to `step_count` steps; returns `false` once the queue is
    /// exhausted.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Runs until nothing is pending.
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use poolsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// struct Tick {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("comp");
    /// ctx.emit_self(Tick {}, 1.5);
    /// ctx.emit_self(Tick {}, 4.0);
    /// sim.step_until_no_events();
    /// assert_eq!(sim.time(), 4.0);
    /// ```
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps while the next event falls within `duration` from the current
    /// time. Returns `true` if pending events remain afterwards.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.kernel.borrow().now() + duration;
        loop {
            let next_due = self.kernel.borrow_mut().next_due_time();
            match next_due {
                Some(due) if due <= end_time => {
                    self.step();
                }
                Some(_) => return true,
                None => return false,
            }
        }
    }

    /// Moves the clock straight to `time` without firing anything: events
    /// due earlier are deferred to fire exactly at `time`. Targets in the
    /// past are ignored.
    pub fn skip_until(&mut self, time: f64) {
        self.kernel.borrow_mut().fast_forward(time);
    }

    /// Random float in `[0, 1)` from the simulation-wide RNG.
    pub fn rand(&mut self) -> f64 {
        self.kernel.borrow_mut().draw_unit()
    }

    /// Total number of events scheduled so far, revoked ones included.
    pub fn event_count(&self) -> u64 {
        self.kernel.borrow().spawned_events()
    }

    /// Drops every pending event matching the predicate.
    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.kernel.borrow_mut().revoke_where(pred);
    }
}
