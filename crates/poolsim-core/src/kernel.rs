//! Shared core of a running simulation: the virtual clock, the seeded RNG
//! and the pending-event queue. Both [`Simulation`](crate::Simulation) and
//! every [`SimulationContext`](crate::SimulationContext) operate on one
//! kernel instance.

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::queue::EventQueue;

pub(crate) struct Kernel {
    now: f64,
    spawned: u64,
    rng: Pcg64,
    queue: EventQueue,
}

impl Kernel {
    pub fn new(seed: u64) -> Self {
        Self {
            now: 0.0,
            spawned: 0,
            rng: Pcg64::seed_from_u64(seed),
            queue: EventQueue::new(),
        }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedules a payload for delivery to `dst` after `delay`; negative
    /// delays clamp to "now". Returns the event identifier.
    pub fn post<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        let id = self.spawned;
        self.spawned += 1;
        self.queue.push(Event {
            id,
            time: self.now + delay.max(0.0),
            src,
            dst,
            data: Box::new(data),
        });
        id
    }

    /// Takes the earliest live event, advancing the clock to its due time.
    pub fn pull_due(&mut self) -> Option<Event> {
        let event = self.queue.pop_due()?;
        self.now = event.time;
        Some(event)
    }

    pub fn next_due_time(&mut self) -> Option<f64> {
        self.queue.next_due_time()
    }

    pub fn revoke(&mut self, id: EventId) {
        self.queue.revoke(id);
    }

    pub fn revoke_where<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.queue.revoke_where(pred);
    }

    /// Moves the clock straight to `time`; anything due earlier is deferred
    /// to fire exactly then. Targets in the past are ignored.
    pub fn fast_forward(&mut self, time: f64) {
        if time <= self.now {
            return;
        }
        self.queue.defer_until(time);
        self.now = time;
    }

    pub fn draw_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    pub fn draw_from_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    /// Total number of events scheduled so far, revoked ones included.
    pub fn spawned_events(&self) -> u64 {
        self.spawned
    }
}
