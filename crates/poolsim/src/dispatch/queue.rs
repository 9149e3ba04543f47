//! Per-kind retry queue for rejected jobs.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use poolsim_core::on_event;
use poolsim_core::{Event, EventHandler, SimulationContext};

use crate::dispatch::launcher::FirstFitLauncher;
use crate::events::dispatch::RetryQueuedJobs;
use crate::trace::Job;

/// Period between retry rounds, ms.
pub const RETRY_PERIOD: f64 = 10_000.;

/// Holds jobs the launcher rejected, one FIFO per kind, and retries them
/// every ten simulated seconds while any queue is non-empty.
///
/// Jobs of one kind launch in submission order; a kind whose head cannot be
/// placed blocks only itself, the remaining kinds are still served in the
/// same round.
pub struct QueueManager {
    launcher: Rc<RefCell<FirstFitLauncher>>,
    queues: IndexMap<String, VecDeque<Rc<RefCell<Job>>>>,
    subscribed: bool,
    ctx: SimulationContext,
}

impl QueueManager {
    pub fn new(launcher: Rc<RefCell<FirstFitLauncher>>, ctx: SimulationContext) -> Self {
        Self {
            launcher,
            queues: IndexMap::new(),
            subscribed: false,
            ctx,
        }
    }

    /// Queues a rejected job at the tail of its kind's FIFO and arms the
    /// retry cycle if it is not ticking yet.
    pub fn add(&mut self, job: Rc<RefCell<Job>>) {
        let kind = job.borrow().kind().to_owned();
        self.queues.entry(kind).or_default().push_back(job);
        if !self.subscribed {
            self.subscribed = true;
            self.ctx.emit_self(RetryQueuedJobs {}, RETRY_PERIOD);
        }
    }

    /// Total number of queued jobs across kinds.
    pub fn queued_jobs(&self) -> usize {
        self.queues.values().map(|queue| queue.len()).sum()
    }

    fn on_retry(&mut self) {
        let kinds: Vec<String> = self.queues.keys().cloned().collect();
        for kind in kinds {
            loop {
                let head = match self.queues.get(&kind).and_then(|queue| queue.front()) {
                    Some(job) => job.clone(),
                    None => break,
                };
                let rejected = match self.launcher.borrow().launch(&head) {
                    Ok(rejected) => rejected,
                    Err(e) => panic!("{}", e),
                };
                if rejected {
                    // this kind stays blocked, move on to the next one
                    break;
                }
                if let Some(queue) = self.queues.get_mut(&kind) {
                    queue.pop_front();
                }
            }
        }
        self.queues.retain(|_, queue| !queue.is_empty());
        if self.queues.is_empty() {
            self.subscribed = false;
        } else {
            self.ctx.emit_self(RetryQueuedJobs {}, RETRY_PERIOD);
        }
    }
}

impl EventHandler for QueueManager {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            RetryQueuedJobs {} => {
                self.on_retry();
            }
        })
    }
}
