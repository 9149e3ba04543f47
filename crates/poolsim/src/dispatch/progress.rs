//! Trace progress accounting.

use poolsim_core::{log_info, Id, SimulationContext};

use crate::error::ScalingError;
use crate::events::dispatch::AllJobsFinished;

/// Counts dispatched and completed jobs against the trace total and
/// broadcasts the drain notification exactly once.
pub struct Progress {
    total: Option<usize>,
    dispatched: usize,
    done: usize,
    drained: bool,
    listeners: Vec<Id>,
    ctx: SimulationContext,
}

impl Progress {
    pub fn new(ctx: SimulationContext) -> Self {
        Self {
            total: None,
            dispatched: 0,
            done: 0,
            drained: false,
            listeners: Vec::new(),
            ctx,
        }
    }

    /// Registers a component to receive [`AllJobsFinished`] when the last
    /// job completes.
    pub fn add_listener(&mut self, listener: Id) {
        self.listeners.push(listener);
    }

    /// Sets the number of jobs the trace holds. One-shot.
    pub fn set_total(&mut self, count: usize) -> Result<(), ScalingError> {
        if self.total.is_some() {
            return Err(ScalingError::AlreadyInitialized);
        }
        self.total = Some(count);
        Ok(())
    }

    /// Records a job reaching a VM.
    pub fn register_dispatch(&mut self) {
        self.dispatched += 1;
        if Some(self.dispatched) == self.total {
            log_info!(self.ctx, "last job reached a VM");
        }
    }

    /// Records a job completing its execution; the drain notification goes
    /// out with the last one.
    pub fn register_completion(&mut self) {
        self.done += 1;
        if Some(self.done) == self.total && !self.drained {
            self.drained = true;
            for &listener in &self.listeners {
                self.ctx.emit_now(AllJobsFinished {}, listener);
            }
        }
    }

    /// Number of jobs completed so far.
    pub fn done_count(&self) -> usize {
        self.done
    }

    /// Number of jobs dispatched so far.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched
    }
}
