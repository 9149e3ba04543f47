//! Trace-driven job arrivals.

use std::cell::RefCell;
use std::rc::Rc;

use poolsim_core::{log_info, on_event};
use poolsim_core::{Event, EventHandler, SimulationContext};
use sugars::{rc, refcell};

use crate::dispatch::launcher::FirstFitLauncher;
use crate::dispatch::progress::Progress;
use crate::dispatch::queue::QueueManager;
use crate::error::ScalingError;
use crate::events::dispatch::ProcessJobArrivals;
use crate::trace::Job;

/// Owns the loaded trace and fires each job at its submission instant,
/// handing rejected jobs to the retry queue.
pub struct JobArrivalHandler {
    jobs: Vec<Rc<RefCell<Job>>>,
    cursor: usize,
    launcher: Rc<RefCell<FirstFitLauncher>>,
    queue: Rc<RefCell<QueueManager>>,
    ctx: SimulationContext,
}

impl JobArrivalHandler {
    /// Prepares the workload: sorts jobs by submission time, shifts the
    /// whole trace forward when the clock is already past its earliest
    /// submission (by the deficit rounded up to whole seconds), and
    /// registers the job count with progress tracking.
    pub fn new(
        mut jobs: Vec<Job>,
        launcher: Rc<RefCell<FirstFitLauncher>>,
        queue: Rc<RefCell<QueueManager>>,
        progress: &mut Progress,
        ctx: SimulationContext,
    ) -> Result<Self, ScalingError> {
        jobs.sort_by_key(|job| job.submit_time);
        if let Some(first) = jobs.first() {
            let first_ms = first.submit_time_ms();
            let now = ctx.time();
            if now > first_ms {
                let shift = ((now - first_ms) / 1000.).ceil() as u64;
                for job in jobs.iter_mut() {
                    job.adjust(shift);
                }
            }
        }
        progress.set_total(jobs.len())?;
        log_info!(ctx, "number of loaded jobs: {}", jobs.len());
        Ok(Self {
            jobs: jobs.into_iter().map(|job| rc!(refcell!(job))).collect(),
            cursor: 0,
            launcher,
            queue,
            ctx,
        })
    }

    /// Submission instant of the earliest job, ms.
    pub fn first_submit_ms(&self) -> Option<f64> {
        self.jobs.first().map(|job| job.borrow().submit_time_ms())
    }

    /// The loaded jobs, in submission order.
    pub fn jobs(&self) -> &[Rc<RefCell<Job>>] {
        &self.jobs
    }

    /// Starts trace processing at the current instant.
    pub fn process_trace(&self) {
        self.ctx.emit_self_now(ProcessJobArrivals {});
    }

    /// Mean real queue time over the whole trace, seconds. Meaningful only
    /// after every job has completed.
    pub fn average_queue_time(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.;
        }
        self.jobs.iter().map(|job| job.borrow().real_queue_time).sum::<f64>() / self.jobs.len() as f64
    }

    fn on_process_arrivals(&mut self) {
        let now = self.ctx.time();
        while self.cursor < self.jobs.len() {
            let job = self.jobs[self.cursor].clone();
            let submit_ms = job.borrow().submit_time_ms();
            if submit_ms > now {
                // wait for the next job to become due
                self.ctx.emit_self(ProcessJobArrivals {}, submit_ms - now);
                return;
            }
            let rejected = match self.launcher.borrow().launch(&job) {
                Ok(rejected) => rejected,
                Err(e) => panic!("{}", e),
            };
            if rejected {
                self.queue.borrow_mut().add(job);
            }
            self.cursor += 1;
        }
        log_info!(self.ctx, "last job arrived, dispatching mechanism is terminated");
    }
}

impl EventHandler for JobArrivalHandler {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            ProcessJobArrivals {} => {
                self.on_process_arrivals();
            }
        })
    }
}
