//! First-fit job dispatching.

use std::cell::RefCell;
use std::rc::Rc;

use poolsim_core::{log_trace, on_event};
use poolsim_core::{Event, EventHandler, SimulationContext};

use crate::cloud::service::CloudService;
use crate::cloud::vm::VmState;
use crate::dispatch::progress::Progress;
use crate::error::ScalingError;
use crate::events::task::{TaskCancelled, TaskCompleted};
use crate::scaler::infrastructure::VirtualInfrastructure;
use crate::trace::Job;

/// Stateless dispatcher: a job goes to the first running idle VM of its
/// kind; otherwise the caller is told to queue it. Completion events come
/// back here and feed progress accounting.
pub struct FirstFitLauncher {
    infra: Rc<RefCell<VirtualInfrastructure>>,
    cloud: Rc<RefCell<CloudService>>,
    progress: Rc<RefCell<Progress>>,
    ctx: SimulationContext,
}

impl FirstFitLauncher {
    pub fn new(
        infra: Rc<RefCell<VirtualInfrastructure>>,
        cloud: Rc<RefCell<CloudService>>,
        progress: Rc<RefCell<Progress>>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            infra,
            cloud,
            progress,
            ctx,
        }
    }

    /// Tries to place the job on a VM of its kind.
    ///
    /// Returns `true` when the job needs further care (queueing): either no
    /// pool exists yet (the kind gets registered with the infrastructure as
    /// a side effect) or no running VM is idle. Returns `false` once the
    /// job is on a VM.
    pub fn launch(&self, job: &Rc<RefCell<Job>>) -> Result<bool, ScalingError> {
        let kind = job.borrow().kind().to_owned();
        let pool = self.infra.borrow().pool(&kind).cloned();
        let pool = match pool {
            Some(pool) => pool,
            None => {
                // unseen executable: have the infrastructure grow a pool
                // for it, the job itself has to wait
                self.infra.borrow_mut().register_kind(&kind);
                return Ok(true);
            }
        };
        let mut cloud = self.cloud.borrow_mut();
        for vm_id in pool {
            if cloud.vm_state(vm_id) == VmState::Running && cloud.vm_is_idle(vm_id) {
                // the task occupies the whole VM for the job's duration
                let work = job.borrow().exec_time as f64 * 1000. * cloud.per_tick_processing_power(vm_id);
                cloud.new_compute_task(vm_id, work, self.ctx.id())?;
                drop(cloud);
                self.progress.borrow_mut().register_dispatch();
                job.borrow_mut().start(self.ctx.time());
                log_trace!(self.ctx, "job #{} dispatched to vm #{}", job.borrow().id, vm_id);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl EventHandler for FirstFitLauncher {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            TaskCompleted { vm_id: _, task_id: _ } => {
                self.progress.borrow_mut().register_completion();
            }
            TaskCancelled { vm_id: _, task_id: _ } => {
                // the harness never cancels tasks
            }
        })
    }
}
