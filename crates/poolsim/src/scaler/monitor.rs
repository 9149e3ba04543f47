//! Sliding-window CPU utilization estimation for VMs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use poolsim_core::{on_event, Event, EventHandler, Id, SimulationContext};

use crate::cloud::service::CloudService;
use crate::cloud::vm::VmState;
use crate::error::ScalingError;
use crate::events::scaling::SampleUtilization;
use crate::events::vm::VmStateChanged;

/// Period between two utilization samples, ms.
pub const SAMPLE_PERIOD: f64 = 300_000.;
/// Samples kept per VM; 12 five-minute samples span one hour.
const WINDOW_SLOTS: usize = 12;
/// Milliseconds in the estimation window.
const WINDOW_MS: f64 = 3_600_000.;

/// Circular record of a VM's cumulative processed counter.
///
/// The divisor stays at infinity until the VM's first `Running` transition
/// latches the real maximum, so a booting VM reports zero utilization.
/// The scaler relies on that: a pre-running VM must not look destroyable
/// by a utilization threshold alone.
struct UtilizationWindow {
    samples: [f64; WINDOW_SLOTS],
    index: usize,
    max_hourly_work: f64,
    finished: bool,
}

impl UtilizationWindow {
    fn new(current_processed: f64, max_hourly_work: f64) -> Self {
        Self {
            samples: [current_processed; WINDOW_SLOTS],
            index: 0,
            max_hourly_work,
            finished: false,
        }
    }

    fn record(&mut self, processed: f64) {
        self.samples[self.index % WINDOW_SLOTS] = processed;
        self.index += 1;
    }

    fn hourly_utilization(&self) -> f64 {
        if self.index == 0 {
            return 0.;
        }
        let newest = self.samples[(self.index - 1) % WINDOW_SLOTS];
        let oldest = self.samples[self.index % WINDOW_SLOTS];
        (newest - oldest) / self.max_hourly_work
    }
}

/// Samples the cumulative processed counter of every monitored VM on a
/// shared five-minute cadence and answers hourly-utilization queries.
pub struct VmMonitoring {
    windows: HashMap<u32, UtilizationWindow>,
    cloud: Rc<RefCell<CloudService>>,
    sampling: bool,
    ctx: SimulationContext,
}

impl VmMonitoring {
    pub fn new(cloud: Rc<RefCell<CloudService>>, ctx: SimulationContext) -> Self {
        Self {
            windows: HashMap::new(),
            cloud,
            sampling: false,
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Begins monitoring a VM: fills the window with the VM's current
    /// processed counter and arms the sampling chain if it is not running.
    ///
    /// Restarting an already-monitored VM reinitialises its window but
    /// keeps an already-latched maximum.
    pub fn start(&mut self, vm_id: u32) {
        let processed = self.cloud.borrow_mut().total_processed(vm_id);
        let max_hourly_work = self
            .windows
            .get(&vm_id)
            .map(|w| w.max_hourly_work)
            .unwrap_or(f64::INFINITY);
        self.windows
            .insert(vm_id, UtilizationWindow::new(processed, max_hourly_work));
        if max_hourly_work.is_infinite() {
            self.cloud.borrow_mut().subscribe_state_change(vm_id, self.ctx.id());
        }
        if !self.sampling {
            self.sampling = true;
            self.ctx.emit_self(SampleUtilization {}, SAMPLE_PERIOD);
        }
    }

    /// Ends monitoring of a VM. The window is dropped on the next sampling
    /// fire. Stopping twice, or stopping an unmonitored VM, is a no-op.
    pub fn stop(&mut self, vm_id: u32) {
        if let Some(window) = self.windows.get_mut(&vm_id) {
            window.finished = true;
        }
    }

    /// Fraction of the maximum possible work the VM performed in the last
    /// hour, in `[0, 1]`. Fails with `MonitorInactive` once the monitor has
    /// been stopped.
    pub fn hourly_utilization(&self, vm_id: u32) -> Result<f64, ScalingError> {
        match self.windows.get(&vm_id) {
            Some(window) if !window.finished => Ok(window.hourly_utilization()),
            _ => Err(ScalingError::MonitorInactive(vm_id)),
        }
    }

    fn on_sample(&mut self) {
        let mut cloud = self.cloud.borrow_mut();
        self.windows.retain(|&vm_id, window| {
            if window.finished {
                return false;
            }
            window.record(cloud.total_processed(vm_id));
            true
        });
        drop(cloud);
        if self.windows.is_empty() {
            self.sampling = false;
        } else {
            self.ctx.emit_self(SampleUtilization {}, SAMPLE_PERIOD);
        }
    }

    fn on_state_changed(&mut self, vm_id: u32, new_state: VmState) {
        if new_state != VmState::Running {
            return;
        }
        if let Some(window) = self.windows.get_mut(&vm_id) {
            window.max_hourly_work = self.cloud.borrow().per_tick_processing_power(vm_id) * WINDOW_MS;
        }
        self.cloud.borrow_mut().unsubscribe_state_change(vm_id, self.ctx.id());
    }
}

impl EventHandler for VmMonitoring {
    fn on(&mut self, event: Event) {
        on_event!(event, {
            SampleUtilization {} => {
                self.on_sample();
            }
            VmStateChanged {
                vm_id,
                old_state: _,
                new_state,
            } => {
                self.on_state_changed(vm_id, new_state);
            }
        })
    }
}
