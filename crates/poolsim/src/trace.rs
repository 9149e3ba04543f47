//! Jobs and trace loading.

use serde::Deserialize;

use crate::error::ScalingError;

/// One job of the workload trace.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    /// Executable tag; jobs without one run on the `"default"` kind.
    pub executable: Option<String>,
    /// Submission time, seconds.
    pub submit_time: u64,
    /// Expected execution time, seconds.
    pub exec_time: u64,
    /// Time the job actually spent waiting before reaching a VM, seconds.
    /// Written by the harness when the job is dispatched.
    pub real_queue_time: f64,
    started: bool,
}

impl Job {
    pub fn new(id: u64, executable: Option<String>, submit_time: u64, exec_time: u64) -> Self {
        Self {
            id,
            executable,
            submit_time,
            exec_time,
            real_queue_time: 0.,
            started: false,
        }
    }

    /// The VM kind this job runs on.
    pub fn kind(&self) -> &str {
        self.executable.as_deref().unwrap_or("default")
    }

    /// Shifts the submission forward by whole seconds.
    pub fn adjust(&mut self, seconds: u64) {
        self.submit_time += seconds;
    }

    /// Submission instant on the simulation clock, ms.
    pub fn submit_time_ms(&self) -> f64 {
        self.submit_time as f64 * 1000.
    }

    /// Marks the job dispatched, recording its real queueing delay.
    pub fn start(&mut self, now_ms: f64) {
        self.started = true;
        self.real_queue_time = now_ms / 1000. - self.submit_time as f64;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

#[derive(Deserialize)]
struct TraceRecord {
    id: u64,
    submit_time: u64,
    exec_time: u64,
    executable: Option<String>,
}

/// Loads a workload trace from a CSV file with the columns
/// `id, submit_time, exec_time, executable` (times in seconds, executable
/// may be empty).
pub fn load_trace(file_name: &str) -> Result<Vec<Job>, ScalingError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_name)
        .map_err(|e| ScalingError::TraceLoad(format!("{}: {}", file_name, e)))?;
    let mut jobs = Vec::new();
    for record in reader.deserialize() {
        let record: TraceRecord = record.map_err(|e| ScalingError::TraceLoad(format!("{}: {}", file_name, e)))?;
        let executable = record.executable.filter(|e| !e.is_empty());
        jobs.push(Job::new(record.id, executable, record.submit_time, record.exec_time));
    }
    Ok(jobs)
}
