//! Simulation events exchanged between the harness components.

// VM LIFECYCLE EVENTS /////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::cloud::vm::VmState;

    /// Emitted by the cloud to every state-change subscriber of a VM.
    #[derive(Clone, Serialize)]
    pub struct VmStateChanged {
        pub vm_id: u32,
        pub old_state: VmState,
        pub new_state: VmState,
    }

    /// Internal: attempts placement of a freshly requested VM.
    #[derive(Clone, Serialize)]
    pub struct PlaceVm {
        pub vm_id: u32,
    }

    /// Internal: the appliance image arrived on the hosting machine.
    #[derive(Clone, Serialize)]
    pub struct VmTransferCompleted {
        pub vm_id: u32,
    }

    /// Internal: the boot procedure finished, the VM is serving.
    #[derive(Clone, Serialize)]
    pub struct VmBootCompleted {
        pub vm_id: u32,
    }
}

// COMPUTE TASK EVENTS /////////////////////////////////////////////////////////////////////////////

pub mod task {
    use serde::Serialize;

    /// Internal: moves freshly accepted tasks from pending to running.
    #[derive(Clone, Serialize)]
    pub struct TaskStarted {
        pub vm_id: u32,
    }

    /// Internal: a running task has consumed all of its work.
    #[derive(Clone, Serialize)]
    pub struct TaskFinished {
        pub vm_id: u32,
        pub task_id: u64,
    }

    /// Delivered to the listener supplied with the task.
    #[derive(Clone, Serialize)]
    pub struct TaskCompleted {
        pub vm_id: u32,
        pub task_id: u64,
    }

    /// Delivered to the listener when a task is cancelled. This harness
    /// never initiates cancellation.
    #[derive(Clone, Serialize)]
    pub struct TaskCancelled {
        pub vm_id: u32,
        pub task_id: u64,
    }
}

// CONTROL PLANE EVENTS ////////////////////////////////////////////////////////////////////////////

pub mod scaling {
    use serde::Serialize;

    /// Periodic trigger of the autoscaling control loop.
    #[derive(Clone, Serialize)]
    pub struct ScalingTick {}

    /// Periodic trigger of the per-VM utilization sampling.
    #[derive(Clone, Serialize)]
    pub struct SampleUtilization {}
}

pub mod dispatch {
    use serde::Serialize;

    /// Self-armed trigger of the arrival handler, fired at job submit times.
    #[derive(Clone, Serialize)]
    pub struct ProcessJobArrivals {}

    /// Periodic retry trigger of the queue manager.
    #[derive(Clone, Serialize)]
    pub struct RetryQueuedJobs {}

    /// Broadcast by progress tracking once every traced job has completed.
    #[derive(Clone, Serialize)]
    pub struct AllJobsFinished {}
}
