//! # taskloom
//!
//! A single-process task-orchestration core. Tasks are declared once
//! (body, trigger descriptor, retry policy, timeout, dependencies,
//! lifecycle hooks) and handed to an [`Orchestrator`], which fires them
//! whenever the configured [`TriggerEngine`] says they are due.
//!
//! On each firing the orchestrator checks the task's optional condition
//! and its dependency set, then drives the body through a bounded-time,
//! exponential-backoff retry loop while recording per-task and global
//! execution metrics.
//!
//! The crate deliberately does *not* persist task state, coordinate
//! across processes, or guarantee exactly-once delivery. It is a
//! best-effort, at-most-one-concurrent-instance-per-task orchestrator.
//!
//! [`Orchestrator`]: crate::orchestrator::Orchestrator
//! [`TriggerEngine`]: crate::trigger::TriggerEngine

pub mod errors;

pub mod orchestrator;

pub mod task;

pub mod trigger;

pub mod prelude {
    pub use crate::errors::{OrchestratorError, RunError, TaskFailure, TriggerError};
    pub use crate::orchestrator::signals;
    pub use crate::orchestrator::{GlobalMetricsSnapshot, MetricsReport, Orchestrator};
    pub use crate::task::body::output;
    pub use crate::task::metrics::{JobMetrics, JobMetricsSnapshot};
    pub use crate::task::{
        RetryPolicy, Task, TaskBody, TaskCondition, TaskOutput, TaskState, TriggerKind,
        TriggerSpec,
    };
    pub use crate::trigger::manual::ManualTriggerEngine;
    pub use crate::trigger::tokio_engine::TokioTriggerEngine;
    pub use crate::trigger::{FiringCallback, TriggerEngine};
}
