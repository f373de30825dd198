use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The erased failure value a task body reports and lifecycle hooks
/// receive. Bodies may fail with any error type; the orchestrator only
/// ever logs it, counts it and hands it to `on_retry`/`on_failure`.
pub type TaskFailure = Arc<dyn std::error::Error + Send + Sync>;

/// Errors surfaced synchronously to callers of the registry operations
/// ([`Orchestrator::register`], [`Orchestrator::pause`] and friends).
/// These are fatal to the single call, never to the orchestrator itself.
///
/// [`Orchestrator::register`]: crate::orchestrator::Orchestrator::register
/// [`Orchestrator::pause`]: crate::orchestrator::Orchestrator::pause
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A task with the same id is already registered. Use
    /// [`Orchestrator::register_replace`] when replacement is intended.
    ///
    /// [`Orchestrator::register_replace`]: crate::orchestrator::Orchestrator::register_replace
    #[error("task `{0}` is already registered")]
    DuplicateTask(String),

    /// The given id does not correspond to any registered task.
    #[error("task `{0}` is not registered")]
    UnknownTask(String),

    /// The trigger engine rejected the task's trigger descriptor.
    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// Errors produced by a [`TriggerEngine`] when it is asked to schedule
/// a trigger descriptor it cannot honor. The core never validates
/// trigger arguments itself; this is the engine's verdict.
///
/// [`TriggerEngine`]: crate::trigger::TriggerEngine
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("invalid arguments for trigger of task `{task_id}`: {message}")]
    InvalidArgs { task_id: String, message: String },
}

/// The failure of a single attempt inside the retry loop. All variants
/// are retried identically under the task's [`RetryPolicy`].
///
/// [`RetryPolicy`]: crate::task::RetryPolicy
#[derive(Error, Debug)]
pub enum RunError {
    /// The attempt exceeded the task's timeout. The body itself is
    /// abandoned, not cancelled; it may keep running detached but its
    /// result is discarded.
    #[error("attempt exceeded the timeout of {0:?}")]
    Timeout(Duration),

    /// The body returned an error.
    #[error("{0}")]
    Body(TaskFailure),

    /// The body panicked. The panic is contained by the spawned
    /// execution context and reported here as a plain failure.
    #[error("task body panicked: {0}")]
    Panicked(String),
}

impl RunError {
    /// Erases the attempt failure into the [`TaskFailure`] shape that
    /// lifecycle hooks receive.
    pub fn into_failure(self) -> TaskFailure {
        match self {
            RunError::Body(inner) => inner,
            other => Arc::new(other),
        }
    }
}
