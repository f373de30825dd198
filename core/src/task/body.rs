use crate::errors::TaskFailure;
use async_trait::async_trait;
use std::any::Any;

/// The opaque value a successful body produces. The orchestrator never
/// inspects it; it is handed as-is to the task's `on_success` hook.
pub type TaskOutput = Box<dyn Any + Send>;

/// [`TaskBody`] is the unit of work a [`Task`] wraps: any async callable
/// producing a value or an error. The orchestrator places no constraints
/// on the output beyond moving it opaquely into `on_success`.
///
/// # Trait Implementation(s)
/// [`TaskBody`] is implemented for any `Fn() -> Future` closure whose
/// future resolves to `Result<TaskOutput, TaskFailure>`, so plain async
/// closures can be passed to [`Task::builder`] directly. Fixed invocation
/// parameters are expressed as closure captures.
///
/// # See Also
/// - [`Task`]
/// - [`TaskCondition`]
///
/// [`Task`]: crate::task::Task
/// [`Task::builder`]: crate::task::Task::builder
#[async_trait]
pub trait TaskBody: Send + Sync + 'static {
    async fn run(&self) -> Result<TaskOutput, TaskFailure>;
}

#[async_trait]
impl<F, Fut> TaskBody for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskFailure>> + Send + 'static,
{
    async fn run(&self) -> Result<TaskOutput, TaskFailure> {
        self().await
    }
}

/// An optional zero-argument predicate gating a task's firing. When it
/// returns `false` the firing is skipped, not failed: no attempt is
/// made, no failure hook fires and no run is recorded.
///
/// # Trait Implementation(s)
/// Implemented for any `Fn() -> Future<Output = bool>` closure.
#[async_trait]
pub trait TaskCondition: Send + Sync + 'static {
    async fn check(&self) -> bool;
}

#[async_trait]
impl<F, Fut> TaskCondition for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn check(&self) -> bool {
        self().await
    }
}

/// Wraps a plain success value in the [`TaskOutput`] erasure. Purely a
/// readability helper for bodies that return something.
pub fn output<T: Any + Send>(value: T) -> TaskOutput {
    Box::new(value)
}
