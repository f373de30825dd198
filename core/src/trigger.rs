pub mod manual;

pub mod tokio_engine;

use crate::errors::TriggerError;
use crate::task::TriggerSpec;
use async_trait::async_trait;
use std::sync::Arc;

/// The callback an engine invokes at each due time. Invocations must be
/// cheap and non-blocking; the orchestrator's callback only spawns the
/// firing pipeline onto the worker pool.
pub type FiringCallback = Arc<dyn Fn() + Send + Sync>;

/// [`TriggerEngine`] is the seam between the orchestration core and the
/// machinery that decides *when* a task becomes due. The core hands the
/// engine an opaque [`TriggerSpec`] at registration and expects the
/// engine to invoke the firing callback at every due time; it never
/// interprets trigger arguments itself, and cron/interval/calendar
/// arithmetic lives entirely behind this trait.
///
/// # Required Method(s)
/// Implementors supply [`TriggerEngine::schedule`], [`TriggerEngine::cancel`]
/// and [`TriggerEngine::shutdown`]. `schedule` is the only place trigger
/// arguments are validated; rejecting a descriptor fails the caller's
/// `register` call and nothing else.
///
/// # Trait Implementation(s)
/// Two engines ship with the crate: [`TokioTriggerEngine`], a timer-loop
/// engine understanding the `cron`, `interval` and `date` families, and
/// [`ManualTriggerEngine`], which only fires on demand and exists for
/// deterministic tests and embedding callers that drive firings
/// themselves.
///
/// # Object Safety
/// [`TriggerEngine`] is object safe; the orchestrator stores it as
/// `Arc<dyn TriggerEngine>`.
///
/// # See Also
/// - [`TokioTriggerEngine`]
/// - [`ManualTriggerEngine`]
///
/// [`TokioTriggerEngine`]: crate::trigger::tokio_engine::TokioTriggerEngine
/// [`ManualTriggerEngine`]: crate::trigger::manual::ManualTriggerEngine
#[async_trait]
pub trait TriggerEngine: Send + Sync + 'static {
    /// Registers a schedule for `task_id` described by `spec`, invoking
    /// `firing` at each due time until cancelled.
    async fn schedule(
        &self,
        task_id: &str,
        spec: &TriggerSpec,
        firing: FiringCallback,
    ) -> Result<(), TriggerError>;

    /// Drops the schedule for `task_id`. Unknown ids are a no-op.
    async fn cancel(&self, task_id: &str);

    /// Drops every schedule; no callback fires afterwards.
    async fn shutdown(&self);
}
