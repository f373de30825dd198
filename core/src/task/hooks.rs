use crate::errors::TaskFailure;
use crate::task::TaskOutput;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Callback invoked once per firing that reaches terminal success,
/// receiving the body's output.
#[async_trait]
pub trait SuccessHook: Send + Sync + 'static {
    async fn call(&self, output: TaskOutput);
}

#[async_trait]
impl<F, Fut> SuccessHook for F
where
    F: Fn(TaskOutput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, output: TaskOutput) {
        self(output).await
    }
}

/// Callback invoked once per firing that exhausts its attempts,
/// receiving the terminal error.
#[async_trait]
pub trait FailureHook: Send + Sync + 'static {
    async fn call(&self, error: TaskFailure);
}

#[async_trait]
impl<F, Fut> FailureHook for F
where
    F: Fn(TaskFailure) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, error: TaskFailure) {
        self(error).await
    }
}

/// Callback invoked before each backoff sleep, receiving the attempt's
/// error and the 1-based number of the retry about to happen.
#[async_trait]
pub trait RetryHook: Send + Sync + 'static {
    async fn call(&self, error: TaskFailure, attempt: u32);
}

#[async_trait]
impl<F, Fut> RetryHook for F
where
    F: Fn(TaskFailure, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, error: TaskFailure, attempt: u32) {
        self(error, attempt).await
    }
}

/// The fixed callback surface of one task. All three hooks are
/// best-effort: they run on the worker driving the firing, and a panic
/// inside a hook is caught, logged and discarded. A hook can never
/// alter the task's recorded state or the attempt loop's outcome.
#[derive(Default, Clone)]
pub struct TaskHooks {
    pub(crate) on_success: Option<Arc<dyn SuccessHook>>,
    pub(crate) on_failure: Option<Arc<dyn FailureHook>>,
    pub(crate) on_retry: Option<Arc<dyn RetryHook>>,
}

impl TaskHooks {
    /// Runs a hook body on its own spawned task so a panic is contained
    /// as a join error instead of unwinding through the worker.
    async fn isolated<Fut>(task_id: &str, name: &str, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Err(join_err) = tokio::spawn(fut).await {
            error!("{name} hook failed for task `{task_id}`: {join_err}");
        }
    }

    pub(crate) async fn success(&self, task_id: &str, output: TaskOutput) {
        if let Some(hook) = &self.on_success {
            let hook = hook.clone();
            Self::isolated(task_id, "on_success", async move { hook.call(output).await }).await;
        }
    }

    pub(crate) async fn failure(&self, task_id: &str, error: TaskFailure) {
        if let Some(hook) = &self.on_failure {
            let hook = hook.clone();
            Self::isolated(task_id, "on_failure", async move { hook.call(error).await }).await;
        }
    }

    pub(crate) async fn retry(&self, task_id: &str, error: TaskFailure, attempt: u32) {
        if let Some(hook) = &self.on_retry {
            let hook = hook.clone();
            Self::isolated(task_id, "on_retry", async move {
                hook.call(error, attempt).await
            })
            .await;
        }
    }
}
