pub mod body;

pub mod hooks;

pub mod metrics;

pub use body::*;

use crate::task::hooks::TaskHooks;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// The lifecycle states a task moves through across firings.
///
/// A registered task starts in [`TaskState::Pending`]. Each firing drives
/// it to [`TaskState::Running`] and then to one of the terminal states
/// ([`TaskState::Success`], [`TaskState::Failed`], [`TaskState::Skipped`]),
/// with the transient [`TaskState::Retrying`] in between failed attempts.
/// The machine is reused: the next firing moves a terminal state back to
/// `Running` (or directly to `Skipped` when gating fails).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
    Skipped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Retrying => "retrying",
            TaskState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// The trigger families a [`TriggerSpec`] can describe. The core never
/// interprets these; they are routed verbatim to the [`TriggerEngine`].
///
/// [`TriggerEngine`]: crate::trigger::TriggerEngine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cron,
    Interval,
    Date,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerKind::Cron => "cron",
            TriggerKind::Interval => "interval",
            TriggerKind::Date => "date",
        };
        f.write_str(name)
    }
}

/// An opaque scheduling descriptor: a [`TriggerKind`] plus a free-form
/// argument map that only the trigger engine gives meaning to.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub kind: TriggerKind,
    pub args: HashMap<String, String>,
}

impl TriggerSpec {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            args: HashMap::new(),
        }
    }

    /// Convenience constructor for the provided engine's cron trigger.
    pub fn cron(expr: impl Into<String>) -> Self {
        Self::new(TriggerKind::Cron).with_arg("expr", expr)
    }

    /// Convenience constructor for the provided engine's fixed-interval
    /// trigger.
    pub fn interval(every: Duration) -> Self {
        Self::new(TriggerKind::Interval).with_arg("every_secs", every.as_secs_f64().to_string())
    }

    /// Convenience constructor for the provided engine's one-shot trigger,
    /// firing once at `run_at` (RFC 3339).
    pub fn date(run_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self::new(TriggerKind::Date).with_arg("run_at", run_at.to_rfc3339())
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Exponential-backoff retry policy for a task's attempt loop.
///
/// `max_retries` counts *additional* attempts after the first, so a
/// policy with `max_retries = 2` yields at most three attempts. The
/// delay before re-running attempt `i` is
/// `retry_delay * retry_backoff^i`.
///
/// Backoff growth is unbounded by default; callers are responsible for
/// choosing sane `retry_backoff`/`max_retries` combinations. `max_delay`
/// is an optional, non-default cap for callers that want one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
            retry_backoff: 2.0,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration, retry_backoff: f64) -> Self {
        Self {
            max_retries,
            retry_delay,
            retry_backoff,
            max_delay: None,
        }
    }

    /// A policy that never retries: one attempt, no backoff.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    pub fn with_max_delay(mut self, cap: Duration) -> Self {
        self.max_delay = Some(cap);
        self
    }

    /// The backoff delay inserted after failed attempt `attempt`
    /// (0-indexed). Saturates at `Duration::MAX` once the exponential
    /// overflows instead of panicking mid-firing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.retry_delay.as_secs_f64() * self.retry_backoff.powi(attempt as i32);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// [`TaskConfig`] is the typed builder behind [`Task::builder`]; it is
/// not useful on its own and collapses into a [`Task`] on `build()`.
#[derive(TypedBuilder)]
#[builder(
    build_method(into = Task),
    mutators(
        /// Best-effort callback invoked with the body's output after a
        /// firing reaches terminal success.
        pub fn on_success(&mut self, hook: impl hooks::SuccessHook) {
            self.hooks.on_success = Some(Arc::new(hook));
        }

        /// Best-effort callback invoked with the terminal error after a
        /// firing exhausts its attempts.
        pub fn on_failure(&mut self, hook: impl hooks::FailureHook) {
            self.hooks.on_failure = Some(Arc::new(hook));
        }

        /// Best-effort callback invoked with the attempt error and the
        /// 1-based number of the upcoming retry, before each backoff
        /// sleep.
        pub fn on_retry(&mut self, hook: impl hooks::RetryHook) {
            self.hooks.on_retry = Some(Arc::new(hook));
        }
    )
)]
pub struct TaskConfig {
    /// Unique identity of the task within one orchestrator. Immutable
    /// once registered.
    #[builder(setter(into))]
    id: String,

    /// The unit of work itself. Any async callable returning
    /// `Result<TaskOutput, TaskFailure>` qualifies through the blanket
    /// impl on [`TaskBody`]; fixed invocation parameters are closure
    /// captures.
    #[builder(setter(transform = |body: impl TaskBody| Arc::new(body) as Arc<dyn TaskBody>))]
    body: Arc<dyn TaskBody>,

    /// The scheduling descriptor handed verbatim to the trigger engine.
    trigger: TriggerSpec,

    #[builder(default)]
    retry: RetryPolicy,

    /// Optional bound on a single attempt. Expiry fails the attempt with
    /// a timeout error; the body is abandoned, not cancelled.
    #[builder(default, setter(strip_option))]
    timeout: Option<Duration>,

    /// Ids of tasks that must have completed successfully (at least once
    /// this process lifetime) before this task's body may run.
    #[builder(default, setter(transform = |deps: &[&str]| deps.iter().map(|d| d.to_string()).collect()))]
    dependencies: Vec<String>,

    /// Optional predicate checked first on every firing; `false` skips
    /// the firing without counting it as a failure.
    #[builder(default, setter(transform = |cond: impl TaskCondition| Some(Arc::new(cond) as Arc<dyn TaskCondition>)))]
    condition: Option<Arc<dyn TaskCondition>>,

    #[builder(via_mutators(init = TaskHooks::default()))]
    hooks: TaskHooks,
}

impl From<TaskConfig> for Task {
    fn from(config: TaskConfig) -> Self {
        Self {
            id: config.id,
            body: config.body,
            trigger: config.trigger,
            retry: config.retry,
            timeout: config.timeout,
            dependencies: config.dependencies,
            condition: config.condition,
            hooks: config.hooks,
        }
    }
}

/// An immutable-after-creation description of one schedulable unit of
/// work. Construction goes through [`Task::builder`]; the orchestrator
/// owns the task exclusively from registration until deregistration and
/// keeps the mutable run-time state (current state, retry counter,
/// metrics) alongside it in its registry.
pub struct Task {
    id: String,
    body: Arc<dyn TaskBody>,
    trigger: TriggerSpec,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    dependencies: Vec<String>,
    condition: Option<Arc<dyn TaskCondition>>,
    hooks: TaskHooks,
}

impl Task {
    pub fn builder() -> TaskConfigBuilder {
        TaskConfig::builder()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub(crate) fn body(&self) -> Arc<dyn TaskBody> {
        self.body.clone()
    }

    pub(crate) fn condition(&self) -> Option<&Arc<dyn TaskCondition>> {
        self.condition.as_ref()
    }

    pub(crate) fn hooks(&self) -> &TaskHooks {
        &self.hooks
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
