pub mod executor;

pub mod signals;

use crate::errors::OrchestratorError;
use crate::task::metrics::{JobMetrics, JobMetricsSnapshot};
use crate::task::{Task, TaskBody, TaskState, TriggerSpec};
use crate::trigger::tokio_engine::TokioTriggerEngine;
use crate::trigger::{FiringCallback, TriggerEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{info, warn};
use typed_builder::TypedBuilder;

/// Aggregate execution counters owned by the orchestrator, mutated only
/// from the execution-event path.
#[derive(Debug, Default)]
struct GlobalMetrics {
    total_jobs_executed: u64,
    total_failures: u64,
    total_retries: u64,
    start_time: Option<DateTime<Utc>>,
}

/// A serializable point-in-time copy of the orchestrator-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalMetricsSnapshot {
    pub total_jobs_executed: u64,
    pub total_failures: u64,
    pub total_retries: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<f64>,
    pub is_running: bool,
    pub total_tasks: usize,
    pub completed_tasks: usize,
}

/// The full metrics surface: the global snapshot plus one
/// [`JobMetricsSnapshot`] per registered task.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub global: GlobalMetricsSnapshot,
    pub tasks: HashMap<String, JobMetricsSnapshot>,
}

/// One registered task plus its mutable run-time state. The descriptor
/// itself stays immutable; state and metrics live behind their own
/// locks so firings of different tasks never contend.
pub(crate) struct TaskEntry {
    pub(crate) task: Task,
    /// The authoritative trigger descriptor; diverges from
    /// `task.trigger()` after a reschedule.
    trigger: Mutex<TriggerSpec>,
    state: Mutex<TaskState>,
    metrics: Mutex<JobMetrics>,
    pub(crate) paused: AtomicBool,
    /// At-most-one-instance guard: a firing that cannot take this
    /// immediately is dropped, never queued.
    pub(crate) run_guard: tokio::sync::Mutex<()>,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        let trigger = task.trigger().clone();
        Self {
            task,
            trigger: Mutex::new(trigger),
            state: Mutex::new(TaskState::Pending),
            metrics: Mutex::new(JobMetrics::default()),
            paused: AtomicBool::new(false),
            run_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn trigger(&self) -> TriggerSpec {
        unpoisoned(self.trigger.lock()).clone()
    }

    fn set_trigger(&self, spec: TriggerSpec) {
        *unpoisoned(self.trigger.lock()) = spec;
    }

    pub(crate) fn state(&self) -> TaskState {
        *unpoisoned(self.state.lock())
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *unpoisoned(self.state.lock()) = state;
    }

    pub(crate) fn record_run(&self, duration: Duration, state: TaskState) {
        unpoisoned(self.metrics.lock()).record_run(duration, state);
    }

    fn metrics_snapshot(&self) -> JobMetricsSnapshot {
        unpoisoned(self.metrics.lock()).snapshot()
    }
}

/// The shared mutable state of the orchestrator: task registry, the
/// set of task ids that completed successfully this process lifetime
/// (the dependency tracker) and the global counters. One coarse lock
/// guards all three; registry operations are rare next to firings, so
/// the reduced parallelism is an accepted trade for a single, ordering-
/// free lock.
struct Registry {
    tasks: HashMap<String, Arc<TaskEntry>>,
    completed: HashSet<String>,
    global: GlobalMetrics,
}

pub(crate) struct OrchestratorInner {
    engine: Arc<dyn TriggerEngine>,
    registry: Mutex<Registry>,
    /// Bounds how many firings run their pipeline concurrently.
    worker_permits: Semaphore,
    running: AtomicBool,
    shutting_down: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl OrchestratorInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        unpoisoned(self.registry.lock())
    }

    pub(crate) fn accepting_firings(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) fn entry(&self, task_id: &str) -> Option<Arc<TaskEntry>> {
        self.registry().tasks.get(task_id).cloned()
    }

    pub(crate) async fn acquire_worker(&self) -> Option<tokio::sync::SemaphorePermit<'_>> {
        self.worker_permits.acquire().await.ok()
    }

    /// Fresh membership check against the completed-set, done on every
    /// firing. Nothing is remembered across firings.
    pub(crate) fn first_unmet_dependency(&self, task: &Task) -> Option<String> {
        let registry = self.registry();
        task.dependencies()
            .iter()
            .find(|dep| !registry.completed.contains(*dep))
            .cloned()
    }

    pub(crate) fn mark_completed(&self, task_id: &str) {
        let mut registry = self.registry();
        registry.completed.insert(task_id.to_string());
        registry.global.total_jobs_executed += 1;
    }

    pub(crate) fn bump_retries(&self) {
        self.registry().global.total_retries += 1;
    }

    pub(crate) fn bump_failures(&self) {
        self.registry().global.total_failures += 1;
    }

    async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
    }
}

/// Decrements the in-flight counter when a firing ends for any reason,
/// waking a draining `shutdown(wait = true)` once the count hits zero.
pub(crate) struct InFlightGuard<'a>(&'a OrchestratorInner);

impl<'a> InFlightGuard<'a> {
    pub(crate) fn new(inner: &'a OrchestratorInner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// [`OrchestratorConfig`] is the typed builder behind
/// [`Orchestrator::builder`]; it collapses into an [`Orchestrator`] on
/// `build()`.
#[derive(TypedBuilder)]
#[builder(build_method(into = Orchestrator))]
pub struct OrchestratorConfig {
    /// The [`TriggerEngine`] deciding when tasks become due.
    ///
    /// # Default Value
    /// A fresh [`TokioTriggerEngine`].
    #[builder(default = Arc::new(TokioTriggerEngine::new()))]
    engine: Arc<dyn TriggerEngine>,

    /// Upper bound on concurrently running firings.
    ///
    /// # Default Value
    /// 10 workers.
    #[builder(default = 10)]
    max_workers: usize,
}

impl From<OrchestratorConfig> for Orchestrator {
    fn from(config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                engine: config.engine,
                registry: Mutex::new(Registry {
                    tasks: HashMap::new(),
                    completed: HashSet::new(),
                    global: GlobalMetrics::default(),
                }),
                worker_permits: Semaphore::new(config.max_workers),
                running: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }
}

/// The orchestration core. Owns the task registry, the dependency
/// tracker and the global metrics; delegates "when does a task fire"
/// to its [`TriggerEngine`] and runs each firing through the
/// retry/timeout executor on a bounded worker pool.
///
/// # Constructor(s)
/// Built via [`Orchestrator::builder`]; every knob has a default, so
/// `Orchestrator::builder().build()` is a working instance using the
/// [`TokioTriggerEngine`].
///
/// # Example
/// ```ignore
/// let orchestrator = Orchestrator::builder().max_workers(4).build();
/// orchestrator.register(
///     Task::builder()
///         .id("nightly-sync")
///         .body(|| async { Ok(taskloom::task::output(())) })
///         .trigger(TriggerSpec::cron("0 0 3 * * * *"))
///         .build(),
/// ).await?;
/// orchestrator.start();
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfig::builder()
    }

    /// Adds a task to the registry and schedules it with the trigger
    /// engine. Fails with [`OrchestratorError::DuplicateTask`] when the
    /// id is already taken; use [`Orchestrator::register_replace`] for
    /// explicit replacement.
    pub async fn register(&self, task: Task) -> Result<(), OrchestratorError> {
        self.register_with(task, false).await
    }

    /// Like [`Orchestrator::register`], but atomically replaces any
    /// prior registration under the same id. The replaced task's
    /// schedule is cancelled; its completed-set membership is kept.
    pub async fn register_replace(&self, task: Task) -> Result<(), OrchestratorError> {
        self.register_with(task, true).await
    }

    async fn register_with(&self, task: Task, replace: bool) -> Result<(), OrchestratorError> {
        let id = task.id().to_string();
        let spec = task.trigger().clone();
        let previous = {
            let mut registry = self.inner.registry();
            if !replace && registry.tasks.contains_key(&id) {
                return Err(OrchestratorError::DuplicateTask(id));
            }
            for dep in task.dependencies() {
                if !registry.tasks.contains_key(dep) {
                    warn!("task `{id}` depends on `{dep}`, which is not registered yet");
                }
            }
            registry.tasks.insert(id.clone(), Arc::new(TaskEntry::new(task)))
        };

        let firing = self.firing_callback(id.clone());
        if let Err(err) = self.inner.engine.schedule(&id, &spec, firing).await {
            // The engine rejected the descriptor before touching its own
            // schedule, so restoring the displaced entry (if any) puts
            // the registration back exactly as it was.
            let mut registry = self.inner.registry();
            match previous {
                Some(old) => {
                    registry.tasks.insert(id, old);
                }
                None => {
                    registry.tasks.remove(&id);
                }
            }
            return Err(err.into());
        }

        info!("task `{id}` registered with trigger `{}`", spec.kind);
        Ok(())
    }

    /// Simplified registration mirroring the common case: an id, a
    /// trigger and a body, with default retry policy and no gating.
    pub async fn add_job(
        &self,
        task_id: impl Into<String>,
        trigger: TriggerSpec,
        body: impl TaskBody,
    ) -> Result<(), OrchestratorError> {
        let task = Task::builder().id(task_id).body(body).trigger(trigger).build();
        self.register(task).await
    }

    /// Moves a registered task onto a new trigger descriptor without
    /// deregistering it: state, metrics and completed-set membership
    /// all survive. When the engine rejects the new descriptor the old
    /// schedule keeps running untouched.
    pub async fn reschedule(
        &self,
        task_id: &str,
        trigger: TriggerSpec,
    ) -> Result<(), OrchestratorError> {
        let entry = self
            .inner
            .entry(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))?;
        let firing = self.firing_callback(task_id.to_string());
        self.inner.engine.schedule(task_id, &trigger, firing).await?;
        info!("task `{task_id}` rescheduled to trigger `{}`", trigger.kind);
        entry.set_trigger(trigger);
        Ok(())
    }

    /// Removes a task from the registry and the trigger engine, and
    /// forgets its completed-set membership. Idempotent: an unknown id
    /// is logged at warning level and otherwise ignored.
    pub async fn deregister(&self, task_id: &str) {
        let removed = {
            let mut registry = self.inner.registry();
            registry.completed.remove(task_id);
            registry.tasks.remove(task_id)
        };
        self.inner.engine.cancel(task_id).await;
        match removed {
            Some(_) => info!("task `{task_id}` deregistered"),
            None => warn!("deregister: task `{task_id}` is not registered"),
        }
    }

    /// Begins accepting firings and stamps the global start time. Does
    /// nothing when already running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.registry().global.start_time = Some(Utc::now());
        info!("orchestrator started");
    }

    /// [`Orchestrator::start`], then parks the calling future on a
    /// low-overhead poll loop until shutdown is requested, so a main
    /// function has something to await.
    pub async fn start_blocking(&self) {
        self.start();
        info!("orchestrator running in blocking mode");
        while !self.inner.shutting_down.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Stops accepting new firings and cancels every engine schedule.
    /// With `wait`, blocks until all in-flight firings (bodies *and*
    /// their backoff sleeps) reach a terminal state. Firings already
    /// running are never interrupted.
    pub async fn shutdown(&self, wait: bool) {
        let first = !self.inner.shutting_down.swap(true, Ordering::SeqCst);
        if first {
            self.inner.engine.shutdown().await;
            info!("orchestrator shutting down (wait: {wait})");
        }
        if wait {
            self.inner.drain().await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Suspends future firings of one task without deregistering it.
    pub fn pause(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let entry = self
            .inner
            .entry(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))?;
        entry.paused.store(true, Ordering::SeqCst);
        info!("task `{task_id}` paused");
        Ok(())
    }

    /// Reactivates firings of a previously paused task.
    pub fn resume(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let entry = self
            .inner
            .entry(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.to_string()))?;
        entry.paused.store(false, Ordering::SeqCst);
        info!("task `{task_id}` resumed");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.accepting_firings()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.inner.registry().tasks.keys().cloned().collect()
    }

    /// The task's current lifecycle state, or `None` for unknown ids.
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.inner.entry(task_id).map(|entry| entry.state())
    }

    /// The trigger descriptor the task currently runs under, reflecting
    /// any reschedules since registration. `None` for unknown ids.
    pub fn task_trigger(&self, task_id: &str) -> Option<TriggerSpec> {
        self.inner.entry(task_id).map(|entry| entry.trigger())
    }

    /// Whether the task has completed successfully at least once this
    /// process lifetime (dependency-tracker membership).
    pub fn is_completed(&self, task_id: &str) -> bool {
        self.inner.registry().completed.contains(task_id)
    }

    /// Read-only snapshot of one task's metrics, taken under the same
    /// lock the updates use.
    pub fn get_metrics(&self, task_id: &str) -> Option<JobMetricsSnapshot> {
        self.inner.entry(task_id).map(|entry| entry.metrics_snapshot())
    }

    /// Read-only snapshot of the global counters plus every task's
    /// metrics.
    pub fn get_all_metrics(&self) -> MetricsReport {
        let registry = self.inner.registry();
        let tasks = registry
            .tasks
            .iter()
            .map(|(id, entry)| (id.clone(), entry.metrics_snapshot()))
            .collect();
        let global = &registry.global;
        MetricsReport {
            global: GlobalMetricsSnapshot {
                total_jobs_executed: global.total_jobs_executed,
                total_failures: global.total_failures,
                total_retries: global.total_retries,
                start_time: global.start_time,
                uptime_seconds: global
                    .start_time
                    .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0),
                is_running: self.is_running(),
                total_tasks: registry.tasks.len(),
                completed_tasks: registry.completed.len(),
            },
            tasks,
        }
    }

    /// The callback handed to the trigger engine: each invocation
    /// spawns one firing pipeline. Holds only a weak reference so an
    /// engine keeping callbacks alive cannot leak the orchestrator.
    fn firing_callback(&self, task_id: String) -> FiringCallback {
        let weak: Weak<OrchestratorInner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let task_id = task_id.clone();
                tokio::spawn(async move {
                    executor::fire(inner, task_id).await;
                });
            }
        })
    }
}

fn unpoisoned<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}
