//! The retry/timeout executor: everything that happens between a
//! trigger firing and that firing reaching a terminal state.

use crate::errors::RunError;
use crate::orchestrator::{InFlightGuard, OrchestratorInner, TaskEntry};
use crate::task::{Task, TaskOutput, TaskState};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One firing of one task: gating, the attempt loop, state and metric
/// updates, hook dispatch. Never propagates an error; a task's failure
/// is contained here so it cannot take the worker pool down.
pub(crate) async fn fire(inner: Arc<OrchestratorInner>, task_id: String) {
    if !inner.accepting_firings() {
        debug!("firing of `{task_id}` dropped: orchestrator not accepting firings");
        return;
    }
    let Some(entry) = inner.entry(&task_id) else {
        debug!("firing of `{task_id}` dropped: task no longer registered");
        return;
    };
    if entry.paused.load(Ordering::SeqCst) {
        debug!("firing of `{task_id}` dropped: task is paused");
        return;
    }

    let _in_flight = InFlightGuard::new(&inner);

    // At-most-one-instance: a firing that arrives while the previous
    // one is still running is dropped, not queued.
    let Ok(_run_guard) = entry.run_guard.try_lock() else {
        warn!("firing of `{task_id}` dropped: previous firing still running");
        return;
    };

    let Some(_permit) = inner.acquire_worker().await else {
        return;
    };

    if let Some(condition) = entry.task.condition() {
        if !condition.check().await {
            entry.set_state(TaskState::Skipped);
            info!("task `{task_id}` skipped: condition returned false");
            return;
        }
    }

    // Checked fresh on every firing; satisfied dependencies are not
    // remembered from previous cycles.
    if let Some(missing) = inner.first_unmet_dependency(&entry.task) {
        entry.set_state(TaskState::Skipped);
        warn!("task `{task_id}` skipped: dependency `{missing}` has not completed");
        return;
    }

    run_attempt_loop(&inner, &entry).await;
}

/// Drives the body through up to `max_retries + 1` attempts with
/// exponential backoff in between. Durations recorded with each event
/// measure from the start of the firing, matching the metrics contract.
async fn run_attempt_loop(inner: &OrchestratorInner, entry: &Arc<TaskEntry>) {
    let task = &entry.task;
    let max_retries = task.retry().max_retries;
    let started = Instant::now();

    entry.set_state(TaskState::Running);

    for attempt in 0..=max_retries {
        match run_attempt(task).await {
            Ok(output) => {
                let duration = started.elapsed();
                entry.set_state(TaskState::Success);
                entry.record_run(duration, TaskState::Success);
                inner.mark_completed(task.id());
                task.hooks().success(task.id(), output).await;
                info!(
                    "task `{}` completed successfully in {:.2}s",
                    task.id(),
                    duration.as_secs_f64()
                );
                return;
            }
            Err(run_err) => {
                let failure = run_err.into_failure();

                if attempt < max_retries {
                    entry.set_state(TaskState::Retrying);
                    entry.record_run(started.elapsed(), TaskState::Retrying);
                    inner.bump_retries();

                    let delay = task.retry().delay_for(attempt);
                    warn!(
                        "task `{}` failed (attempt {}/{}), retrying in {:.0}s: {failure}",
                        task.id(),
                        attempt + 1,
                        max_retries + 1,
                        delay.as_secs_f64()
                    );
                    task.hooks().retry(task.id(), failure, attempt + 1).await;
                    tokio::time::sleep(delay).await;
                } else {
                    entry.set_state(TaskState::Failed);
                    entry.record_run(started.elapsed(), TaskState::Failed);
                    inner.bump_failures();

                    error!(
                        "task `{}` failed after {} attempt(s): {failure}",
                        task.id(),
                        max_retries + 1
                    );
                    task.hooks().failure(task.id(), failure).await;
                }
            }
        }
    }
}

/// One invocation of the body. The body always runs on its own spawned
/// task: that contains panics as join errors, and it lets a timeout
/// abandon the attempt without cancelling it. An abandoned body may
/// keep running detached; its result is discarded and never awaited
/// again (best-effort cancellation, not termination).
async fn run_attempt(task: &Task) -> Result<TaskOutput, RunError> {
    let body = task.body();
    let handle = tokio::spawn(async move { body.run().await });

    let joined = match task.timeout() {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_elapsed) => return Err(RunError::Timeout(limit)),
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(failure)) => Err(RunError::Body(failure)),
        Err(join_err) => Err(RunError::Panicked(join_err.to_string())),
    }
}
