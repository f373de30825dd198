use crate::task::TaskState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Per-task rolling execution statistics, updated after every attempt
/// event (retry, terminal success, terminal failure). Skipped firings
/// never touch it.
///
/// Invariant: `total_runs == successes + failures + retries` after any
/// [`JobMetrics::record_run`] call. `avg_duration` averages the
/// durations of successful runs only and stays zero until the first
/// success.
#[derive(Debug, Default)]
pub struct JobMetrics {
    total_runs: u64,
    successes: u64,
    failures: u64,
    retries: u64,
    last_run_time: Option<DateTime<Utc>>,
    last_duration: Option<Duration>,
    last_state: Option<TaskState>,
    success_duration_total: Duration,
}

impl JobMetrics {
    /// Records one execution event. `duration` is the time elapsed
    /// since the firing began; `state` must be one of `Success`,
    /// `Failed` or `Retrying`.
    pub fn record_run(&mut self, duration: Duration, state: TaskState) {
        self.total_runs += 1;
        self.last_run_time = Some(Utc::now());
        self.last_duration = Some(duration);
        self.last_state = Some(state);

        match state {
            TaskState::Success => {
                self.successes += 1;
                self.success_duration_total += duration;
            }
            TaskState::Failed => self.failures += 1,
            TaskState::Retrying => self.retries += 1,
            _ => {}
        }
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn retries(&self) -> u64 {
        self.retries
    }

    pub fn last_run_time(&self) -> Option<DateTime<Utc>> {
        self.last_run_time
    }

    pub fn last_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    pub fn last_state(&self) -> Option<TaskState> {
        self.last_state
    }

    /// Arithmetic mean over the durations of successful runs, or zero
    /// before the first success.
    pub fn avg_duration(&self) -> Duration {
        if self.successes == 0 {
            Duration::ZERO
        } else {
            self.success_duration_total / self.successes as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_runs as f64
        }
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            total_runs: self.total_runs,
            successes: self.successes,
            failures: self.failures,
            retries: self.retries,
            success_rate: self.success_rate(),
            last_run_time: self.last_run_time,
            last_duration_secs: self.last_duration.map(|d| d.as_secs_f64()),
            last_state: self.last_state,
            avg_duration_secs: self.avg_duration().as_secs_f64(),
        }
    }
}

/// A serializable point-in-time copy of one task's [`JobMetrics`],
/// taken atomically under the same lock the updates use.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetricsSnapshot {
    pub total_runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub success_rate: f64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_duration_secs: Option<f64>,
    pub last_state: Option<TaskState>,
    pub avg_duration_secs: f64,
}
