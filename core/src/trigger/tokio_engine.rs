use crate::errors::TriggerError;
use crate::task::{TriggerKind, TriggerSpec};
use crate::trigger::{FiringCallback, TriggerEngine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a parsed trigger descriptor boils down to. Parsing happens
/// up-front in `schedule` so that a bad descriptor fails registration
/// synchronously instead of dying inside a timer loop.
enum FiringPlan {
    Interval { every: Duration, start_delay: Option<Duration> },
    Date { run_at: DateTime<Utc> },
    Cron { schedule: Schedule },
}

/// The default [`TriggerEngine`]: one spawned tokio timer loop per
/// schedule. Supported descriptors:
///
/// - `interval`: `every_secs` (float seconds, required), `start_delay_secs`
///   (float seconds, optional; defaults to one full interval).
/// - `date`: `run_at` (RFC 3339, required) fires exactly once.
/// - `cron`: `expr` (a `cron`-crate expression, required), evaluated
///   against UTC.
///
/// Anything else is rejected at `schedule` time with a [`TriggerError`].
#[derive(Default)]
pub struct TokioTriggerEngine {
    handles: DashMap<String, JoinHandle<()>>,
}

impl TokioTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(task_id: &str, spec: &TriggerSpec) -> Result<FiringPlan, TriggerError> {
        match spec.kind {
            TriggerKind::Interval => {
                let every = parse_secs(task_id, spec, "every_secs")?;
                let start_delay = match spec.arg("start_delay_secs") {
                    Some(_) => Some(parse_secs(task_id, spec, "start_delay_secs")?),
                    None => None,
                };
                if every.is_zero() {
                    return Err(invalid(task_id, "`every_secs` must be greater than zero"));
                }
                Ok(FiringPlan::Interval { every, start_delay })
            }
            TriggerKind::Date => {
                let raw = required(task_id, spec, "run_at")?;
                let run_at = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| invalid(task_id, format!("`run_at` is not RFC 3339: {e}")))?
                    .with_timezone(&Utc);
                Ok(FiringPlan::Date { run_at })
            }
            TriggerKind::Cron => {
                let expr = required(task_id, spec, "expr")?;
                let schedule = Schedule::from_str(expr)
                    .map_err(|e| invalid(task_id, format!("bad cron expression `{expr}`: {e}")))?;
                Ok(FiringPlan::Cron { schedule })
            }
        }
    }

    async fn run_plan(task_id: String, plan: FiringPlan, firing: FiringCallback) {
        match plan {
            FiringPlan::Interval { every, start_delay } => {
                tokio::time::sleep(start_delay.unwrap_or(every)).await;
                loop {
                    firing();
                    tokio::time::sleep(every).await;
                }
            }
            FiringPlan::Date { run_at } => {
                match (run_at - Utc::now()).to_std() {
                    Ok(wait) => tokio::time::sleep(wait).await,
                    // Already past due; fire immediately.
                    Err(_) => debug!("date trigger for `{task_id}` is past due, firing now"),
                }
                firing();
            }
            FiringPlan::Cron { schedule } => loop {
                let Some(next) = schedule.after(&Utc::now()).next() else {
                    warn!("cron schedule for `{task_id}` has no upcoming firing, stopping");
                    return;
                };
                if let Ok(wait) = (next - Utc::now()).to_std() {
                    tokio::time::sleep(wait).await;
                }
                firing();
            },
        }
    }
}

#[async_trait]
impl TriggerEngine for TokioTriggerEngine {
    async fn schedule(
        &self,
        task_id: &str,
        spec: &TriggerSpec,
        firing: FiringCallback,
    ) -> Result<(), TriggerError> {
        let plan = Self::parse(task_id, spec)?;
        let id = task_id.to_string();
        let handle = tokio::spawn(Self::run_plan(id, plan, firing));
        if let Some(previous) = self.handles.insert(task_id.to_string(), handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn cancel(&self, task_id: &str) {
        if let Some((_, handle)) = self.handles.remove(task_id) {
            handle.abort();
        }
    }

    async fn shutdown(&self) {
        self.handles.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

fn required<'a>(task_id: &str, spec: &'a TriggerSpec, key: &str) -> Result<&'a str, TriggerError> {
    spec.arg(key)
        .ok_or_else(|| invalid(task_id, format!("missing required argument `{key}`")))
}

fn parse_secs(task_id: &str, spec: &TriggerSpec, key: &str) -> Result<Duration, TriggerError> {
    let raw = required(task_id, spec, key)?;
    let secs: f64 = raw
        .parse()
        .map_err(|_| invalid(task_id, format!("`{key}` is not a number: `{raw}`")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid(task_id, format!("`{key}` must be a non-negative number")));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn invalid(task_id: &str, message: impl Into<String>) -> TriggerError {
    TriggerError::InvalidArgs {
        task_id: task_id.to_string(),
        message: message.into(),
    }
}
