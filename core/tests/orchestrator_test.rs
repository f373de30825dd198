use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskloom::prelude::*;

fn fail(msg: &str) -> TaskFailure {
    Arc::new(std::io::Error::other(msg.to_string()))
}

fn manual_orchestrator() -> (Orchestrator, Arc<ManualTriggerEngine>) {
    let engine = Arc::new(ManualTriggerEngine::new());
    let orchestrator = Orchestrator::builder().engine(engine.clone()).build();
    (orchestrator, engine)
}

fn unused_trigger() -> TriggerSpec {
    TriggerSpec::interval(Duration::from_secs(3600))
}

async fn wait_for_state(orchestrator: &Orchestrator, id: &str, state: TaskState) {
    tokio::time::timeout(Duration::from_secs(600), async {
        while orchestrator.task_state(id) != Some(state) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for task `{id}` to reach {state}"));
}

fn counting_task(id: &str, runs: &Arc<AtomicUsize>) -> Task {
    let runs = runs.clone();
    Task::builder()
        .id(id)
        .body(move || {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskFailure>(output(()))
            }
        })
        .trigger(unused_trigger())
        .build()
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (orchestrator, _engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();
    let err = orchestrator
        .register(counting_task("job", &runs))
        .await
        .expect_err("second registration under the same id must fail");
    assert!(matches!(err, OrchestratorError::DuplicateTask(id) if id == "job"));
    assert_eq!(orchestrator.task_ids(), vec!["job".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn register_replace_swaps_the_definition_in_place() {
    let (orchestrator, engine) = manual_orchestrator();
    let old_runs = Arc::new(AtomicUsize::new(0));
    let new_runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &old_runs)).await.unwrap();
    orchestrator
        .register_replace(counting_task("job", &new_runs))
        .await
        .unwrap();
    orchestrator.start();

    assert!(engine.fire("job"));
    wait_for_state(&orchestrator, "job", TaskState::Success).await;

    assert_eq!(old_runs.load(Ordering::SeqCst), 0, "the replaced body is gone");
    assert_eq!(new_runs.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.task_ids().len(), 1);
}

#[tokio::test]
async fn deregister_is_idempotent_and_cancels_the_schedule() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();
    assert!(engine.is_scheduled("job"));

    orchestrator.deregister("job").await;
    assert!(!engine.is_scheduled("job"));
    assert!(orchestrator.task_ids().is_empty());
    assert_eq!(orchestrator.task_state("job"), None);

    // A second deregister, and one for an id that never existed, are
    // both no-ops.
    orchestrator.deregister("job").await;
    orchestrator.deregister("never-was").await;
}

#[tokio::test(start_paused = true)]
async fn firings_before_start_are_dropped() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();

    // Not started yet: the due-time arrives but nothing runs.
    assert!(engine.fire("job"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.task_state("job"), Some(TaskState::Pending));

    orchestrator.start();
    assert!(orchestrator.is_running());
    assert!(engine.fire("job"));
    wait_for_state(&orchestrator, "job", TaskState::Success).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn paused_tasks_drop_firings_until_resumed() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();
    orchestrator.start();

    orchestrator.pause("job").unwrap();
    assert!(engine.fire("job"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0, "paused tasks must not run");

    orchestrator.resume("job").unwrap();
    assert!(engine.fire("job"));
    wait_for_state(&orchestrator, "job", TaskState::Success).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pause_and_resume_reject_unknown_ids() {
    let (orchestrator, _engine) = manual_orchestrator();
    assert!(matches!(
        orchestrator.pause("ghost"),
        Err(OrchestratorError::UnknownTask(id)) if id == "ghost"
    ));
    assert!(matches!(
        orchestrator.resume("ghost"),
        Err(OrchestratorError::UnknownTask(id)) if id == "ghost"
    ));
}

#[tokio::test(start_paused = true)]
async fn overlapping_firings_of_one_task_are_dropped_not_queued() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(AtomicBool::new(false));

    let runs_probe = runs.clone();
    let release_probe = release.clone();
    let task = Task::builder()
        .id("long-haul")
        .body(move || {
            let runs = runs_probe.clone();
            let release = release_probe.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok::<_, TaskFailure>(output(()))
            }
        })
        .trigger(unused_trigger())
        .build();

    orchestrator.register(task).await.unwrap();
    orchestrator.start();

    assert!(engine.fire("long-haul"));
    tokio::time::timeout(Duration::from_secs(600), async {
        while runs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first firing must begin");

    // The previous firing is still inside the body.
    assert!(engine.fire("long-haul"));
    assert!(engine.fire("long-haul"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    release.store(true, Ordering::SeqCst);
    wait_for_state(&orchestrator, "long-haul", TaskState::Success).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1, "overlapping firings must be dropped");
}

#[tokio::test(start_paused = true)]
async fn shutdown_with_wait_drains_a_firing_stuck_in_backoff() {
    let (orchestrator, engine) = manual_orchestrator();
    let attempts = Arc::new(AtomicUsize::new(0));

    let attempts_probe = attempts.clone();
    let task = Task::builder()
        .id("draining")
        .body(move || {
            let attempts = attempts_probe.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<TaskOutput, _>(fail("still broken"))
            }
        })
        .trigger(unused_trigger())
        .retry(RetryPolicy::new(1, Duration::from_secs(5), 2.0))
        .build();

    orchestrator.register(task).await.unwrap();
    orchestrator.start();

    assert!(engine.fire("draining"));
    tokio::time::timeout(Duration::from_secs(600), async {
        while attempts.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first attempt must run");

    // The firing is now sleeping out its 5s backoff. A draining
    // shutdown must let it finish the retry, not abandon it mid-loop.
    orchestrator.shutdown(true).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2, "the in-flight retry must complete");
    assert_eq!(orchestrator.task_state("draining"), Some(TaskState::Failed));
    assert!(!orchestrator.is_running());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_schedules_and_drops_later_firings() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();
    orchestrator.start();

    assert!(engine.fire("job"));
    wait_for_state(&orchestrator, "job", TaskState::Success).await;

    orchestrator.shutdown(true).await;

    // The engine forgot the schedule, and even a stale due-time that
    // somehow arrived would be dropped.
    assert!(!engine.fire("job"));
    assert!(!orchestrator.is_running());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn global_metrics_aggregate_across_tasks() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("steady", &runs)).await.unwrap();
    let flaky = Task::builder()
        .id("flaky")
        .body(|| async { Err::<TaskOutput, _>(fail("nope")) })
        .trigger(unused_trigger())
        .retry(RetryPolicy::new(1, Duration::from_secs(1), 2.0))
        .build();
    orchestrator.register(flaky).await.unwrap();
    orchestrator.start();

    assert!(engine.fire("steady"));
    wait_for_state(&orchestrator, "steady", TaskState::Success).await;
    assert!(engine.fire("flaky"));
    wait_for_state(&orchestrator, "flaky", TaskState::Failed).await;

    let report = orchestrator.get_all_metrics();
    assert_eq!(report.global.total_jobs_executed, 1, "only successes count as executed");
    assert_eq!(report.global.total_failures, 1);
    assert_eq!(report.global.total_retries, 1);
    assert_eq!(report.global.total_tasks, 2);
    assert_eq!(report.global.completed_tasks, 1);
    assert!(report.global.is_running);
    assert!(report.global.start_time.is_some());
    assert!(report.global.uptime_seconds.is_some());

    assert_eq!(report.tasks["steady"].successes, 1);
    assert_eq!(report.tasks["flaky"].failures, 1);

    // The whole report serializes for export.
    let json = serde_json::to_value(&report).expect("report must serialize");
    assert_eq!(json["global"]["total_failures"], 1);
    assert_eq!(json["tasks"]["steady"]["successes"], 1);
}

#[tokio::test(start_paused = true)]
async fn reschedule_swaps_the_trigger_and_keeps_everything_else() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    orchestrator.register(counting_task("job", &runs)).await.unwrap();
    orchestrator.start();

    assert!(engine.fire("job"));
    wait_for_state(&orchestrator, "job", TaskState::Success).await;

    orchestrator
        .reschedule("job", TriggerSpec::interval(Duration::from_secs(5)))
        .await
        .unwrap();

    let trigger = orchestrator.task_trigger("job").unwrap();
    assert_eq!(trigger.arg("every_secs"), Some("5"));
    assert!(orchestrator.is_completed("job"), "completion survives a reschedule");
    assert_eq!(orchestrator.get_metrics("job").unwrap().successes, 1, "metrics survive");

    // The replaced schedule still drives the same firing pipeline.
    assert!(engine.fire("job"));
    tokio::time::timeout(Duration::from_secs(600), async {
        while runs.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("firing after reschedule must run");
}

#[tokio::test]
async fn reschedule_rejects_unknown_ids() {
    let (orchestrator, _engine) = manual_orchestrator();
    let err = orchestrator
        .reschedule("ghost", TriggerSpec::interval(Duration::from_secs(1)))
        .await
        .expect_err("unknown id must be rejected");
    assert!(matches!(err, OrchestratorError::UnknownTask(id) if id == "ghost"));
}

#[tokio::test(start_paused = true)]
async fn add_job_registers_with_defaults() {
    let (orchestrator, engine) = manual_orchestrator();
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_probe = runs.clone();
    orchestrator
        .add_job("quick", unused_trigger(), move || {
            let runs = runs_probe.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskFailure>(output(()))
            }
        })
        .await
        .unwrap();
    orchestrator.start();

    assert!(engine.fire("quick"));
    wait_for_state(&orchestrator, "quick", TaskState::Success).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
