use std::time::Duration;
use taskloom::prelude::*;

#[test]
fn total_runs_always_equals_event_sum() {
    let mut metrics = JobMetrics::default();

    metrics.record_run(Duration::from_secs(1), TaskState::Retrying);
    metrics.record_run(Duration::from_secs(2), TaskState::Retrying);
    metrics.record_run(Duration::from_secs(3), TaskState::Failed);
    metrics.record_run(Duration::from_secs(1), TaskState::Success);

    assert_eq!(metrics.total_runs(), 4);
    assert_eq!(
        metrics.total_runs(),
        metrics.successes() + metrics.failures() + metrics.retries()
    );
    assert_eq!(metrics.successes(), 1);
    assert_eq!(metrics.failures(), 1);
    assert_eq!(metrics.retries(), 2);
}

#[test]
fn avg_duration_is_mean_of_successful_runs_only() {
    let mut metrics = JobMetrics::default();
    assert_eq!(metrics.avg_duration(), Duration::ZERO, "undefined before first success");

    metrics.record_run(Duration::from_secs_f64(9.0), TaskState::Failed);
    assert_eq!(metrics.avg_duration(), Duration::ZERO, "failures never contribute");

    metrics.record_run(Duration::from_secs_f64(1.5), TaskState::Success);
    metrics.record_run(Duration::from_secs_f64(2.1), TaskState::Success);

    let avg = metrics.avg_duration().as_secs_f64();
    assert!((avg - 1.8).abs() < 1e-9, "expected mean 1.8, got {avg}");
}

#[test]
fn success_rate_counts_all_events() {
    let mut metrics = JobMetrics::default();
    assert_eq!(metrics.success_rate(), 0.0);

    metrics.record_run(Duration::from_secs(1), TaskState::Success);
    assert_eq!(metrics.success_rate(), 1.0);

    metrics.record_run(Duration::from_secs(1), TaskState::Retrying);
    metrics.record_run(Duration::from_secs(1), TaskState::Failed);
    metrics.record_run(Duration::from_secs(1), TaskState::Success);

    assert_eq!(metrics.success_rate(), 0.5);
}

#[test]
fn last_fields_track_most_recent_event() {
    let mut metrics = JobMetrics::default();
    assert!(metrics.last_run_time().is_none());
    assert!(metrics.last_state().is_none());

    metrics.record_run(Duration::from_millis(250), TaskState::Retrying);
    assert_eq!(metrics.last_state(), Some(TaskState::Retrying));
    assert_eq!(metrics.last_duration(), Some(Duration::from_millis(250)));

    metrics.record_run(Duration::from_millis(750), TaskState::Success);
    assert_eq!(metrics.last_state(), Some(TaskState::Success));
    assert_eq!(metrics.last_duration(), Some(Duration::from_millis(750)));
    assert!(metrics.last_run_time().is_some());
}

#[test]
fn snapshot_serializes_with_stable_field_names() {
    let mut metrics = JobMetrics::default();
    metrics.record_run(Duration::from_secs(2), TaskState::Success);

    let json = serde_json::to_value(metrics.snapshot()).expect("snapshot must serialize");

    assert_eq!(json["total_runs"], 1);
    assert_eq!(json["successes"], 1);
    assert_eq!(json["success_rate"], 1.0);
    assert_eq!(json["last_state"], "success");
    assert_eq!(json["avg_duration_secs"], 2.0);
    assert!(json["last_run_time"].is_string());
}
