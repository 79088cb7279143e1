//! Observability tests for the judging job lifecycle.
//!
//! These tests verify that structured tracing events are emitted for key
//! lifecycle points: submission, event application, stream loss, fallback
//! and job completion.

use hackjudge_client::fakes::{FetchReply, ScriptedJudgeApi};
use hackjudge_client::obs::{
    emit_event_applied, emit_frame_dropped, emit_job_finished, emit_job_reset,
    emit_job_submitted, emit_stream_lost, emit_submit_failed, emit_submit_rejected,
};
use hackjudge_client::{fetch_with_policy, FallbackPolicy, JobId, JobSpan};
use serde_json::json;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_job_submitted_logs_team() {
    emit_job_submitted("Team Rocket");
    assert!(logs_contain("job.submitted"));
    assert!(logs_contain("Team Rocket"));
}

#[traced_test]
#[test]
fn test_emit_submit_rejected_logs_phase() {
    emit_submit_rejected("streaming");
    assert!(logs_contain("job.submit_rejected"));
    assert!(logs_contain("streaming"));
}

#[traced_test]
#[test]
fn test_emit_event_applied_logs_kind_and_seq() {
    emit_event_applied("j1", "agent_started", 3);
    assert!(logs_contain("job.event_applied"));
    assert!(logs_contain("agent_started"));
}

#[traced_test]
#[test]
fn test_failure_hooks_log_reason() {
    emit_submit_failed(&"server error: 500");
    emit_frame_dropped("j1", &"frame is not valid JSON");
    emit_stream_lost("j1", "stream closed without a terminal event");

    assert!(logs_contain("server error: 500"));
    assert!(logs_contain("frame is not valid JSON"));
    assert!(logs_contain("job.stream_lost"));
}

#[traced_test]
#[test]
fn test_emit_job_finished_logs_duration() {
    emit_job_finished("j1", "verdict", 5000, 12);
    emit_job_reset("verdict");
    assert!(logs_contain("job.finished"));
    assert!(logs_contain("job.reset"));
}

#[traced_test]
#[test]
fn test_job_span_enter_creates_span() {
    let span = JobSpan::enter("span-job");
    tracing::info!("inside job span");
    drop(span);
    assert!(logs_contain("span-job"));
}

#[traced_test]
#[tokio::test]
async fn test_fallback_logs_each_attempt() {
    let api = ScriptedJudgeApi::new();
    api.push_fetch(FetchReply::status(503));
    api.push_fetch(FetchReply::body(json!({"scores": {"overall": 8}})));
    let policy = FallbackPolicy::default()
        .with_attempts(2)
        .with_interval(std::time::Duration::from_millis(1));

    let outcome = fetch_with_policy(&api, &JobId::new("j-obs"), &policy).await;

    assert_eq!(outcome.label(), "completed");
    assert!(logs_contain("job.fallback"));
    assert!(logs_contain("failed"));
    assert!(logs_contain("completed"));
}
