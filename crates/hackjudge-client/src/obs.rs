//! Structured observability hooks for the judging job lifecycle.
//!
//! Every hook emits one `tracing` event with an `event = "job.*"` field so
//! log pipelines can filter on it. Filtering follows `HACKJUDGE_LOG` /
//! `RUST_LOG`, see [`crate::telemetry::init_tracing`].

use tracing::{debug, info, warn};

/// RAII guard that enters a job-scoped span.
///
/// ```ignore
/// let _span = JobSpan::enter("a1b2c3d4");
/// // tracing calls here carry job_id = "a1b2c3d4"
/// ```
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(job_id: &str) -> Self {
        let span = tracing::info_span!("hackjudge.job", job_id = %job_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_job_submitted(team_name: &str) {
    info!(event = "job.submitted", team_name = %team_name);
}

/// A submit arrived while another job was in flight or not yet reset.
pub fn emit_submit_rejected(phase: &str) {
    warn!(event = "job.submit_rejected", phase = %phase);
}

pub fn emit_job_created(job_id: &str) {
    info!(event = "job.created", job_id = %job_id);
}

pub fn emit_submit_failed(error: &dyn std::fmt::Display) {
    warn!(event = "job.submit_failed", error = %error);
}

pub fn emit_event_applied(job_id: &str, kind: &str, seq: u64) {
    debug!(event = "job.event_applied", job_id = %job_id, kind = %kind, seq = seq);
}

/// A frame failed to decode and was dropped.
pub fn emit_frame_dropped(job_id: &str, error: &dyn std::fmt::Display) {
    debug!(event = "job.frame_dropped", job_id = %job_id, error = %error);
}

/// The stream ended without a terminal event.
pub fn emit_stream_lost(job_id: &str, reason: &str) {
    warn!(event = "job.stream_lost", job_id = %job_id, reason = %reason);
}

pub fn emit_fallback_attempt(job_id: &str, attempt: u32, outcome: &str) {
    info!(
        event = "job.fallback",
        job_id = %job_id,
        attempt = attempt,
        outcome = %outcome,
    );
}

/// The job reached `verdict` or `error`.
pub fn emit_job_finished(job_id: &str, phase: &str, duration_ms: u64, total_events: u64) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        phase = %phase,
        duration_ms = duration_ms,
        total_events = total_events,
    );
}

pub fn emit_job_reset(previous_phase: &str) {
    info!(event = "job.reset", previous_phase = %previous_phase);
}
