//! Job phase state machine.
//!
//! [`JobState`] owns everything derived from one job: the phase, the
//! activity log, agent progress, and the terminal result or error. It does
//! no I/O. Each transition tells the caller what to do with the transport
//! through a [`Directive`], which keeps the machine testable on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, PhaseError};
use crate::event::{decode_frame, DecodedFrame, JobEvent};
use crate::fallback::{FallbackOutcome, Recovery};
use crate::registry::AgentRegistry;
use crate::result::JudgingResult;
use crate::tracker::{progress_of, status_of, AgentStatus, AgentTracker, ConcurrencyPolicy};

/// Opaque job identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top-level lifecycle of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Verdict,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Submitting => "submitting",
            Phase::Streaming => "streaming",
            Phase::Verdict => "verdict",
            Phase::Error => "error",
        }
    }

    /// `Verdict` and `Error` hold until reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Verdict | Phase::Error)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::Streaming)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    /// Position in the log, starting at 1.
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
    #[serde(flatten)]
    pub event: JobEvent,
}

/// Transport action requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Open the stream subscription for this job.
    Subscribe(JobId),
    /// Close the stream subscription.
    Unsubscribe,
    /// Close the stream subscription and run the fallback fetch.
    Fallback(JobId),
}

/// Read-only view handed to front ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub job_id: Option<JobId>,
    pub active_agents: BTreeSet<String>,
    /// Agents seen starting, kept for status after they leave the active set.
    pub started_agents: BTreeSet<String>,
    pub completed_agents: BTreeMap<String, String>,
    /// Entries are shared with the session, so publishing does not copy them.
    pub activity_log: Vec<Arc<LoggedEvent>>,
    pub result: Option<JudgingResult>,
    pub error: Option<String>,
    pub registry: AgentRegistry,
    pub recovery: Recovery,
}

impl Snapshot {
    /// Fraction of registry agents that completed.
    pub fn progress(&self) -> f64 {
        progress_of(&self.registry, &self.completed_agents)
    }

    pub fn agent_status(&self, agent: &str) -> AgentStatus {
        status_of(agent, &self.started_agents, &self.completed_agents)
    }

    /// Registry agents with their status, in registry order.
    pub fn agent_statuses(&self) -> Vec<(&str, AgentStatus)> {
        self.registry
            .iter()
            .map(|agent| (agent, self.agent_status(agent)))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[derive(Debug, Clone)]
pub struct JobState {
    registry: AgentRegistry,
    phase: Phase,
    job_id: Option<JobId>,
    log: Vec<Arc<LoggedEvent>>,
    tracker: AgentTracker,
    result: Option<JudgingResult>,
    error: Option<String>,
    subscribed: bool,
    recovery: Recovery,
    revision: u64,
}

impl JobState {
    pub fn new(registry: AgentRegistry, policy: ConcurrencyPolicy) -> Self {
        Self {
            registry,
            phase: Phase::Idle,
            job_id: None,
            log: Vec::new(),
            tracker: AgentTracker::new(policy),
            result: None,
            error: None,
            subscribed: false,
            recovery: Recovery::NotNeeded,
            revision: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn activity_log(&self) -> &[Arc<LoggedEvent>] {
        &self.log
    }

    pub fn tracker(&self) -> &AgentTracker {
        &self.tracker
    }

    pub fn result(&self) -> Option<&JudgingResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Bumped by every transition that changes the snapshot.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether a stream subscription should currently be open.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// `Idle -> Submitting`, clearing all derived state.
    pub fn begin_submission(&mut self) -> Result<(), PhaseError> {
        if self.phase != Phase::Idle {
            return Err(PhaseError::JobInFlight { phase: self.phase });
        }
        self.clear();
        self.phase = Phase::Submitting;
        self.touch();
        Ok(())
    }

    /// `Submitting -> Streaming` once the backend returned a job id.
    pub fn submission_succeeded(&mut self, job_id: JobId) -> Result<Directive, PhaseError> {
        self.expect_phase(Phase::Submitting, "submission success")?;
        self.phase = Phase::Streaming;
        self.job_id = Some(job_id.clone());
        self.subscribed = true;
        self.touch();
        Ok(Directive::Subscribe(job_id))
    }

    /// `Submitting -> Error`.
    pub fn submission_failed(&mut self, message: impl Into<String>) -> Result<(), PhaseError> {
        self.expect_phase(Phase::Submitting, "submission failure")?;
        self.phase = Phase::Error;
        self.error = Some(message.into());
        self.touch();
        Ok(())
    }

    /// Decode one raw frame and fold it in.
    ///
    /// A frame that fails to decode leaves the state untouched. Frames
    /// arriving outside `Streaming` are ignored.
    pub fn ingest_frame(&mut self, frame: &str) -> Result<Option<Directive>, DecodeError> {
        let decoded = decode_frame(frame)?;
        Ok(self.apply(decoded))
    }

    /// Append a decoded event to the log, then dispatch it.
    pub fn apply(&mut self, decoded: DecodedFrame) -> Option<Directive> {
        if self.phase != Phase::Streaming || !self.subscribed {
            return None;
        }

        let DecodedFrame {
            event,
            timestamp,
            display,
        } = decoded;
        self.log.push(Arc::new(LoggedEvent {
            seq: self.log.len() as u64 + 1,
            received_at: Utc::now(),
            server_timestamp: timestamp,
            display,
            event: event.clone(),
        }));
        self.tracker.apply(&event);
        self.touch();

        match event {
            JobEvent::Verdict { result } => {
                self.result = Some(result);
                self.phase = Phase::Verdict;
                self.subscribed = false;
                Some(Directive::Unsubscribe)
            }
            JobEvent::Error { message } => {
                self.error = Some(message);
                self.phase = Phase::Error;
                self.subscribed = false;
                Some(Directive::Unsubscribe)
            }
            JobEvent::AgentStarted { .. }
            | JobEvent::AgentStep { .. }
            | JobEvent::AgentComplete { .. } => None,
        }
    }

    /// The stream dropped without a terminal event.
    ///
    /// Returns a fallback directive the first time only; the phase stays
    /// `Streaming` until the fallback reports back.
    pub fn transport_failed(&mut self) -> Option<Directive> {
        if self.phase != Phase::Streaming || !self.subscribed {
            return None;
        }
        self.subscribed = false;
        self.recovery = Recovery::Fetching;
        self.touch();
        self.job_id.clone().map(Directive::Fallback)
    }

    /// Fold in the outcome of the fallback fetch.
    ///
    /// A completed result is treated like a `verdict` event. Anything else
    /// leaves the job in `Streaming`, unless `fail_when_inconclusive` is set,
    /// in which case the job moves to `Error`.
    pub fn fallback_finished(&mut self, outcome: FallbackOutcome, fail_when_inconclusive: bool) {
        if self.phase != Phase::Streaming || self.recovery != Recovery::Fetching {
            return;
        }
        match outcome {
            FallbackOutcome::Completed(result) => {
                self.result = Some(result);
                self.phase = Phase::Verdict;
                self.recovery = Recovery::Recovered;
            }
            inconclusive => {
                let reason = inconclusive.describe();
                if fail_when_inconclusive {
                    self.phase = Phase::Error;
                    self.error = Some(format!("final result unavailable: {reason}"));
                }
                self.recovery = Recovery::Inconclusive { reason };
            }
        }
        self.touch();
    }

    /// Return to `Idle` from any phase, discarding the job.
    ///
    /// Always answers with [`Directive::Unsubscribe`]; closing an already
    /// closed subscription is a no-op for the caller.
    pub fn reset(&mut self) -> Directive {
        if self.phase != Phase::Idle {
            self.clear();
            self.phase = Phase::Idle;
            self.touch();
        }
        Directive::Unsubscribe
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            job_id: self.job_id.clone(),
            active_agents: self.tracker.active().clone(),
            started_agents: self.tracker.started().clone(),
            completed_agents: self.tracker.completed().clone(),
            activity_log: self.log.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            registry: self.registry.clone(),
            recovery: self.recovery.clone(),
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn clear(&mut self) {
        self.job_id = None;
        self.log.clear();
        self.tracker.clear();
        self.result = None;
        self.error = None;
        self.subscribed = false;
        self.recovery = Recovery::NotNeeded;
    }

    fn expect_phase(&self, expected: Phase, trigger: &'static str) -> Result<(), PhaseError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PhaseError::InvalidTransition {
                phase: self.phase,
                trigger,
            })
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new(AgentRegistry::default(), ConcurrencyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn streaming(job: &str) -> JobState {
        let mut state = JobState::default();
        state.begin_submission().unwrap();
        state.submission_succeeded(JobId::new(job)).unwrap();
        state
    }

    fn frame(value: Value) -> String {
        value.to_string()
    }

    #[test]
    fn submission_path_reaches_streaming() {
        let mut state = JobState::default();
        assert_eq!(state.phase(), Phase::Idle);

        state.begin_submission().unwrap();
        assert_eq!(state.phase(), Phase::Submitting);

        let directive = state.submission_succeeded(JobId::new("j1")).unwrap();
        assert_eq!(directive, Directive::Subscribe(JobId::new("j1")));
        assert_eq!(state.phase(), Phase::Streaming);
        assert_eq!(state.job_id().map(JobId::as_str), Some("j1"));
        assert!(state.is_subscribed());
    }

    #[test]
    fn failed_submission_is_terminal_error() {
        let mut state = JobState::default();
        state.begin_submission().unwrap();
        state.submission_failed("server error: 500").unwrap();
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.error(), Some("server error: 500"));
        assert!(state.begin_submission().is_err());
    }

    #[test]
    fn submit_is_rejected_while_in_flight() {
        let mut state = streaming("j1");
        assert_eq!(
            state.begin_submission(),
            Err(PhaseError::JobInFlight {
                phase: Phase::Streaming
            })
        );
        assert_eq!(state.job_id().map(JobId::as_str), Some("j1"));
    }

    #[test]
    fn out_of_order_triggers_are_refused() {
        let mut state = JobState::default();
        assert!(state.submission_succeeded(JobId::new("j1")).is_err());
        assert!(state.submission_failed("nope").is_err());
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn agent_events_never_change_phase() {
        let mut state = streaming("j1");
        for value in [
            json!({"type": "agent_started", "agent": "github"}),
            json!({"type": "agent_step", "agent": "github", "content": "cloning"}),
            json!({"type": "agent_complete", "agent": "github", "summary": "ok"}),
        ] {
            assert_eq!(state.ingest_frame(&frame(value)).unwrap(), None);
            assert_eq!(state.phase(), Phase::Streaming);
        }
        assert_eq!(state.activity_log().len(), 3);
        assert_eq!(state.tracker().completed()["github"], "ok");
    }

    #[test]
    fn verdict_event_sets_result_and_unsubscribes() {
        let mut state = streaming("j1");
        let directive = state
            .ingest_frame(&frame(json!({"type": "verdict", "result": {"scores": {"overall": 8}}})))
            .unwrap();
        assert_eq!(directive, Some(Directive::Unsubscribe));
        assert_eq!(state.phase(), Phase::Verdict);
        assert!(state.result().unwrap().has_scores());
        assert!(!state.is_subscribed());
    }

    #[test]
    fn error_event_sets_message_and_unsubscribes() {
        let mut state = streaming("j1");
        let directive = state
            .ingest_frame(&frame(json!({"type": "error", "message": "crew failed"})))
            .unwrap();
        assert_eq!(directive, Some(Directive::Unsubscribe));
        assert_eq!(state.phase(), Phase::Error);
        assert_eq!(state.error(), Some("crew failed"));
        assert!(state.result().is_none());
    }

    #[test]
    fn malformed_frames_leave_no_trace() {
        let mut state = streaming("j1");
        let before = state.snapshot();
        assert!(state.ingest_frame("{not json").is_err());
        assert!(state.ingest_frame(r#"{"type":"mystery"}"#).is_err());
        assert!(state.ingest_frame(r#"{"agent":"github"}"#).is_err());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn verdict_with_numeric_timestamp_is_applied() {
        let mut state = streaming("j1");
        let directive = state
            .ingest_frame(r#"{"type":"verdict","result":{"scores":{"overall":8}},"timestamp":1700000000}"#)
            .unwrap();
        assert_eq!(directive, Some(Directive::Unsubscribe));
        assert_eq!(state.phase(), Phase::Verdict);
        assert_eq!(state.activity_log().len(), 1);
        assert_eq!(state.activity_log()[0].server_timestamp, None);
    }

    #[test]
    fn revision_moves_only_on_visible_changes() {
        let mut state = JobState::default();
        state.reset();
        assert_eq!(state.revision(), 0);

        state.begin_submission().unwrap();
        state.submission_succeeded(JobId::new("j1")).unwrap();
        let streaming_rev = state.revision();
        assert!(state.ingest_frame("{not json").is_err());
        assert_eq!(state.revision(), streaming_rev);

        state
            .ingest_frame(&frame(json!({"type": "agent_started", "agent": "ppt"})))
            .unwrap();
        assert!(state.revision() > streaming_rev);
    }

    #[test]
    fn snapshot_status_matches_tracker() {
        let mut state = JobState::new(
            AgentRegistry::new(["github", "ppt", "voice"]),
            ConcurrencyPolicy::Sequential,
        );
        state.begin_submission().unwrap();
        state.submission_succeeded(JobId::new("j1")).unwrap();
        for value in [
            json!({"type": "agent_started", "agent": "github"}),
            json!({"type": "agent_started", "agent": "ppt"}),
            json!({"type": "agent_complete", "agent": "ppt", "summary": "deck ok"}),
        ] {
            state.ingest_frame(&frame(value)).unwrap();
        }

        let snapshot = state.snapshot();
        for agent in ["github", "ppt", "voice"] {
            assert_eq!(snapshot.agent_status(agent), state.tracker().status(agent));
        }
        assert_eq!(snapshot.agent_status("github"), AgentStatus::Active);
        assert_eq!(
            snapshot.progress(),
            state.tracker().progress(&AgentRegistry::new(["github", "ppt", "voice"]))
        );
    }

    #[test]
    fn frames_after_terminal_are_ignored() {
        let mut state = streaming("j1");
        state
            .ingest_frame(&frame(json!({"type": "error", "message": "boom"})))
            .unwrap();
        let directive = state
            .ingest_frame(&frame(json!({"type": "agent_started", "agent": "ppt"})))
            .unwrap();
        assert_eq!(directive, None);
        assert_eq!(state.activity_log().len(), 1);
        assert!(state.tracker().active().is_empty());
    }

    #[test]
    fn log_replay_reproduces_tracker() {
        let mut state = streaming("j1");
        for value in [
            json!({"type": "agent_started", "agent": "github"}),
            json!({"type": "agent_started", "agent": "ppt"}),
            json!({"type": "agent_complete", "agent": "github"}),
            json!({"type": "agent_step", "agent": "ppt", "content": "slide 2"}),
        ] {
            state.ingest_frame(&frame(value)).unwrap();
        }
        let replayed = AgentTracker::fold(
            state.activity_log().iter().map(|entry| &entry.event),
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(&replayed, state.tracker());
        let seqs: Vec<u64> = state.activity_log().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn transport_failure_requests_fallback_once() {
        let mut state = streaming("j1");
        assert_eq!(
            state.transport_failed(),
            Some(Directive::Fallback(JobId::new("j1")))
        );
        assert_eq!(state.phase(), Phase::Streaming);
        assert_eq!(state.snapshot().recovery, Recovery::Fetching);
        assert_eq!(state.transport_failed(), None);
    }

    #[test]
    fn transport_failure_after_verdict_is_ignored() {
        let mut state = streaming("j1");
        state
            .ingest_frame(&frame(json!({"type": "verdict", "result": {"scores": {}}})))
            .unwrap();
        assert_eq!(state.transport_failed(), None);
        assert_eq!(state.phase(), Phase::Verdict);
    }

    #[test]
    fn fallback_with_scores_completes_job() {
        let mut state = streaming("j1");
        state.transport_failed();
        let result = JudgingResult::new(json!({"team_name": "t", "scores": {"overall": 9}}));
        state.fallback_finished(FallbackOutcome::Completed(result.clone()), false);
        assert_eq!(state.phase(), Phase::Verdict);
        assert_eq!(state.result(), Some(&result));
        assert_eq!(state.snapshot().recovery, Recovery::Recovered);
    }

    #[test]
    fn inconclusive_fallback_keeps_streaming() {
        let mut state = streaming("j1");
        state
            .ingest_frame(&frame(json!({"type": "agent_started", "agent": "ppt"})))
            .unwrap();
        state.transport_failed();
        state.fallback_finished(FallbackOutcome::Pending, false);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, Phase::Streaming);
        assert!(snapshot.active_agents.contains("ppt"));
        assert!(matches!(snapshot.recovery, Recovery::Inconclusive { .. }));
    }

    #[test]
    fn inconclusive_fallback_can_be_fatal() {
        let mut state = streaming("j1");
        state.transport_failed();
        state.fallback_finished(FallbackOutcome::Failed("server error: 500".into()), true);
        assert_eq!(state.phase(), Phase::Error);
        assert!(state.error().unwrap().contains("server error: 500"));
    }

    #[test]
    fn fallback_outcome_without_request_is_ignored() {
        let mut state = streaming("j1");
        state.fallback_finished(
            FallbackOutcome::Completed(JudgingResult::new(json!({"scores": {}}))),
            false,
        );
        assert_eq!(state.phase(), Phase::Streaming);
        assert!(state.result().is_none());
    }

    #[test]
    fn reset_from_every_phase_returns_to_idle() {
        let mut states = vec![JobState::default()];

        let mut submitting = JobState::default();
        submitting.begin_submission().unwrap();
        states.push(submitting);

        let mut active = streaming("j1");
        active
            .ingest_frame(&frame(json!({"type": "agent_started", "agent": "github"})))
            .unwrap();
        states.push(active);

        let mut verdict = streaming("j2");
        verdict
            .ingest_frame(&frame(json!({"type": "verdict", "result": {"scores": {}}})))
            .unwrap();
        states.push(verdict);

        let mut failed = JobState::default();
        failed.begin_submission().unwrap();
        failed.submission_failed("boom").unwrap();
        states.push(failed);

        let idle = JobState::default().snapshot();
        for mut state in states {
            assert_eq!(state.reset(), Directive::Unsubscribe);
            assert_eq!(state.snapshot(), idle);
        }
    }

    #[test]
    fn snapshot_reports_statuses_in_registry_order() {
        let mut state = streaming("j1");
        state
            .ingest_frame(&frame(json!({"type": "agent_complete", "agent": "github"})))
            .unwrap();
        state
            .ingest_frame(&frame(json!({"type": "agent_started", "agent": "ppt"})))
            .unwrap();
        let snapshot = state.snapshot();
        let statuses = snapshot.agent_statuses();
        assert_eq!(statuses[0], ("github", AgentStatus::Completed));
        assert_eq!(statuses[1], ("ppt", AgentStatus::Active));
        assert_eq!(statuses[2], ("voice", AgentStatus::Pending));
        assert_eq!(snapshot.progress(), 0.2);
    }
}
