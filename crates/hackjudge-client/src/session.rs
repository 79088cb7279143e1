//! Session controller.
//!
//! One [`SessionHandle`] drives at most one judging job at a time. Behind the
//! handle an actor task owns the [`JobState`]: commands from the caller and
//! reports from transport tasks arrive on channels and are folded in one at
//! a time, so there is never more than one writer.
//!
//! Transport tasks tag every report with the epoch they were started in.
//! `submit` and `reset` both advance the epoch, so anything still in flight
//! for a discarded job is dropped on arrival instead of touching state.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{HttpJudgeApi, JudgeApi};
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::evidence::Evidence;
use crate::fallback::{fetch_with_policy, FallbackOutcome, FallbackPolicy};
use crate::obs::{
    emit_event_applied, emit_frame_dropped, emit_job_created, emit_job_finished, emit_job_reset,
    emit_job_submitted, emit_stream_lost, emit_submit_failed, emit_submit_rejected, JobSpan,
};
use crate::state::{Directive, JobId, JobState, Snapshot};

const STREAM_CLOSED: &str = "stream closed without a terminal event";

#[derive(Debug)]
enum Command {
    Submit(Box<Evidence>),
    Reset,
}

#[derive(Debug)]
enum Report {
    Created {
        epoch: u64,
        outcome: std::result::Result<JobId, String>,
    },
    Frame {
        epoch: u64,
        frame: String,
    },
    StreamEnded {
        epoch: u64,
        reason: String,
    },
    Fallback {
        epoch: u64,
        outcome: FallbackOutcome,
    },
}

impl Report {
    fn epoch(&self) -> u64 {
        match self {
            Report::Created { epoch, .. }
            | Report::Frame { epoch, .. }
            | Report::StreamEnded { epoch, .. }
            | Report::Fallback { epoch, .. } => *epoch,
        }
    }
}

/// Background task bound to a job; aborted when dropped.
struct ScopedTask {
    label: &'static str,
    job_id: JobId,
    handle: JoinHandle<()>,
}

impl ScopedTask {
    fn new(label: &'static str, job_id: JobId, handle: JoinHandle<()>) -> Self {
        Self {
            label,
            job_id,
            handle,
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(job_id = %self.job_id, task = self.label, "job task closed");
    }
}

/// Caller-facing handle to a judging session.
///
/// `submit` and `reset` only enqueue a command; their effects show up in
/// [`snapshot`](Self::snapshot). Dropping the handle stops the session and
/// closes any open stream.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start a session on the current tokio runtime.
    pub fn spawn(api: Arc<dyn JudgeApi>, config: &ClientConfig) -> Self {
        let state = JobState::new(config.registry.clone(), config.concurrency);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            api,
            fallback: config.fallback.clone(),
            published: state.revision(),
            state,
            epoch: 0,
            subscription: None,
            fallback_task: None,
            reports: report_tx,
            snapshot: snapshot_tx,
            started_at: None,
        };
        let task = tokio::spawn(actor.run(command_rx, report_rx));

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// Start a session talking HTTP to `config.server_url`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let api = HttpJudgeApi::new(config)?;
        Ok(Self::spawn(Arc::new(api), config))
    }

    /// Submit an evidence bundle. Ignored unless the session is idle.
    pub fn submit(&self, evidence: Evidence) -> std::result::Result<(), SessionError> {
        self.commands
            .send(Command::Submit(Box::new(evidence)))
            .map_err(|_| SessionError::Closed)
    }

    /// Discard the current job, if any, and return to idle.
    pub fn reset(&self) -> std::result::Result<(), SessionError> {
        self.commands
            .send(Command::Reset)
            .map_err(|_| SessionError::Closed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> std::result::Result<Snapshot, SessionError>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Stop the session and wait for its task to finish.
    pub async fn shutdown(self) {
        let SessionHandle { commands, task, .. } = self;
        drop(commands);
        if let Err(err) = task.await {
            warn!(error = %err, "judging session task ended abnormally");
        }
    }
}

struct SessionActor {
    api: Arc<dyn JudgeApi>,
    fallback: FallbackPolicy,
    state: JobState,
    /// Revision of the state last sent to subscribers.
    published: u64,
    epoch: u64,
    subscription: Option<ScopedTask>,
    fallback_task: Option<ScopedTask>,
    reports: mpsc::UnboundedSender<Report>,
    snapshot: watch::Sender<Snapshot>,
    started_at: Option<Instant>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<Report>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(report) = reports.recv() => self.handle_report(report),
            }
            self.publish();
        }

        self.subscription = None;
        self.fallback_task = None;
        debug!("judging session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(evidence) => self.submit(*evidence),
            Command::Reset => self.reset(),
        }
    }

    fn submit(&mut self, evidence: Evidence) {
        if let Err(err) = self.state.begin_submission() {
            emit_submit_rejected(self.state.phase().as_str());
            debug!(error = %err, "submit ignored");
            return;
        }
        self.epoch += 1;
        self.started_at = Some(Instant::now());
        emit_job_submitted(&evidence.team_name);

        if let Err(err) = evidence.validate() {
            self.fail_submission(err.to_string());
            return;
        }

        let api = Arc::clone(&self.api);
        let reports = self.reports.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = api
                .create_job(&evidence)
                .await
                .map_err(|err| err.to_string());
            let _ = reports.send(Report::Created { epoch, outcome });
        });
    }

    fn reset(&mut self) {
        let previous = self.state.phase();
        let directive = self.state.reset();
        self.execute(directive);
        self.fallback_task = None;
        self.epoch += 1;
        self.started_at = None;
        emit_job_reset(previous.as_str());
    }

    fn handle_report(&mut self, report: Report) {
        if report.epoch() != self.epoch {
            debug!(
                report_epoch = report.epoch(),
                current_epoch = self.epoch,
                "dropping stale report"
            );
            return;
        }
        let _span = self.state.job_id().map(|id| JobSpan::enter(id.as_str()));

        match report {
            Report::Created {
                outcome: Ok(job_id),
                ..
            } => match self.state.submission_succeeded(job_id.clone()) {
                Ok(directive) => {
                    emit_job_created(job_id.as_str());
                    self.execute(directive);
                }
                Err(err) => warn!(error = %err, "unexpected job creation report"),
            },
            Report::Created {
                outcome: Err(message),
                ..
            } => self.fail_submission(message),
            Report::Frame { frame, .. } => self.ingest(&frame),
            Report::StreamEnded { reason, .. } => {
                if let Some(directive) = self.state.transport_failed() {
                    emit_stream_lost(&self.job_label(), &reason);
                    self.execute(directive);
                }
            }
            Report::Fallback { outcome, .. } => {
                self.fallback_task = None;
                self.state
                    .fallback_finished(outcome, self.fallback.fail_when_exhausted);
                self.finish_if_terminal();
            }
        }
    }

    fn ingest(&mut self, frame: &str) {
        let logged_before = self.state.activity_log().len();
        match self.state.ingest_frame(frame) {
            Err(err) => emit_frame_dropped(&self.job_label(), &err),
            Ok(directive) => {
                if let Some(entry) = self.state.activity_log().get(logged_before) {
                    emit_event_applied(&self.job_label(), entry.event.kind(), entry.seq);
                }
                if let Some(directive) = directive {
                    self.execute(directive);
                }
                self.finish_if_terminal();
            }
        }
    }

    fn fail_submission(&mut self, message: String) {
        emit_submit_failed(&message);
        if let Err(err) = self.state.submission_failed(message) {
            warn!(error = %err, "unexpected submission failure report");
        }
        self.finish_if_terminal();
    }

    fn execute(&mut self, directive: Directive) {
        match directive {
            Directive::Subscribe(job_id) => self.subscribe(job_id),
            Directive::Unsubscribe => self.subscription = None,
            Directive::Fallback(job_id) => {
                self.subscription = None;
                self.start_fallback(job_id);
            }
        }
    }

    fn subscribe(&mut self, job_id: JobId) {
        let api = Arc::clone(&self.api);
        let reports = self.reports.clone();
        let epoch = self.epoch;
        let stream_job = job_id.clone();

        let handle = tokio::spawn(async move {
            let mut frames = match api.open_stream(&stream_job).await {
                Ok(frames) => frames,
                Err(err) => {
                    let _ = reports.send(Report::StreamEnded {
                        epoch,
                        reason: err.to_string(),
                    });
                    return;
                }
            };

            while let Some(item) = frames.next().await {
                match item {
                    Ok(frame) => {
                        if reports.send(Report::Frame { epoch, frame }).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = reports.send(Report::StreamEnded {
                            epoch,
                            reason: err.to_string(),
                        });
                        return;
                    }
                }
            }

            let _ = reports.send(Report::StreamEnded {
                epoch,
                reason: STREAM_CLOSED.to_string(),
            });
        });

        self.subscription = Some(ScopedTask::new("stream", job_id, handle));
    }

    fn start_fallback(&mut self, job_id: JobId) {
        let api = Arc::clone(&self.api);
        let reports = self.reports.clone();
        let epoch = self.epoch;
        let policy = self.fallback.clone();
        let fetch_job = job_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = fetch_with_policy(api.as_ref(), &fetch_job, &policy).await;
            let _ = reports.send(Report::Fallback { epoch, outcome });
        });

        self.fallback_task = Some(ScopedTask::new("fallback", job_id, handle));
    }

    fn finish_if_terminal(&mut self) {
        if !self.state.phase().is_terminal() {
            return;
        }
        if let Some(started_at) = self.started_at.take() {
            emit_job_finished(
                &self.job_label(),
                self.state.phase().as_str(),
                started_at.elapsed().as_millis() as u64,
                self.state.activity_log().len() as u64,
            );
        }
    }

    fn job_label(&self) -> String {
        self.state
            .job_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unassigned".to_string())
    }

    fn publish(&mut self) {
        let revision = self.state.revision();
        if revision == self.published {
            return;
        }
        self.published = revision;
        self.snapshot.send_replace(self.state.snapshot());
    }
}
