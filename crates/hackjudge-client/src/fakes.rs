//! Scripted in-memory backend (testing only)
//!
//! `ScriptedJudgeApi` satisfies the [`JudgeApi`] contract without a server.
//! Tests queue replies for job creation and result fetches, and push stream
//! frames by hand through a [`StreamFeed`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::api::{FrameStream, JudgeApi};
use crate::error::{ApiError, Result};
use crate::evidence::Evidence;
use crate::state::JobId;

/// Reply to `create_job`.
#[derive(Debug, Clone)]
pub enum CreateReply {
    Job(String),
    Status(u16),
}

impl CreateReply {
    pub fn job(job_id: impl Into<String>) -> Self {
        CreateReply::Job(job_id.into())
    }

    pub fn status(status: u16) -> Self {
        CreateReply::Status(status)
    }
}

/// Reply to `fetch_result`.
#[derive(Debug, Clone)]
pub enum FetchReply {
    Body(Value),
    Status(u16),
}

impl FetchReply {
    pub fn body(body: Value) -> Self {
        FetchReply::Body(body)
    }

    pub fn status(status: u16) -> Self {
        FetchReply::Status(status)
    }
}

/// Sending half of a scripted event stream.
///
/// The stream stays open while the feed is alive; dropping it (or calling
/// [`close`](Self::close)) ends the stream like a server hang-up.
#[derive(Debug)]
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<Result<String>>,
}

impl StreamFeed {
    /// Push a raw frame payload.
    pub fn frame(&self, frame: impl Into<String>) -> &Self {
        let _ = self.tx.send(Ok(frame.into()));
        self
    }

    /// Push a JSON event as a frame.
    pub fn event(&self, event: Value) -> &Self {
        self.frame(event.to_string())
    }

    /// Fail the transport mid-stream.
    pub fn fail(&self, reason: &str) -> &Self {
        let _ = self.tx.send(Err(ApiError::Http(reason.to_string())));
        self
    }

    /// True once the client side has dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn close(self) {}
}

type StreamReceiver = mpsc::UnboundedReceiver<Result<String>>;

/// In-memory [`JudgeApi`] driven by test scripts.
#[derive(Debug, Default)]
pub struct ScriptedJudgeApi {
    create_replies: Mutex<VecDeque<CreateReply>>,
    create_gate: Mutex<Option<oneshot::Receiver<()>>>,
    submitted: Mutex<Vec<String>>,
    streams: Mutex<HashMap<String, StreamReceiver>>,
    opened: Mutex<Vec<String>>,
    fetch_replies: Mutex<VecDeque<FetchReply>>,
    fetch_calls: Mutex<usize>,
}

impl ScriptedJudgeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next `create_job`. With the queue empty, jobs
    /// are numbered `job-1`, `job-2`, ...
    pub fn push_create(&self, reply: CreateReply) {
        self.create_replies.lock().unwrap().push_back(reply);
    }

    /// Hold the next `create_job` until the returned sender fires or drops.
    pub fn pause_create(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.create_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Script the event stream for `job_id`. Opening an unscripted job
    /// yields a stream that ends immediately.
    pub fn script_stream(&self, job_id: &str) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap()
            .insert(job_id.to_string(), rx);
        StreamFeed { tx }
    }

    /// Queue a reply for the next `fetch_result`. With the queue empty the
    /// job reports as still running.
    pub fn push_fetch(&self, reply: FetchReply) {
        self.fetch_replies.lock().unwrap().push_back(reply);
    }

    /// Team names in submission order.
    pub fn submitted_teams(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Job ids whose stream was opened, in order.
    pub fn opened_streams(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock().unwrap()
    }
}

#[async_trait]
impl JudgeApi for ScriptedJudgeApi {
    async fn create_job(&self, evidence: &Evidence) -> Result<JobId> {
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let number = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(evidence.team_name.clone());
            submitted.len()
        };
        let reply = self.create_replies.lock().unwrap().pop_front();
        match reply {
            Some(CreateReply::Job(job_id)) => Ok(JobId::new(job_id)),
            Some(CreateReply::Status(status)) => {
                Err(ApiError::status(status, "Internal Server Error"))
            }
            None => Ok(JobId::new(format!("job-{number}"))),
        }
    }

    async fn open_stream(&self, job_id: &JobId) -> Result<FrameStream> {
        self.opened.lock().unwrap().push(job_id.to_string());
        let receiver = self.streams.lock().unwrap().remove(job_id.as_str());
        match receiver {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(stream::empty().boxed()),
        }
    }

    async fn fetch_result(&self, _job_id: &JobId) -> Result<Value> {
        *self.fetch_calls.lock().unwrap() += 1;
        let reply = self.fetch_replies.lock().unwrap().pop_front();
        match reply {
            Some(FetchReply::Body(body)) => Ok(body),
            Some(FetchReply::Status(status)) => Err(ApiError::status(status, "")),
            None => Ok(json!({"status": "running", "message": "Still processing..."})),
        }
    }
}
