//! HTTP transport for the judging backend.
//!
//! [`JudgeApi`] is the seam the session controller talks through: create a
//! job, open its event stream, pull its result. [`HttpJudgeApi`] implements
//! it with `reqwest`; tests swap in [`crate::fakes::ScriptedJudgeApi`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::evidence::Evidence;
use crate::sse::frame_stream;
use crate::state::JobId;

/// Stream of raw frame payloads. Ends when the server closes the stream;
/// an `Err` item means the transport failed.
pub type FrameStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// `POST /api/judge/start`
    async fn create_job(&self, evidence: &Evidence) -> Result<JobId>;

    /// `GET /api/judge/{job_id}/stream`
    async fn open_stream(&self, job_id: &JobId) -> Result<FrameStream>;

    /// `GET /api/judge/{job_id}/result`
    async fn fetch_result(&self, job_id: &JobId) -> Result<Value>;
}

/// Backend health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct SavedResults {
    #[serde(default)]
    results: Vec<String>,
}

/// `reqwest`-backed client for the judging backend.
#[derive(Debug, Clone)]
pub struct HttpJudgeApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpJudgeApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(HttpJudgeApi {
            base_url: config.server_url.clone(),
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/health`
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .http_client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// `GET /api/results`: file names of saved verdicts, newest first.
    pub async fn list_results(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/api/results", self.base_url))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let saved: SavedResults = response.json().await?;
        Ok(saved.results)
    }

    /// `GET /api/results/{file_name}`
    pub async fn saved_result(&self, file_name: &str) -> Result<Value> {
        let response = self
            .http_client
            .get(format!("{}/api/results/{file_name}", self.base_url))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JudgeApi for HttpJudgeApi {
    #[instrument(skip(self, evidence), fields(team_name = %evidence.team_name))]
    async fn create_job(&self, evidence: &Evidence) -> Result<JobId> {
        evidence.validate()?;

        let response = self
            .http_client
            .post(format!("{}/api/judge/start", self.base_url))
            .multipart(evidence.to_form())
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let started: StartResponse = response.json().await?;
        debug!(job_id = %started.job_id, "judging job created");
        Ok(JobId::new(started.job_id))
    }

    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    async fn open_stream(&self, job_id: &JobId) -> Result<FrameStream> {
        let response = self
            .http_client
            .get(format!("{}/api/judge/{job_id}/stream", self.base_url))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(frame_stream(response.bytes_stream()))
    }

    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    async fn fetch_result(&self, job_id: &JobId) -> Result<Value> {
        let response = self
            .http_client
            .get(format!("{}/api/judge/{job_id}/result", self.base_url))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::status(status.as_u16(), &body))
}
