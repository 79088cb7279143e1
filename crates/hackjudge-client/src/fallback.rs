//! Fallback result fetcher.
//!
//! Used when the stream drops without a terminal event: pull the job's
//! result endpoint and check whether a verdict is already available.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::api::JudgeApi;
use crate::obs::emit_fallback_attempt;
use crate::result::JudgingResult;
use crate::state::JobId;

/// What a result pull found.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    /// The body carried scores; equivalent to a `verdict` event.
    Completed(JudgingResult),
    /// The backend answered but the job has no verdict yet.
    Pending,
    /// The pull itself failed.
    Failed(String),
}

impl FallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackOutcome::Completed(_) => "completed",
            FallbackOutcome::Pending => "pending",
            FallbackOutcome::Failed(_) => "failed",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FallbackOutcome::Completed(_) => "verdict available".to_string(),
            FallbackOutcome::Pending => "job still running".to_string(),
            FallbackOutcome::Failed(reason) => reason.clone(),
        }
    }
}

/// Recovery progress after a stream loss, exposed on the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Recovery {
    /// The stream has not been lost.
    #[default]
    NotNeeded,
    /// Fallback fetch in progress.
    Fetching,
    /// Fallback fetch found the verdict.
    Recovered,
    /// Fallback fetch ended without a verdict; no further update is scheduled.
    Inconclusive { reason: String },
}

/// How hard to try before giving up on the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// Number of result pulls; `1` means a single pull.
    pub max_attempts: u32,
    /// Pause between pulls.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Move the job to `Error` when every pull came back without a verdict.
    pub fail_when_exhausted: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::from_millis(2_000),
            fail_when_exhausted: false,
        }
    }
}

impl FallbackPolicy {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn fail_when_exhausted(mut self, fail: bool) -> Self {
        self.fail_when_exhausted = fail;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Classify a result body: a non-null `scores` field means the job finished.
pub fn classify_result_body(body: Value) -> FallbackOutcome {
    let result = JudgingResult::new(body);
    if result.has_scores() {
        FallbackOutcome::Completed(result)
    } else {
        FallbackOutcome::Pending
    }
}

/// Pull the result up to `policy.max_attempts` times, stopping at the first
/// verdict. Returns the last outcome.
#[instrument(skip(api, job_id, policy), fields(job_id = %job_id))]
pub async fn fetch_with_policy(
    api: &dyn JudgeApi,
    job_id: &JobId,
    policy: &FallbackPolicy,
) -> FallbackOutcome {
    let attempts = policy.max_attempts.max(1);
    let mut outcome = FallbackOutcome::Pending;

    for attempt in 1..=attempts {
        outcome = match api.fetch_result(job_id).await {
            Ok(body) => classify_result_body(body),
            Err(err) => FallbackOutcome::Failed(err.to_string()),
        };
        emit_fallback_attempt(job_id.as_str(), attempt, outcome.label());

        if matches!(outcome, FallbackOutcome::Completed(_)) {
            break;
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    outcome
}
