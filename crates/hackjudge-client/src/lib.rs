//! HackJudge Client Library
//!
//! Follows a judging job on the HackJudge backend from submission to verdict:
//! submits an evidence bundle, decodes the server-sent event stream into
//! agent progress, and recovers the final result over a plain request when
//! the stream drops.
//!
//! ## Key Components
//!
//! - `SessionHandle`: owns one job at a time and publishes `Snapshot`s
//! - `JobState`: the phase machine and activity log behind a session
//! - `AgentTracker`: active/completed agents folded from the event log
//! - `JudgeApi` / `HttpJudgeApi`: transport seam and its `reqwest` client

pub mod api;
pub mod config;
mod error;
pub mod event;
pub mod evidence;
pub mod fakes;
pub mod fallback;
pub mod obs;
pub mod registry;
pub mod result;
pub mod session;
pub mod sse;
pub mod state;
pub mod telemetry;
pub mod tracker;

pub use api::{FrameStream, HealthStatus, HttpJudgeApi, JudgeApi};
pub use config::{ClientConfig, DEFAULT_SERVER_URL};
pub use error::{ApiError, DecodeError, PhaseError, Result, SessionError};
pub use event::{decode_frame, DecodedFrame, JobEvent, DEFAULT_SUMMARY};
pub use evidence::{Attachment, Evidence};
pub use fallback::{
    classify_result_body, fetch_with_policy, FallbackOutcome, FallbackPolicy, Recovery,
};
pub use obs::JobSpan;
pub use registry::{AgentRegistry, DEFAULT_AGENTS};
pub use result::{
    AgentAnalysis, JudgeQuestion, JudgingReport, JudgingResult, Priority, QuestionCategory, Scores,
};
pub use session::SessionHandle;
pub use sse::{frame_stream, SseFrameDecoder};
pub use state::{Directive, JobId, JobState, LoggedEvent, Phase, Snapshot};
pub use telemetry::init_tracing;
pub use tracker::{AgentStatus, AgentTracker, ConcurrencyPolicy};

/// HackJudge client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
