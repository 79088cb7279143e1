//! Final verdict payload.
//!
//! The client only needs to know whether a payload carries scores, so
//! [`JudgingResult`] keeps the raw JSON untouched. [`JudgingReport`] is the
//! typed view front ends use for rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field whose presence marks a payload as a finished verdict.
pub const SCORES_FIELD: &str = "scores";

/// Verdict payload exactly as the backend sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JudgingResult(Value);

impl JudgingResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Whether the payload carries a non-null scoring object.
    pub fn has_scores(&self) -> bool {
        self.0
            .get(SCORES_FIELD)
            .map(|scores| !scores.is_null())
            .unwrap_or(false)
    }

    pub fn team_name(&self) -> Option<&str> {
        self.0.get("team_name").and_then(Value::as_str)
    }

    /// Typed scores, if present and well formed.
    pub fn scores(&self) -> Option<Scores> {
        self.0
            .get(SCORES_FIELD)
            .and_then(|scores| Scores::deserialize(scores).ok())
    }

    /// Deserialize the full typed report.
    pub fn report(&self) -> Result<JudgingReport, serde_json::Error> {
        JudgingReport::deserialize(&self.0)
    }
}

/// Per-dimension scores, each on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub technical: f64,
    pub business: f64,
    pub presentation: f64,
    pub demo_quality: f64,
    pub innovation: f64,
    pub overall: f64,
}

impl Scores {
    /// `(label, value)` pairs in display order, overall last.
    pub fn dimensions(&self) -> [(&'static str, f64); 6] {
        [
            ("technical", self.technical),
            ("business", self.business),
            ("presentation", self.presentation),
            ("demo_quality", self.demo_quality),
            ("innovation", self.innovation),
            ("overall", self.overall),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Technical,
    Business,
    Innovation,
    Feasibility,
    Presentation,
}

/// A follow-up question for the team, cross-referenced against the evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeQuestion {
    pub category: QuestionCategory,
    pub priority: Priority,
    pub question: String,
    pub reasoning: String,
    /// Which source(s) the question draws from
    pub source_evidence: String,
}

/// Findings of a single evaluator agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub raw_detail: String,
}

/// Typed view of a finished verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgingReport {
    pub team_name: String,
    pub scores: Scores,
    #[serde(default)]
    pub questions: Vec<JudgeQuestion>,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub key_concerns: Vec<String>,
    /// Ready-to-read script for a voice judge
    #[serde(default)]
    pub voice_script: String,
    #[serde(default)]
    pub github_analysis: Option<AgentAnalysis>,
    #[serde(default)]
    pub ppt_analysis: Option<AgentAnalysis>,
    #[serde(default)]
    pub voice_analysis: Option<AgentAnalysis>,
    #[serde(default)]
    pub video_analysis: Option<AgentAnalysis>,
}

impl JudgingReport {
    /// Questions ordered by priority, highest first. Ties keep backend order.
    pub fn prioritized_questions(&self) -> Vec<&JudgeQuestion> {
        let mut questions: Vec<&JudgeQuestion> = self.questions.iter().collect();
        questions.sort_by_key(|q| q.priority);
        questions
    }

    /// Per-agent analyses that are present, keyed by agent id.
    pub fn analyses(&self) -> Vec<(&'static str, &AgentAnalysis)> {
        [
            ("github", self.github_analysis.as_ref()),
            ("ppt", self.ppt_analysis.as_ref()),
            ("voice", self.voice_analysis.as_ref()),
            ("video", self.video_analysis.as_ref()),
        ]
        .into_iter()
        .filter_map(|(agent, analysis)| analysis.map(|a| (agent, a)))
        .collect()
    }
}
