//! Agent progress tracking.
//!
//! [`AgentTracker`] is a pure fold over decoded events. Replaying an activity
//! log through [`AgentTracker::fold`] reproduces exactly the state the live
//! tracker holds, so the log stays the single source of truth.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::event::JobEvent;
use crate::registry::AgentRegistry;

/// How many agents may be reported as running at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Any number of agents may be active.
    #[default]
    Concurrent,
    /// Starting an agent displaces whichever agent was running before.
    Sequential,
}

/// Lifecycle of one agent. Ordering follows the lifecycle, so a status
/// never compares lower than one observed earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentTracker {
    policy: ConcurrencyPolicy,
    active: BTreeSet<String>,
    started: BTreeSet<String>,
    completed: BTreeMap<String, String>,
}

impl AgentTracker {
    pub fn new(policy: ConcurrencyPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Rebuild tracker state from an event sequence.
    pub fn fold<'a, I>(events: I, policy: ConcurrencyPolicy) -> Self
    where
        I: IntoIterator<Item = &'a JobEvent>,
    {
        let mut tracker = Self::new(policy);
        for event in events {
            tracker.apply(event);
        }
        tracker
    }

    /// Fold one event in. Only `agent_started` and `agent_complete` matter.
    pub fn apply(&mut self, event: &JobEvent) {
        match event {
            JobEvent::AgentStarted { agent } => {
                if self.policy == ConcurrencyPolicy::Sequential {
                    self.active.clear();
                }
                self.active.insert(agent.clone());
                self.started.insert(agent.clone());
            }
            JobEvent::AgentComplete { agent, summary } => {
                self.active.remove(agent);
                self.started.insert(agent.clone());
                self.completed.insert(agent.clone(), summary.clone());
            }
            JobEvent::AgentStep { .. } | JobEvent::Verdict { .. } | JobEvent::Error { .. } => {}
        }
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Agents currently running.
    pub fn active(&self) -> &BTreeSet<String> {
        &self.active
    }

    /// Completed agents and their summaries.
    pub fn completed(&self) -> &BTreeMap<String, String> {
        &self.completed
    }

    /// Agents that started at some point, including completed ones.
    pub fn started(&self) -> &BTreeSet<String> {
        &self.started
    }

    /// Derived status: completed wins over active, active over pending.
    ///
    /// An agent displaced under [`ConcurrencyPolicy::Sequential`] stays
    /// `Active` until it completes.
    pub fn status(&self, agent: &str) -> AgentStatus {
        status_of(agent, &self.started, &self.completed)
    }

    /// Fraction of registry agents that have completed, in `[0, 1]`.
    pub fn progress(&self, registry: &AgentRegistry) -> f64 {
        progress_of(registry, &self.completed)
    }

    /// Forget everything, keeping the policy.
    pub fn clear(&mut self) {
        *self = Self::new(self.policy);
    }
}

/// Status rule shared by the live tracker and published snapshots.
pub(crate) fn status_of(
    agent: &str,
    started: &BTreeSet<String>,
    completed: &BTreeMap<String, String>,
) -> AgentStatus {
    if completed.contains_key(agent) {
        AgentStatus::Completed
    } else if started.contains(agent) {
        AgentStatus::Active
    } else {
        AgentStatus::Pending
    }
}

/// Completions for agents outside the registry are not counted. An empty
/// registry reports zero progress.
pub(crate) fn progress_of(registry: &AgentRegistry, completed: &BTreeMap<String, String>) -> f64 {
    if registry.is_empty() {
        return 0.0;
    }
    let done = registry
        .iter()
        .filter(|agent| completed.contains_key(*agent))
        .count();
    done as f64 / registry.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::JudgingResult;

    fn started(agent: &str) -> JobEvent {
        JobEvent::AgentStarted {
            agent: agent.into(),
        }
    }

    fn complete(agent: &str, summary: &str) -> JobEvent {
        JobEvent::AgentComplete {
            agent: agent.into(),
            summary: summary.into(),
        }
    }

    #[test]
    fn started_then_complete_moves_agent_to_completed() {
        let mut tracker = AgentTracker::default();
        tracker.apply(&started("github"));
        assert!(tracker.active().contains("github"));
        assert_eq!(tracker.status("github"), AgentStatus::Active);

        tracker.apply(&complete("github", "ok"));
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.completed()["github"], "ok");
        assert_eq!(tracker.status("github"), AgentStatus::Completed);
        assert_eq!(tracker.status("ppt"), AgentStatus::Pending);
    }

    #[test]
    fn repeated_start_is_idempotent() {
        let once = AgentTracker::fold(&[started("ppt")], ConcurrencyPolicy::Concurrent);
        let twice = AgentTracker::fold(
            &[started("ppt"), started("ppt")],
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn repeated_complete_is_idempotent() {
        let events = [started("video"), complete("video", "done")];
        let once = AgentTracker::fold(&events, ConcurrencyPolicy::Concurrent);

        let mut replayed = events.to_vec();
        replayed.push(complete("video", "done"));
        let twice = AgentTracker::fold(&replayed, ConcurrencyPolicy::Concurrent);

        assert_eq!(once, twice);
        assert!(!twice.active().contains("video"));
    }

    #[test]
    fn duplicate_completion_overwrites_summary() {
        let tracker = AgentTracker::fold(
            &[complete("ppt", "first"), complete("ppt", "second")],
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(tracker.completed()["ppt"], "second");
    }

    #[test]
    fn concurrent_policy_tracks_many_active_agents() {
        let tracker = AgentTracker::fold(
            &[started("github"), started("ppt"), started("video")],
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(tracker.active().len(), 3);
    }

    #[test]
    fn sequential_policy_keeps_one_running_agent() {
        let tracker = AgentTracker::fold(
            &[started("github"), started("ppt")],
            ConcurrencyPolicy::Sequential,
        );
        assert_eq!(tracker.active().iter().collect::<Vec<_>>(), vec!["ppt"]);
        assert_eq!(tracker.status("github"), AgentStatus::Active);
    }

    #[test]
    fn restarting_completed_agent_does_not_regress_status() {
        let registry = AgentRegistry::new(["github", "ppt"]);
        let tracker = AgentTracker::fold(
            &[complete("github", "ok"), started("github")],
            ConcurrencyPolicy::Concurrent,
        );
        assert!(tracker.active().contains("github"));
        assert_eq!(tracker.status("github"), AgentStatus::Completed);
        assert_eq!(tracker.completed()["github"], "ok");
        assert_eq!(tracker.progress(&registry), 0.5);

        let finished = AgentTracker::fold(
            &[complete("github", "ok"), started("github"), complete("github", "again")],
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(finished.status("github"), AgentStatus::Completed);
    }

    #[test]
    fn non_agent_events_leave_state_alone() {
        let mut tracker = AgentTracker::default();
        tracker.apply(&JobEvent::AgentStep {
            agent: "github".into(),
            content: "cloning".into(),
        });
        tracker.apply(&JobEvent::Verdict {
            result: JudgingResult::new(serde_json::json!({"scores": {}})),
        });
        tracker.apply(&JobEvent::Error {
            message: "boom".into(),
        });
        assert_eq!(tracker, AgentTracker::default());
    }

    #[test]
    fn progress_is_monotonic_and_reaches_one() {
        let registry = AgentRegistry::default();
        let mut events = Vec::new();
        for agent in registry.iter() {
            events.push(started(agent));
            events.push(complete(agent, "ok"));
        }

        let mut tracker = AgentTracker::default();
        let mut last = 0.0;
        for event in &events {
            tracker.apply(event);
            let progress = tracker.progress(&registry);
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn progress_ignores_unknown_agents() {
        let registry = AgentRegistry::new(["github", "ppt"]);
        let tracker = AgentTracker::fold(
            &[complete("unknown", "?"), complete("github", "ok")],
            ConcurrencyPolicy::Concurrent,
        );
        assert_eq!(tracker.progress(&registry), 0.5);
        assert_eq!(tracker.progress(&AgentRegistry::new(Vec::<String>::new())), 0.0);
    }
}
