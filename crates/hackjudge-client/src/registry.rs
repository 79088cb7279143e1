//! Expected evaluator agents.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Agents the backend runs, in task order.
pub const DEFAULT_AGENTS: [&str; 5] = ["github", "ppt", "voice", "video", "orchestrator"];

/// Fixed, ordered list of agent ids known before a job starts.
///
/// Defines the display order and the denominator for progress. Duplicates
/// are dropped on construction, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AgentRegistry {
    agents: Arc<[String]>,
}

impl AgentRegistry {
    pub fn new<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for agent in agents {
            let agent = agent.into();
            if !unique.contains(&agent) {
                unique.push(agent);
            }
        }
        Self {
            agents: unique.into(),
        }
    }

    /// Parse a comma-separated list, ignoring blank entries.
    pub fn parse_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|agent| !agent.is_empty()),
        )
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.iter().any(|known| known == agent)
    }

    pub fn position(&self, agent: &str) -> Option<usize> {
        self.agents.iter().position(|known| known == agent)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(String::as_str)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_AGENTS)
    }
}

impl From<Vec<String>> for AgentRegistry {
    fn from(agents: Vec<String>) -> Self {
        Self::new(agents)
    }
}

impl From<AgentRegistry> for Vec<String> {
    fn from(registry: AgentRegistry) -> Self {
        registry.agents.to_vec()
    }
}

impl fmt::Display for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.agents.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_follows_backend_order() {
        let registry = AgentRegistry::default();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.position("github"), Some(0));
        assert_eq!(registry.position("orchestrator"), Some(4));
    }

    #[test]
    fn duplicates_are_dropped() {
        let registry = AgentRegistry::new(["github", "ppt", "github"]);
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec!["github", "ppt"]);
    }

    #[test]
    fn parse_list_trims_entries() {
        let registry = AgentRegistry::parse_list(" github, ppt ,,orchestrator ");
        assert_eq!(registry.to_string(), "github,ppt,orchestrator");
        assert!(!registry.contains("voice"));
    }
}
